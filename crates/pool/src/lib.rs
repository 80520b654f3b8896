//! vipnode pool coordinator.
//!
//! Hosts (full Ethereum nodes with spare peer slots) and agents (light
//! clients looking for peers) both connect to a pool over a persistent
//! JSON-RPC connection. The pool matches agents to hosts and asks each host,
//! over the host's own connection, to whitelist the agent.
//!
//! - [`Pool`]: the coordinator, exposed as a [`jsonrpc2::Receiver`]
//! - [`Whitelist`]: the callback receiver a host registers

pub mod error;
pub mod host;
pub mod pool;

pub use error::{PoolError, Result};
pub use host::Whitelist;
pub use pool::Pool;
