//! Command line front end for vipnode.
//!
//! `vipnode pool` serves [`vipnode_pool::Pool`] over WebSocket (and
//! optionally HTTP). `vipnode host` and `vipnode agent` dial a pool and
//! play their side of the protocol over a [`jsonrpc2::Remote`].

pub mod cli;
pub mod commands;
pub mod logging;
