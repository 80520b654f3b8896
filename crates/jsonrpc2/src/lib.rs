//! Bidirectional JSON-RPC 2.0 engine.
//!
//! Every connection is symmetric: either end can call methods the other has
//! registered, including from inside a handler that is itself answering a
//! call (reverse RPC).
//!
//! - **Message**: the request/response envelope and error codes
//! - **Codec**: line-delimited JSON over byte streams, or WebSocket frames
//! - **Server**: method registry and dispatch
//! - **Remote**: a full-duplex endpoint with request correlation
//! - **Local / HTTP**: in-process and half-duplex adapters
//!
//! # Architecture
//!
//! ```text
//!  caller ──call()──► Remote ──write──► Codec ═══════ Codec ──read──► Remote ──► Server ──► handler
//!                       ▲                                              │
//!                       └──── PendingTable ◄── response by id ◄────────┘
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod handler;
pub mod http;
pub mod local;
pub mod message;
pub mod pending;
pub mod remote;
pub mod server;
pub mod service;
pub mod websocket;

pub use client::{Client, encode_params};
pub use codec::{Codec, CodecParts, IoCodec, MessageReader, MessageWriter};
pub use error::{Error, Result};
pub use handler::{ContextHandler, Handler, IntoReply, Method, Methods, Receiver};
pub use http::{HttpServer, HttpService};
pub use local::Local;
pub use message::{ErrResponse, ErrorCode, Id, Message, Payload, Request, Response};
pub use pending::PendingTable;
pub use remote::{Remote, RemoteConfig, RemoteState};
pub use server::Server;
pub use service::{Context, Service, ServiceExt};
pub use websocket::WebSocketCodec;
