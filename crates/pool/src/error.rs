//! Error types for pool operations.

use jsonrpc2::ErrResponse;
use thiserror::Error;
use vipnode_protocol::NodeId;

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors returned by pool methods. Each maps to an internal-code JSON-RPC
/// error with the message unchanged.
#[derive(Debug, Error)]
pub enum PoolError {
	/// No registered host can take another peer of the requested kind.
	#[error("no hosts available")]
	NoHostsAvailable,

	/// The node never registered, or was expired or disconnected.
	#[error("unknown node: {0}")]
	UnknownNode(NodeId),

	/// The request is malformed in a way the type system does not catch.
	#[error("invalid request: {0}")]
	InvalidRequest(String),

	/// Failure talking to a connected node.
	#[error(transparent)]
	Rpc(#[from] jsonrpc2::Error),
}

impl PoolError {
	/// Returns true if the calling connection cannot be called back.
	pub fn is_no_service(&self) -> bool {
		matches!(self, PoolError::Rpc(jsonrpc2::Error::NoService))
	}
}

impl From<PoolError> for ErrResponse {
	fn from(err: PoolError) -> Self {
		ErrResponse::internal(err.to_string())
	}
}
