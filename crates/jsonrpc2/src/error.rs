//! Error types for the JSON-RPC engine.

use thiserror::Error;

use crate::message::{ErrResponse, ErrorCode, Id};

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding, dispatching or correlating messages.
#[derive(Debug, Error)]
pub enum Error {
	/// Incoming bytes were not valid JSON.
	#[error("Parse error: {0}")]
	Parse(String),

	/// Valid JSON that is neither a request nor a response.
	#[error("Invalid message: {reason}")]
	InvalidMessage {
		/// Correlation ID, when one could be recovered from the payload.
		id: Option<Id>,
		reason: String,
	},

	/// A response-shaped message (`result` or `error`, no `method`) that
	/// could not be decoded. Released to the matching caller, never answered.
	#[error("Invalid response: {reason}")]
	InvalidResponse {
		id: Option<Id>,
		reason: String,
	},

	/// The peer answered with an error response.
	#[error("{0}")]
	Rpc(ErrResponse),

	/// The pending call was evicted under `pending_limit` before an answer arrived.
	#[error("Pending call discarded: too many requests in flight")]
	PendingDiscarded,

	/// The connection shut down before the call completed.
	#[error("Connection closed")]
	ConnectionClosed,

	/// `serve()` was called on a remote whose read loop already started.
	#[error("Remote is already serving")]
	AlreadyServing,

	/// The current transport cannot issue calls back to the peer.
	#[error("No service available in this context")]
	NoService,

	/// Method table rejected by the registry.
	#[error("Registration failed: {0}")]
	Registration(String),

	/// Transport-level failure other than plain I/O.
	#[error("Transport error: {0}")]
	Transport(String),

	/// Non-success HTTP status without a JSON-RPC body.
	#[error("HTTP error: status {status}")]
	Http { status: u16 },

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// WebSocket protocol error.
	#[error("WebSocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	/// HTTP client error.
	#[error("HTTP client error: {0}")]
	HttpClient(#[from] reqwest::Error),
}

impl Error {
	/// Returns the JSON-RPC error code if the peer answered with an error.
	pub fn code(&self) -> Option<ErrorCode> {
		match self {
			Error::Rpc(err) => Some(err.code),
			_ => None,
		}
	}

	/// Returns true if the call may succeed when issued again.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Error::PendingDiscarded)
	}

	/// Returns true for malformed input that the read loop answers and skips.
	pub fn is_recoverable(&self) -> bool {
		matches!(
			self,
			Error::Parse(_) | Error::InvalidMessage { .. } | Error::InvalidResponse { .. }
		)
	}

	/// Returns true if the underlying connection is gone.
	pub fn is_closed(&self) -> bool {
		match self {
			Error::ConnectionClosed => true,
			Error::Io(err) => matches!(
				err.kind(),
				std::io::ErrorKind::BrokenPipe
					| std::io::ErrorKind::ConnectionReset
					| std::io::ErrorKind::UnexpectedEof
			),
			Error::WebSocket(err) => matches!(
				err,
				tokio_tungstenite::tungstenite::Error::ConnectionClosed
					| tokio_tungstenite::tungstenite::Error::AlreadyClosed
			),
			_ => false,
		}
	}

	/// Converts a recoverable decode failure into the response sent to the peer.
	pub(crate) fn to_protocol_response(&self) -> Option<(Option<Id>, ErrResponse)> {
		match self {
			Error::Parse(reason) => Some((None, ErrResponse::new(ErrorCode::Parse, reason.clone()))),
			Error::InvalidMessage { id, reason } | Error::InvalidResponse { id, reason } => Some((
				id.clone(),
				ErrResponse::new(ErrorCode::InvalidRequest, reason.clone()),
			)),
			_ => None,
		}
	}
}

impl From<ErrResponse> for Error {
	fn from(err: ErrResponse) -> Self {
		Error::Rpc(err)
	}
}

impl From<Error> for ErrResponse {
	fn from(err: Error) -> Self {
		match err {
			Error::Rpc(inner) => inner,
			other => ErrResponse::new(ErrorCode::Internal, other.to_string()),
		}
	}
}
