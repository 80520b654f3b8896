//! Client role: request IDs and outbound message construction.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::message::{Id, Message, Request};

/// Builds outbound requests with monotonic IDs.
#[derive(Debug)]
pub struct Client {
	next_id: AtomicU64,
}

impl Default for Client {
	fn default() -> Self {
		Self::new()
	}
}

impl Client {
	pub fn new() -> Self {
		Self {
			next_id: AtomicU64::new(1),
		}
	}

	/// Allocates the next request ID.
	pub fn next_id(&self) -> Id {
		Id::from(self.next_id.fetch_add(1, Ordering::SeqCst))
	}

	/// Builds a request carrying a fresh ID.
	pub fn request(&self, method: &str, params: Vec<Value>) -> Message {
		Message::request(self.next_id(), Request::new(method, params))
	}

	/// Builds a notification (no ID, no response expected).
	pub fn notification(&self, method: &str, params: Vec<Value>) -> Message {
		Message::notification(Request::new(method, params))
	}
}

/// Encodes call arguments as a positional array.
///
/// Tuples and sequences become the array itself, `()` becomes no params, and
/// any other value is passed as the single argument. Wrap a sequence meant as
/// one argument in a 1-tuple: `(vec,)`.
pub fn encode_params<P: Serialize>(params: P) -> Result<Vec<Value>> {
	Ok(match serde_json::to_value(params)? {
		Value::Null => Vec::new(),
		Value::Array(values) => values,
		other => vec![other],
	})
}
