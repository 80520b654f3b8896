//! JSON-RPC 2.0 message envelope.
//!
//! A [`Message`] is exactly one of a request (has `method`) or a response
//! (has `result` or `error`). Anything else is rejected while decoding:
//!
//! ```text
//! {"id":1,"jsonrpc":"2.0","method":"vipnode_ping","params":[]}   request
//! {"jsonrpc":"2.0","method":"vipnode_update","params":[...]}     notification
//! {"id":1,"jsonrpc":"2.0","result":"pong"}                      response
//! {"id":1,"jsonrpc":"2.0","error":{"code":-32601,"message":"..."}}
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Protocol version written on every message.
pub const VERSION: &str = "2.0";

/// Correlation ID linking a request to its response.
///
/// `Null` is an explicit `"id": null`: a request carrying it is still
/// answered (with a null id), unlike a notification which has no `id`
/// member at all. Locally issued calls never use it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
	Number(serde_json::Number),
	String(String),
	Null,
}

impl Id {
	/// String form used to key pending calls.
	pub fn key(&self) -> String {
		match self {
			Id::Number(n) => n.to_string(),
			Id::String(s) => s.clone(),
			Id::Null => "null".to_string(),
		}
	}
}

impl fmt::Display for Id {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Id::Number(n) => write!(f, "{n}"),
			Id::String(s) => write!(f, "{s:?}"),
			Id::Null => f.write_str("null"),
		}
	}
}

impl From<u64> for Id {
	fn from(id: u64) -> Self {
		Id::Number(id.into())
	}
}

impl From<&str> for Id {
	fn from(id: &str) -> Self {
		Id::String(id.to_string())
	}
}

impl From<Id> for Value {
	fn from(id: Id) -> Self {
		match id {
			Id::Number(n) => Value::Number(n),
			Id::String(s) => Value::String(s),
			Id::Null => Value::Null,
		}
	}
}

impl TryFrom<Value> for Id {
	type Error = Error;

	fn try_from(value: Value) -> Result<Self> {
		match value {
			Value::Number(n) => Ok(Id::Number(n)),
			Value::String(s) => Ok(Id::String(s)),
			Value::Null => Ok(Id::Null),
			other => Err(Error::InvalidMessage {
				id: None,
				reason: format!("id must be a number or string, got {other}"),
			}),
		}
	}
}

/// JSON-RPC error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ErrorCode {
	/// `-32700`
	Parse,
	/// `-32600`
	InvalidRequest,
	/// `-32601`
	MethodNotFound,
	/// `-32602`
	InvalidParams,
	/// `-32603`
	Internal,
	/// `-32000`
	Server,
	/// Any code outside the fixed taxonomy.
	Other(i64),
}

impl From<i64> for ErrorCode {
	fn from(code: i64) -> Self {
		match code {
			-32700 => ErrorCode::Parse,
			-32600 => ErrorCode::InvalidRequest,
			-32601 => ErrorCode::MethodNotFound,
			-32602 => ErrorCode::InvalidParams,
			-32603 => ErrorCode::Internal,
			-32000 => ErrorCode::Server,
			other => ErrorCode::Other(other),
		}
	}
}

impl From<ErrorCode> for i64 {
	fn from(code: ErrorCode) -> Self {
		match code {
			ErrorCode::Parse => -32700,
			ErrorCode::InvalidRequest => -32600,
			ErrorCode::MethodNotFound => -32601,
			ErrorCode::InvalidParams => -32602,
			ErrorCode::Internal => -32603,
			ErrorCode::Server => -32000,
			ErrorCode::Other(code) => code,
		}
	}
}

/// Error payload of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrResponse {
	pub code: ErrorCode,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

impl ErrResponse {
	pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
			data: None,
		}
	}

	pub fn method_not_found(method: &str) -> Self {
		Self::new(ErrorCode::MethodNotFound, format!("method not found: {method}"))
	}

	pub fn invalid_params(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::InvalidParams, message)
	}

	pub fn internal(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::Internal, message)
	}

	pub fn server(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::Server, message)
	}

	/// Attaches structured data to the error.
	pub fn with_data(mut self, data: Value) -> Self {
		self.data = Some(data);
		self
	}
}

impl fmt::Display for ErrResponse {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} (code {})", self.message, i64::from(self.code))
	}
}

impl std::error::Error for ErrResponse {}

impl From<String> for ErrResponse {
	fn from(message: String) -> Self {
		Self::internal(message)
	}
}

impl From<&str> for ErrResponse {
	fn from(message: &str) -> Self {
		Self::internal(message)
	}
}

/// Request payload: a method name and its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
	pub method: String,
	/// Raw `params` member; a JSON array when well-formed.
	pub params: Option<Value>,
}

impl Request {
	/// Builds a request with positional params, omitting `params` when empty.
	pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
		Self {
			method: method.into(),
			params: if params.is_empty() {
				None
			} else {
				Some(Value::Array(params))
			},
		}
	}
}

/// Response payload: a result XOR an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
	Result(Value),
	Error(ErrResponse),
}

impl Response {
	pub fn is_error(&self) -> bool {
		matches!(self, Response::Error(_))
	}

	/// Converts the response into the caller-facing result.
	pub fn into_result(self) -> Result<Value> {
		match self {
			Response::Result(value) => Ok(value),
			Response::Error(err) => Err(Error::Rpc(err)),
		}
	}
}

impl From<std::result::Result<Value, ErrResponse>> for Response {
	fn from(result: std::result::Result<Value, ErrResponse>) -> Self {
		match result {
			Ok(value) => Response::Result(value),
			Err(err) => Response::Error(err),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
	Request(Request),
	Response(Response),
}

/// Wire envelope shared by requests and responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMessage", into = "RawMessage")]
pub struct Message {
	/// Correlation ID; absent for notifications.
	pub id: Option<Id>,
	pub payload: Payload,
}

impl Message {
	pub fn request(id: Id, request: Request) -> Self {
		Self {
			id: Some(id),
			payload: Payload::Request(request),
		}
	}

	pub fn notification(request: Request) -> Self {
		Self {
			id: None,
			payload: Payload::Request(request),
		}
	}

	pub fn response(id: Option<Id>, response: Response) -> Self {
		Self {
			id,
			payload: Payload::Response(response),
		}
	}

	/// Returns the method name if this is a request or notification.
	pub fn method(&self) -> Option<&str> {
		match &self.payload {
			Payload::Request(request) => Some(&request.method),
			Payload::Response(_) => None,
		}
	}

	pub fn is_notification(&self) -> bool {
		self.id.is_none() && matches!(self.payload, Payload::Request(_))
	}

	/// Serializes the message to compact JSON.
	pub fn encode(&self) -> Result<Vec<u8>> {
		Ok(serde_json::to_vec(self)?)
	}

	/// Decodes one message.
	///
	/// Invalid JSON yields [`Error::Parse`]. A malformed message that looks
	/// like a response yields [`Error::InvalidResponse`]; anything else that
	/// is not a single request or response yields [`Error::InvalidMessage`].
	pub fn decode(bytes: &[u8]) -> Result<Self> {
		let value: Value =
			serde_json::from_slice(bytes).map_err(|err| Error::Parse(err.to_string()))?;

		if value.is_array() {
			return Err(Error::InvalidMessage {
				id: None,
				reason: "batch requests are not supported".to_string(),
			});
		}

		let id = value.get("id").cloned().and_then(|id| Id::try_from(id).ok());
		let response_shaped = value.get("method").is_none()
			&& (value.get("result").is_some() || value.get("error").is_some());

		let decoded = RawMessage::deserialize(value)
			.map_err(|err| Error::InvalidMessage {
				id,
				reason: err.to_string(),
			})
			.and_then(Message::try_from);

		match decoded {
			Err(Error::InvalidMessage { id, reason }) if response_shaped => {
				Err(Error::InvalidResponse { id, reason })
			}
			other => other,
		}
	}
}

/// Flat wire shape; every member is optional until classified.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawMessage {
	/// `"id": null` is kept apart from a missing id.
	#[serde(
		default,
		deserialize_with = "deserialize_present",
		skip_serializing_if = "Option::is_none"
	)]
	id: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	jsonrpc: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	method: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	params: Option<Value>,
	/// `"result": null` is a successful response, so presence is tracked separately from `null`.
	#[serde(
		default,
		deserialize_with = "deserialize_present",
		skip_serializing_if = "Option::is_none"
	)]
	result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	error: Option<ErrResponse>,
}

fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
	D: Deserializer<'de>,
{
	Value::deserialize(deserializer).map(Some)
}

impl TryFrom<RawMessage> for Message {
	type Error = Error;

	fn try_from(raw: RawMessage) -> Result<Self> {
		let id = raw.id.map(Id::try_from).transpose()?;

		if raw.jsonrpc.as_deref() != Some(VERSION) {
			return Err(Error::InvalidMessage {
				id,
				reason: format!("expected jsonrpc version {VERSION:?}"),
			});
		}

		let payload = match (raw.method, raw.result, raw.error) {
			(Some(method), None, None) => Payload::Request(Request {
				method,
				params: raw.params,
			}),
			(None, Some(result), None) => Payload::Response(Response::Result(result)),
			(None, None, Some(error)) => Payload::Response(Response::Error(error)),
			(None, None, None) => {
				return Err(Error::InvalidMessage {
					id,
					reason: "message has neither method nor result/error".to_string(),
				});
			}
			_ => {
				return Err(Error::InvalidMessage {
					id,
					reason: "message mixes request and response members".to_string(),
				});
			}
		};

		Ok(Message { id, payload })
	}
}

impl From<Message> for RawMessage {
	fn from(message: Message) -> Self {
		let mut raw = RawMessage {
			id: message.id.map(Value::from),
			jsonrpc: Some(VERSION.to_string()),
			method: None,
			params: None,
			result: None,
			error: None,
		};

		match message.payload {
			Payload::Request(request) => {
				raw.method = Some(request.method);
				raw.params = request.params;
			}
			Payload::Response(response) => {
				// Responses always carry an id member, null when unknown.
				raw.id.get_or_insert(Value::Null);
				match response {
					Response::Result(value) => raw.result = Some(value),
					Response::Error(err) => raw.error = Some(err),
				}
			}
		}

		raw
	}
}
