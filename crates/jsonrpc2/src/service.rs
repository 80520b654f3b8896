//! Outbound call surface shared by every transport.
//!
//! [`Service`] is what a request handler receives through its [`Context`]
//! to call back into the peer that invoked it (reverse RPC). [`Remote`],
//! [`Local`] and [`HttpService`] all implement it.
//!
//! [`Remote`]: crate::Remote
//! [`Local`]: crate::Local
//! [`HttpService`]: crate::HttpService

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::encode_params;
use crate::error::{Error, Result};

/// Something that can issue calls and notifications to a peer.
#[async_trait]
pub trait Service: Send + Sync {
	/// Calls `method` with positional `params` and waits for the raw result.
	async fn call_value(&self, method: &str, params: Vec<Value>) -> Result<Value>;

	/// Sends a notification; no response is expected.
	async fn notify_value(&self, method: &str, params: Vec<Value>) -> Result<()>;
}

/// Typed helpers over [`Service`].
///
/// `params` is a tuple of positional arguments: `()` for none, `(a,)` for
/// one, `(a, b)` for two.
#[async_trait]
pub trait ServiceExt: Service {
	async fn call<R, P>(&self, method: &str, params: P) -> Result<R>
	where
		R: DeserializeOwned,
		P: Serialize + Send,
	{
		let value = self.call_value(method, encode_params(params)?).await?;
		Ok(serde_json::from_value(value)?)
	}

	async fn notify<P>(&self, method: &str, params: P) -> Result<()>
	where
		P: Serialize + Send,
	{
		self.notify_value(method, encode_params(params)?).await
	}
}

impl<S: Service + ?Sized> ServiceExt for S {}

/// Per-request context handed to handlers registered with
/// [`Methods::method_with_context`](crate::Methods::method_with_context).
#[derive(Clone, Default)]
pub struct Context {
	service: Option<Arc<dyn Service>>,
}

impl Context {
	/// Context for half-duplex transports that cannot call back.
	pub fn detached() -> Self {
		Self::default()
	}

	pub fn with_service(service: Arc<dyn Service>) -> Self {
		Self {
			service: Some(service),
		}
	}

	/// Returns the service connected to the calling peer.
	///
	/// # Errors
	///
	/// Returns [`Error::NoService`] when the request arrived over a transport
	/// without a persistent connection.
	pub fn service(&self) -> Result<Arc<dyn Service>> {
		self.service.clone().ok_or(Error::NoService)
	}
}

impl fmt::Debug for Context {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Context")
			.field("service", &self.service.is_some())
			.finish()
	}
}
