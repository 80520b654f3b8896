//! In-process service: calls go straight to a [`Server`] without a codec.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::encode_params;
use crate::error::Result;
use crate::message::{Request, Response};
use crate::server::Server;
use crate::service::{Context, Service};

/// Calls a [`Server`] in the same process.
///
/// Handlers receive this `Local` as their context service, so reverse calls
/// land on the same server.
#[derive(Clone)]
pub struct Local {
	server: Arc<Server>,
}

impl Local {
	pub fn new(server: Arc<Server>) -> Self {
		Self { server }
	}

	pub fn server(&self) -> &Arc<Server> {
		&self.server
	}

	pub async fn call<R, P>(&self, method: &str, params: P) -> Result<R>
	where
		R: DeserializeOwned,
		P: Serialize,
	{
		let value = self.call_value(method, encode_params(params)?).await?;
		Ok(serde_json::from_value(value)?)
	}

	pub async fn call_value(&self, method: &str, params: Vec<Value>) -> Result<Value> {
		self.dispatch(&Request::new(method, params)).await.into_result()
	}

	/// Runs the handler to completion; its result is discarded.
	pub async fn notify_value(&self, method: &str, params: Vec<Value>) -> Result<()> {
		let response = self.dispatch(&Request::new(method, params)).await;
		if let Response::Error(err) = response {
			tracing::debug!(target: "vipnode.rpc", method, error = %err, "local notification failed");
		}
		Ok(())
	}

	async fn dispatch(&self, request: &Request) -> Response {
		let ctx = Context::with_service(Arc::new(self.clone()));
		self.server.handle(ctx, request).await
	}
}

#[async_trait]
impl Service for Local {
	async fn call_value(&self, method: &str, params: Vec<Value>) -> Result<Value> {
		Local::call_value(self, method, params).await
	}

	async fn notify_value(&self, method: &str, params: Vec<Value>) -> Result<()> {
		Local::notify_value(self, method, params).await
	}
}
