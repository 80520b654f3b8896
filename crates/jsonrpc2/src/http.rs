//! Half-duplex HTTP adapters: one JSON-RPC exchange per POST.
//!
//! Neither side keeps a pending-call table and handlers served over HTTP
//! cannot call back into the client ([`Context::service`] fails).

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::message::{ErrResponse, ErrorCode, Id, Message, Payload, Response};
use crate::server::Server;
use crate::service::{Context, Service};

/// Default request body limit.
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 1024 * 1024;

/// Serves a [`Server`] on `POST /`.
#[derive(Clone)]
pub struct HttpServer {
	server: Arc<Server>,
	max_content_length: usize,
}

impl HttpServer {
	pub fn new(server: Arc<Server>) -> Self {
		Self {
			server,
			max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
		}
	}

	/// Bodies larger than `max_content_length` bytes are rejected with `413`.
	pub fn with_max_content_length(mut self, max_content_length: usize) -> Self {
		self.max_content_length = max_content_length;
		self
	}

	pub fn router(&self) -> Router {
		Router::new()
			.route("/", post(handle_post))
			.layer(DefaultBodyLimit::max(self.max_content_length))
			.with_state(self.server.clone())
	}

	/// Serves requests on `listener` until the task is dropped.
	pub async fn serve(self, listener: TcpListener) -> Result<()> {
		if let Ok(addr) = listener.local_addr() {
			tracing::info!(target: "vipnode.rpc", %addr, "serving JSON-RPC over HTTP");
		}
		axum::serve(listener, self.router()).await?;
		Ok(())
	}
}

async fn handle_post(State(server): State<Arc<Server>>, body: Bytes) -> HttpResponse {
	let message = match Message::decode(&body) {
		Ok(message) => message,
		Err(err) => {
			tracing::debug!(target: "vipnode.rpc", error = %err, "rejected HTTP request body");
			let (id, reply) = err
				.to_protocol_response()
				.unwrap_or_else(|| (None, ErrResponse::from(err)));
			return error_reply(id, reply);
		}
	};

	let Message { id, payload } = message;
	let Payload::Request(request) = payload else {
		return error_reply(
			id,
			ErrResponse::new(ErrorCode::InvalidRequest, "expected a request"),
		);
	};

	let response = server.handle(Context::detached(), &request).await;
	match id {
		Some(id) => Json(Message::response(Some(id), response)).into_response(),
		None => StatusCode::NO_CONTENT.into_response(),
	}
}

fn error_reply(id: Option<Id>, reply: ErrResponse) -> HttpResponse {
	(
		StatusCode::BAD_REQUEST,
		Json(Message::response(id, Response::Error(reply))),
	)
		.into_response()
}

/// Calls a remote endpoint with one HTTP POST per request.
#[derive(Clone)]
pub struct HttpService {
	endpoint: String,
	http: reqwest::Client,
	client: Arc<Client>,
}

impl HttpService {
	pub fn new(endpoint: impl Into<String>) -> Self {
		Self::with_client(endpoint, reqwest::Client::new())
	}

	pub fn with_client(endpoint: impl Into<String>, http: reqwest::Client) -> Self {
		Self {
			endpoint: endpoint.into(),
			http,
			client: Arc::new(Client::new()),
		}
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	async fn post(&self, message: &Message) -> Result<(reqwest::StatusCode, Bytes)> {
		let response = self
			.http
			.post(&self.endpoint)
			.header(reqwest::header::CONTENT_TYPE, "application/json")
			.body(message.encode()?)
			.send()
			.await?;
		let status = response.status();
		let body = response.bytes().await?;
		Ok((status, body))
	}
}

#[async_trait]
impl Service for HttpService {
	async fn call_value(&self, method: &str, params: Vec<Value>) -> Result<Value> {
		let message = self.client.request(method, params);
		let (status, body) = self.post(&message).await?;

		match Message::decode(&body) {
			Ok(Message {
				payload: Payload::Response(response),
				..
			}) => response.into_result(),
			Ok(_) => Err(Error::Transport(format!(
				"expected a response from {}",
				self.endpoint
			))),
			Err(_) if !status.is_success() => Err(Error::Http {
				status: status.as_u16(),
			}),
			Err(err) => Err(err),
		}
	}

	async fn notify_value(&self, method: &str, params: Vec<Value>) -> Result<()> {
		let message = self.client.notification(method, params);
		let (status, body) = self.post(&message).await?;
		if status.is_success() {
			return Ok(());
		}

		match Message::decode(&body) {
			Ok(Message {
				payload: Payload::Response(Response::Error(err)),
				..
			}) => Err(Error::Rpc(err)),
			_ => Err(Error::Http {
				status: status.as_u16(),
			}),
		}
	}
}

#[cfg(test)]
mod tests;
