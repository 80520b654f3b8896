//! Full-duplex endpoint: one connection acting as both client and server.
//!
//! A [`Remote`] owns a codec, a shared [`Server`], a request-ID [`Client`]
//! and a [`PendingTable`]. [`Remote::serve`] runs the read loop: responses
//! are routed to the waiting caller by ID, requests are dispatched on their
//! own tasks. All writes go through one lock.
//!
//! ```ignore
//! let remote = Remote::new(IoCodec::from_stream(stream), server);
//! tokio::spawn({
//!     let remote = remote.clone();
//!     async move { remote.serve().await }
//! });
//! let pong: String = remote.call("vipnode_ping", ()).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, oneshot, watch};

use crate::client::{Client, encode_params};
use crate::codec::{Codec, MessageReader, MessageWriter};
use crate::error::{Error, Result};
use crate::message::{Id, Message, Payload, Request, Response};
use crate::pending::{DEFAULT_PENDING_DISCARD, DEFAULT_PENDING_LIMIT, PendingTable};
use crate::server::Server;
use crate::service::{Context, Service};

type Waiter = oneshot::Sender<Result<Response>>;

/// Tuning for a [`Remote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteConfig {
	/// Maximum number of calls awaiting a response; `0` disables the bound.
	pub pending_limit: usize,
	/// Number of oldest calls evicted when the bound is hit.
	pub pending_discard: usize,
}

impl Default for RemoteConfig {
	fn default() -> Self {
		Self {
			pending_limit: DEFAULT_PENDING_LIMIT,
			pending_discard: DEFAULT_PENDING_DISCARD,
		}
	}
}

/// Lifecycle of a [`Remote`]: idle until served, closed once the read loop
/// ends or [`Remote::close`] is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
	Idle,
	Serving,
	Closed,
}

struct RemoteInner {
	server: Arc<Server>,
	client: Client,
	pending: Mutex<PendingTable<Waiter>>,
	reader: Mutex<Option<Box<dyn MessageReader>>>,
	writer: AsyncMutex<Box<dyn MessageWriter>>,
	state: Mutex<RemoteState>,
	shutdown: watch::Sender<bool>,
}

/// One end of a bidirectional JSON-RPC connection. Cheap to clone.
#[derive(Clone)]
pub struct Remote {
	inner: Arc<RemoteInner>,
}

/// Removes the pending entry if the call future is dropped before completion.
struct PendingGuard<'a> {
	pending: &'a Mutex<PendingTable<Waiter>>,
	key: String,
	armed: bool,
}

impl PendingGuard<'_> {
	fn disarm(&mut self) {
		self.armed = false;
	}
}

impl Drop for PendingGuard<'_> {
	fn drop(&mut self) {
		if self.armed && self.pending.lock().remove(&self.key).is_some() {
			tracing::debug!(target: "vipnode.rpc", id = %self.key, "abandoned pending call");
		}
	}
}

impl Remote {
	pub fn new(codec: impl Codec, server: Arc<Server>) -> Self {
		Self::with_config(codec, server, RemoteConfig::default())
	}

	pub fn with_config(codec: impl Codec, server: Arc<Server>, config: RemoteConfig) -> Self {
		let parts = codec.into_parts();
		let (shutdown, _) = watch::channel(false);
		Self {
			inner: Arc::new(RemoteInner {
				server,
				client: Client::new(),
				pending: Mutex::new(PendingTable::new(
					config.pending_limit,
					config.pending_discard,
				)),
				reader: Mutex::new(Some(parts.reader)),
				writer: AsyncMutex::new(parts.writer),
				state: Mutex::new(RemoteState::Idle),
				shutdown,
			}),
		}
	}

	pub fn server(&self) -> &Arc<Server> {
		&self.inner.server
	}

	pub fn state(&self) -> RemoteState {
		*self.inner.state.lock()
	}

	pub fn is_closed(&self) -> bool {
		self.state() == RemoteState::Closed
	}

	/// Number of calls currently awaiting a response.
	pub fn pending_len(&self) -> usize {
		self.inner.pending.lock().len()
	}

	/// Runs the read loop until the peer closes the connection, a transport
	/// error occurs, or [`Remote::close`] is called.
	///
	/// Returns `Ok(())` for a clean end of stream or an explicit close. Every
	/// caller still waiting when the loop ends receives
	/// [`Error::ConnectionClosed`].
	///
	/// # Errors
	///
	/// Returns [`Error::AlreadyServing`] if the loop was already started and
	/// the transport error that ended the loop otherwise.
	pub async fn serve(&self) -> Result<()> {
		let mut reader = {
			let mut state = self.inner.state.lock();
			match *state {
				RemoteState::Idle => {}
				RemoteState::Serving => return Err(Error::AlreadyServing),
				RemoteState::Closed => return Err(Error::ConnectionClosed),
			}
			let Some(reader) = self.inner.reader.lock().take() else {
				return Err(Error::AlreadyServing);
			};
			*state = RemoteState::Serving;
			reader
		};

		tracing::debug!(target: "vipnode.rpc", "serving connection");
		let mut shutdown = self.inner.shutdown.subscribe();

		let result = loop {
			let next = tokio::select! {
				_ = shutdown_requested(&mut shutdown) => break Ok(()),
				next = reader.read_message() => next,
			};

			match next {
				Ok(Some(message)) => self.route(message),
				Ok(None) => {
					tracing::debug!(target: "vipnode.rpc", "peer closed connection");
					break Ok(());
				}
				Err(Error::InvalidResponse { id, reason }) => self.reject_response(id, reason),
				Err(err) => match err.to_protocol_response() {
					Some((id, reply)) => {
						tracing::warn!(target: "vipnode.rpc", error = %err, "rejected malformed message");
						let message = Message::response(id, Response::Error(reply));
						if let Err(err) = self.send(&message).await {
							break Err(err);
						}
					}
					None => break Err(err),
				},
			}
		};

		if let Err(err) = &result {
			tracing::debug!(target: "vipnode.rpc", error = %err, "read loop failed");
		}
		if self.mark_closed() {
			self.release_pending();
			if let Err(err) = self.inner.writer.lock().await.close().await {
				tracing::trace!(target: "vipnode.rpc", error = %err, "closing writer after read loop");
			}
		}
		result
	}

	/// Stops the read loop, closes the write half and releases every pending
	/// caller with [`Error::ConnectionClosed`]. Closing twice is a no-op.
	pub async fn close(&self) -> Result<()> {
		let transitioned = self.mark_closed();
		self.inner.shutdown.send_replace(true);
		if !transitioned {
			return Ok(());
		}
		self.release_pending();
		self.inner.writer.lock().await.close().await
	}

	/// Calls `method` on the peer and decodes the result.
	///
	/// Dropping the returned future abandons the call; a late answer is
	/// discarded by the read loop.
	pub async fn call<R, P>(&self, method: &str, params: P) -> Result<R>
	where
		R: DeserializeOwned,
		P: Serialize,
	{
		let value = self.call_value(method, encode_params(params)?).await?;
		Ok(serde_json::from_value(value)?)
	}

	/// Calls `method` with positional params and returns the raw result.
	pub async fn call_value(&self, method: &str, params: Vec<Value>) -> Result<Value> {
		self.ensure_open()?;

		let message = self.inner.client.request(method, params);
		let key = message.id.as_ref().map(Id::key).unwrap_or_default();
		let (tx, rx) = oneshot::channel();

		let evicted = self.inner.pending.lock().insert(key.clone(), tx);
		let mut guard = PendingGuard {
			pending: &self.inner.pending,
			key,
			armed: true,
		};
		if !evicted.is_empty() {
			tracing::warn!(
				target: "vipnode.rpc",
				count = evicted.len(),
				"pending limit reached, discarding oldest calls"
			);
			for waiter in evicted {
				let _ = waiter.send(Err(Error::PendingDiscarded));
			}
		}
		// close() may have drained the table between the check and the insert.
		self.ensure_open()?;

		tracing::trace!(target: "vipnode.rpc", id = %guard.key, method, "sending request");
		self.send(&message).await?;

		let outcome = rx.await;
		guard.disarm();
		match outcome {
			Ok(result) => result?.into_result(),
			Err(_) => Err(Error::ConnectionClosed),
		}
	}

	/// Sends a notification. Returns once the message is written.
	pub async fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
		self.notify_value(method, encode_params(params)?).await
	}

	pub async fn notify_value(&self, method: &str, params: Vec<Value>) -> Result<()> {
		self.ensure_open()?;
		tracing::trace!(target: "vipnode.rpc", method, "sending notification");
		self.send(&self.inner.client.notification(method, params)).await
	}

	fn ensure_open(&self) -> Result<()> {
		if self.is_closed() {
			return Err(Error::ConnectionClosed);
		}
		Ok(())
	}

	async fn send(&self, message: &Message) -> Result<()> {
		self.inner.writer.lock().await.write_message(message).await
	}

	fn mark_closed(&self) -> bool {
		let mut state = self.inner.state.lock();
		let transitioned = *state != RemoteState::Closed;
		*state = RemoteState::Closed;
		transitioned
	}

	fn release_pending(&self) {
		let waiters = self.inner.pending.lock().drain();
		if !waiters.is_empty() {
			tracing::debug!(
				target: "vipnode.rpc",
				count = waiters.len(),
				"releasing pending calls"
			);
		}
		for waiter in waiters {
			let _ = waiter.send(Err(Error::ConnectionClosed));
		}
	}

	fn route(&self, message: Message) {
		let Message { id, payload } = message;
		match payload {
			Payload::Response(response) => self.deliver(id, response),
			Payload::Request(request) => self.dispatch(id, request),
		}
	}

	fn deliver(&self, id: Option<Id>, response: Response) {
		let Some(id) = id.filter(|id| *id != Id::Null) else {
			if let Response::Error(err) = &response {
				tracing::warn!(target: "vipnode.rpc", error = %err, "peer reported an error");
			}
			return;
		};

		let waiter = self.inner.pending.lock().remove(&id.key());
		match waiter {
			Some(waiter) => {
				let _ = waiter.send(Ok(response));
			}
			None => {
				tracing::debug!(target: "vipnode.rpc", %id, "dropping response without pending call");
			}
		}
	}

	/// Releases the caller a malformed response was meant for. Nothing is
	/// written back: answering a response would confuse the peer's own calls.
	fn reject_response(&self, id: Option<Id>, reason: String) {
		tracing::warn!(target: "vipnode.rpc", id = ?id, %reason, "rejected malformed response");
		let Some(id) = id.filter(|id| *id != Id::Null) else {
			return;
		};
		let waiter = self.inner.pending.lock().remove(&id.key());
		if let Some(waiter) = waiter {
			let _ = waiter.send(Err(Error::InvalidResponse {
				id: Some(id),
				reason,
			}));
		}
	}

	fn dispatch(&self, id: Option<Id>, request: Request) {
		let remote = self.clone();
		tokio::spawn(async move {
			tracing::trace!(target: "vipnode.rpc", method = %request.method, "dispatching request");
			let ctx = Context::with_service(Arc::new(remote.clone()));
			let response = remote.inner.server.handle(ctx, &request).await;

			// Notifications never get an answer.
			let Some(id) = id else {
				return;
			};
			if let Err(err) = remote.send(&Message::response(Some(id), response)).await {
				tracing::debug!(
					target: "vipnode.rpc",
					method = %request.method,
					error = %err,
					"failed to write response"
				);
			}
		});
	}
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
	loop {
		if *rx.borrow_and_update() {
			return;
		}
		if rx.changed().await.is_err() {
			return;
		}
	}
}

#[async_trait]
impl Service for Remote {
	async fn call_value(&self, method: &str, params: Vec<Value>) -> Result<Value> {
		Remote::call_value(self, method, params).await
	}

	async fn notify_value(&self, method: &str, params: Vec<Value>) -> Result<()> {
		Remote::notify_value(self, method, params).await
	}
}

impl fmt::Debug for Remote {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Remote")
			.field("state", &self.state())
			.field("pending", &self.pending_len())
			.finish()
	}
}

#[cfg(test)]
mod tests;
