//! WebSocket codec: one JSON-RPC message per text or binary frame.
//!
//! This is the persistent transport pools and agents use, so both ends get a
//! full-duplex [`Remote`] and can call each other.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message as Frame};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::codec::{Codec, CodecParts, MessageReader, MessageWriter};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::remote::{Remote, RemoteConfig};
use crate::server::Server;

/// Codec over an established WebSocket stream.
pub struct WebSocketCodec<S> {
	stream: WebSocketStream<S>,
}

impl<S> WebSocketCodec<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	pub fn new(stream: WebSocketStream<S>) -> Self {
		Self { stream }
	}
}

impl<S> Codec for WebSocketCodec<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	fn into_parts(self) -> CodecParts {
		let (sink, stream) = self.stream.split();
		CodecParts {
			reader: Box::new(FrameReader { stream }),
			writer: Box::new(FrameWriter { sink }),
		}
	}
}

struct FrameReader<S> {
	stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> MessageReader for FrameReader<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	async fn read_message(&mut self) -> Result<Option<Message>> {
		loop {
			let frame = match self.stream.next().await {
				None => return Ok(None),
				Some(Err(tungstenite::Error::ConnectionClosed)) => return Ok(None),
				Some(Err(err)) => return Err(err.into()),
				Some(Ok(frame)) => frame,
			};

			match frame {
				Frame::Text(text) => return Message::decode(text.as_bytes()).map(Some),
				Frame::Binary(bytes) => return Message::decode(&bytes).map(Some),
				Frame::Close(_) => {
					tracing::trace!(target: "vipnode.rpc", "received close frame");
					return Ok(None);
				}
				// tungstenite answers pings itself
				Frame::Ping(_) | Frame::Pong(_) | Frame::Frame(_) => continue,
			}
		}
	}
}

struct FrameWriter<S> {
	sink: SplitSink<WebSocketStream<S>, Frame>,
}

#[async_trait]
impl<S> MessageWriter for FrameWriter<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	async fn write_message(&mut self, message: &Message) -> Result<()> {
		let text = serde_json::to_string(message)?;
		self.sink.send(Frame::Text(text)).await?;
		Ok(())
	}

	async fn close(&mut self) -> Result<()> {
		match self.sink.close().await {
			Ok(()) => Ok(()),
			Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
			Err(err) => Err(Error::WebSocket(err)),
		}
	}
}

/// Connects to a WebSocket endpoint such as `ws://pool.example:8080/`.
pub async fn dial(url: &str) -> Result<WebSocketCodec<MaybeTlsStream<TcpStream>>> {
	let (stream, _response) = tokio_tungstenite::connect_async(url).await?;
	tracing::debug!(target: "vipnode.rpc", url, "websocket connected");
	Ok(WebSocketCodec::new(stream))
}

/// Completes the server side of the WebSocket handshake on `stream`.
pub async fn accept<S>(stream: S) -> Result<WebSocketCodec<S>>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	let stream = tokio_tungstenite::accept_async(stream).await?;
	Ok(WebSocketCodec::new(stream))
}

/// Accepts WebSocket connections on `listener`, serving each one as a
/// [`Remote`] backed by `server`. Runs until the listener fails.
pub async fn serve(listener: TcpListener, server: Arc<Server>, config: RemoteConfig) -> Result<()> {
	if let Ok(addr) = listener.local_addr() {
		tracing::info!(target: "vipnode.rpc", %addr, "serving JSON-RPC over WebSocket");
	}

	loop {
		let (stream, peer) = match listener.accept().await {
			Ok(accepted) => accepted,
			Err(err) if is_transient_accept_error(&err) => {
				tracing::warn!(target: "vipnode.rpc", error = %err, "accept failed");
				continue;
			}
			Err(err) => return Err(err.into()),
		};

		let server = server.clone();
		tokio::spawn(async move {
			let codec = match accept(stream).await {
				Ok(codec) => codec,
				Err(err) => {
					tracing::warn!(target: "vipnode.rpc", %peer, error = %err, "websocket handshake failed");
					return;
				}
			};

			tracing::info!(target: "vipnode.rpc", %peer, "peer connected");
			let remote = Remote::with_config(codec, server, config);
			match remote.serve().await {
				Ok(()) => tracing::info!(target: "vipnode.rpc", %peer, "peer disconnected"),
				Err(err) => {
					tracing::warn!(target: "vipnode.rpc", %peer, error = %err, "connection failed")
				}
			}
		});
	}
}

fn is_transient_accept_error(err: &std::io::Error) -> bool {
	matches!(
		err.kind(),
		std::io::ErrorKind::ConnectionAborted
			| std::io::ErrorKind::ConnectionReset
			| std::io::ErrorKind::Interrupted
			| std::io::ErrorKind::WouldBlock
	)
}
