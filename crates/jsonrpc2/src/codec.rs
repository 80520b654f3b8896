//! Codecs: whole-message reads and writes over a duplex connection.
//!
//! A codec is split into a [`MessageReader`] and a [`MessageWriter`] so the
//! read loop and writers never contend on the same half. Codecs only
//! (de)serialize; serializing concurrent writers is the engine's job.
//!
//! [`IoCodec`] carries one JSON value per line over any byte stream:
//! child-process pipes, TCP sockets, or `tokio::io::duplex` in tests.

use async_trait::async_trait;
use tokio::io::{
	AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
	WriteHalf,
};

use crate::error::{Error, Result};
use crate::message::Message;

/// Default upper bound on a single encoded message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Read half of a codec.
#[async_trait]
pub trait MessageReader: Send {
	/// Reads the next message.
	///
	/// Returns `Ok(None)` when the peer closed the stream cleanly. Malformed
	/// input yields a recoverable error (see [`Error::is_recoverable`]); the
	/// reader stays usable afterwards.
	async fn read_message(&mut self) -> Result<Option<Message>>;
}

/// Write half of a codec.
#[async_trait]
pub trait MessageWriter: Send {
	async fn write_message(&mut self, message: &Message) -> Result<()>;

	/// Flushes and closes the write side.
	async fn close(&mut self) -> Result<()>;
}

/// Both halves of a split codec.
pub struct CodecParts {
	pub reader: Box<dyn MessageReader>,
	pub writer: Box<dyn MessageWriter>,
}

/// A transport that can be split into independent read and write halves.
pub trait Codec {
	fn into_parts(self) -> CodecParts;
}

impl Codec for CodecParts {
	fn into_parts(self) -> CodecParts {
		self
	}
}

/// Line-delimited JSON over an async reader/writer pair.
pub struct IoCodec<R, W> {
	reader: R,
	writer: W,
	max_message_size: usize,
}

impl<R, W> IoCodec<R, W>
where
	R: AsyncRead + Unpin + Send + 'static,
	W: AsyncWrite + Unpin + Send + 'static,
{
	/// Creates a codec reading from `reader` and writing to `writer`.
	///
	/// For a child process this is `(child.stdout, child.stdin)`.
	pub fn new(reader: R, writer: W) -> Self {
		Self {
			reader,
			writer,
			max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
		}
	}

	pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
		self.max_message_size = max_message_size;
		self
	}
}

impl<S> IoCodec<ReadHalf<S>, WriteHalf<S>>
where
	S: AsyncRead + AsyncWrite + Send + 'static,
{
	/// Creates a codec over a single bidirectional stream.
	pub fn from_stream(stream: S) -> Self {
		let (reader, writer) = tokio::io::split(stream);
		Self {
			reader,
			writer,
			max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
		}
	}
}

impl<R, W> Codec for IoCodec<R, W>
where
	R: AsyncRead + Unpin + Send + 'static,
	W: AsyncWrite + Unpin + Send + 'static,
{
	fn into_parts(self) -> CodecParts {
		CodecParts {
			reader: Box::new(IoReader {
				reader: BufReader::new(self.reader),
				buf: Vec::new(),
				max_message_size: self.max_message_size,
			}),
			writer: Box::new(IoWriter {
				writer: self.writer,
				buf: Vec::new(),
			}),
		}
	}
}

struct IoReader<R> {
	reader: BufReader<R>,
	buf: Vec<u8>,
	max_message_size: usize,
}

#[async_trait]
impl<R> MessageReader for IoReader<R>
where
	R: AsyncRead + Unpin + Send,
{
	async fn read_message(&mut self) -> Result<Option<Message>> {
		loop {
			self.buf.clear();
			let limit = self.max_message_size as u64 + 1;
			let read = (&mut self.reader)
				.take(limit)
				.read_until(b'\n', &mut self.buf)
				.await?;

			if read == 0 {
				return Ok(None);
			}

			if self.buf.len() > self.max_message_size {
				return Err(Error::Transport(format!(
					"message exceeds maximum size of {} bytes",
					self.max_message_size
				)));
			}

			if self.buf.iter().all(u8::is_ascii_whitespace) {
				continue;
			}

			tracing::trace!(
				target: "vipnode.rpc",
				bytes = self.buf.len(),
				"recv: {}",
				String::from_utf8_lossy(&self.buf).trim_end()
			);
			return Message::decode(&self.buf).map(Some);
		}
	}
}

struct IoWriter<W> {
	writer: W,
	buf: Vec<u8>,
}

#[async_trait]
impl<W> MessageWriter for IoWriter<W>
where
	W: AsyncWrite + Unpin + Send,
{
	async fn write_message(&mut self, message: &Message) -> Result<()> {
		self.buf.clear();
		serde_json::to_writer(&mut self.buf, message)?;
		tracing::trace!(target: "vipnode.rpc", "send: {}", String::from_utf8_lossy(&self.buf));
		self.buf.push(b'\n');

		self.writer.write_all(&self.buf).await?;
		self.writer.flush().await?;
		Ok(())
	}

	async fn close(&mut self) -> Result<()> {
		self.writer.shutdown().await?;
		Ok(())
	}
}
