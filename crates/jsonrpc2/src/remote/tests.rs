use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::*;
use crate::codec::IoCodec;
use crate::handler::Methods;
use crate::message::ErrorCode;
use crate::service::ServiceExt;

fn echo_server() -> Arc<Server> {
	let server = Server::new();
	server
		.register(
			"echo_",
			Methods::new()
				.method("ping", || async { "pong" })
				.method("slow", |n: u64| async move {
					tokio::time::sleep(Duration::from_millis((10 - n) * 5)).await;
					n
				}),
		)
		.unwrap();
	Arc::new(server)
}

fn spawn_serve(remote: &Remote) -> JoinHandle<Result<()>> {
	let remote = remote.clone();
	tokio::spawn(async move { remote.serve().await })
}

fn connected(left: Arc<Server>, right: Arc<Server>) -> (Remote, Remote) {
	let (a, b) = tokio::io::duplex(64 * 1024);
	let a = Remote::new(IoCodec::from_stream(a), left);
	let b = Remote::new(IoCodec::from_stream(b), right);
	spawn_serve(&a);
	spawn_serve(&b);
	(a, b)
}

/// Peer that speaks raw line-delimited JSON.
struct RawPeer {
	lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
	writer: WriteHalf<DuplexStream>,
}

impl RawPeer {
	async fn recv(&mut self) -> Value {
		let line = self.lines.next_line().await.unwrap().expect("stream ended");
		serde_json::from_str(&line).unwrap()
	}

	async fn send(&mut self, text: &str) {
		self.writer.write_all(text.as_bytes()).await.unwrap();
		self.writer.write_all(b"\n").await.unwrap();
	}
}

fn with_raw_peer(config: RemoteConfig) -> (Remote, RawPeer) {
	let (ours, theirs) = tokio::io::duplex(64 * 1024);
	let remote = Remote::with_config(IoCodec::from_stream(ours), echo_server(), config);
	let (read, writer) = tokio::io::split(theirs);
	let peer = RawPeer {
		lines: BufReader::new(read).lines(),
		writer,
	};
	(remote, peer)
}

async fn wait_for_pending(remote: &Remote, count: usize) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while remote.pending_len() != count {
			tokio::task::yield_now().await;
		}
	})
	.await
	.expect("pending count not reached");
}

#[tokio::test]
async fn test_call_round_trip() {
	let (a, _b) = connected(Arc::new(Server::new()), echo_server());

	let pong: String = a.call("echo_ping", ()).await.unwrap();

	assert_eq!(pong, "pong");
	assert_eq!(a.pending_len(), 0);
	assert_eq!(a.state(), RemoteState::Serving);
}

#[tokio::test]
async fn test_unknown_method_is_rpc_error() {
	let (a, _b) = connected(Arc::new(Server::new()), echo_server());

	let err = a.call::<Value, _>("foo_doesNotExist", ()).await.unwrap_err();

	assert_eq!(err.code(), Some(ErrorCode::MethodNotFound));
	// the connection survives
	assert_eq!(a.call::<String, _>("echo_ping", ()).await.unwrap(), "pong");
}

#[tokio::test]
async fn test_reverse_call_through_context() {
	let caller = Server::new();
	caller
		.register(
			"peer_",
			Methods::new().method("greet", |name: String| async move { format!("hello {name}") }),
		)
		.unwrap();

	let callee = Server::new();
	callee
		.register(
			"pool_",
			Methods::new().try_method_with_context("hello", |ctx: Context, name: String| async move {
				let peer = ctx.service()?;
				let greeting: String = peer.call("peer_greet", (name,)).await?;
				Ok::<_, Error>(greeting.to_uppercase())
			}),
		)
		.unwrap();

	let (a, _b) = connected(Arc::new(caller), Arc::new(callee));

	let reply: String = a.call("pool_hello", ("bob",)).await.unwrap();
	assert_eq!(reply, "HELLO BOB");
}

#[tokio::test]
async fn test_concurrent_calls_resolve_by_id() {
	let (a, _b) = connected(Arc::new(Server::new()), echo_server());

	let calls = (0..10u64).map(|n| {
		let a = a.clone();
		async move { (n, a.call::<u64, _>("echo_slow", (n,)).await.unwrap()) }
	});
	let results = futures_util::future::join_all(calls).await;

	for (sent, received) in results {
		assert_eq!(sent, received);
	}
	assert_eq!(a.pending_len(), 0);
}

#[tokio::test]
async fn test_notification_gets_no_response() {
	let (tx, mut rx) = mpsc::unbounded_channel();
	let server = Server::new();
	server
		.register(
			"log_",
			Methods::new().method("note", move |text: String| {
				let tx = tx.clone();
				async move {
					let _ = tx.send(text);
				}
			}),
		)
		.unwrap();
	let (remote, mut peer) = {
		let (ours, theirs) = tokio::io::duplex(64 * 1024);
		let remote = Remote::new(IoCodec::from_stream(ours), Arc::new(server));
		let (read, writer) = tokio::io::split(theirs);
		(
			remote,
			RawPeer {
				lines: BufReader::new(read).lines(),
				writer,
			},
		)
	};
	spawn_serve(&remote);

	peer.send(r#"{"jsonrpc":"2.0","method":"log_note","params":["hi"]}"#).await;
	assert_eq!(rx.recv().await.unwrap(), "hi");

	// the next line on the wire answers this request, not the notification
	peer.send(r#"{"jsonrpc":"2.0","id":2,"method":"log_note","params":["again"]}"#)
		.await;
	let reply = peer.recv().await;
	assert_eq!(reply["id"], json!(2));
	assert_eq!(reply["result"], Value::Null);
}

#[tokio::test]
async fn test_malformed_input_gets_protocol_errors() {
	let (remote, mut peer) = with_raw_peer(RemoteConfig::default());
	spawn_serve(&remote);

	peer.send("{oops").await;
	let reply = peer.recv().await;
	assert_eq!(reply["error"]["code"], json!(-32700));
	assert_eq!(reply["id"], Value::Null);

	peer.send(r#"{"jsonrpc":"1.0","id":3,"method":"echo_ping"}"#).await;
	let reply = peer.recv().await;
	assert_eq!(reply["error"]["code"], json!(-32600));

	peer.send(r#"{"jsonrpc":"2.0","id":7,"method":"echo_ping"}"#).await;
	let reply = peer.recv().await;
	assert_eq!(reply["id"], json!(7));
	assert_eq!(reply["result"], json!("pong"));
	assert_eq!(remote.state(), RemoteState::Serving);
}

#[tokio::test]
async fn test_unmatched_response_is_ignored() {
	let (remote, mut peer) = with_raw_peer(RemoteConfig::default());
	spawn_serve(&remote);

	peer.send(r#"{"jsonrpc":"2.0","id":99,"result":"stray"}"#).await;
	peer.send(r#"{"jsonrpc":"2.0","id":"x","method":"echo_ping"}"#).await;

	let reply = peer.recv().await;
	assert_eq!(reply["id"], json!("x"));
	assert_eq!(reply["result"], json!("pong"));
}

#[tokio::test]
async fn test_malformed_response_releases_caller_without_reply() {
	let (remote, mut peer) = with_raw_peer(RemoteConfig::default());
	spawn_serve(&remote);

	let call = tokio::spawn({
		let remote = remote.clone();
		async move { remote.call_value("peer_answer", vec![]).await }
	});
	let request = peer.recv().await;
	assert_eq!(request["method"], json!("peer_answer"));

	let bad = json!({
		"jsonrpc": "2.0",
		"id": request["id"],
		"result": 1,
		"error": {"code": -32000, "message": "both"},
	});
	peer.send(&bad.to_string()).await;

	let err = tokio::time::timeout(Duration::from_secs(5), call)
		.await
		.expect("caller still blocked")
		.unwrap()
		.unwrap_err();
	assert!(matches!(err, Error::InvalidResponse { .. }), "got {err:?}");
	assert_eq!(remote.pending_len(), 0);

	// nothing was written back for the bad response
	peer.send(r#"{"jsonrpc":"2.0","id":"next","method":"echo_ping"}"#).await;
	let reply = peer.recv().await;
	assert_eq!(reply["id"], json!("next"));
	assert_eq!(reply["result"], json!("pong"));
}

#[tokio::test]
async fn test_null_id_request_is_answered() {
	let (remote, mut peer) = with_raw_peer(RemoteConfig::default());
	spawn_serve(&remote);

	peer.send(r#"{"jsonrpc":"2.0","id":null,"method":"echo_ping"}"#).await;

	let reply = peer.recv().await;
	assert_eq!(reply.get("id"), Some(&Value::Null));
	assert_eq!(reply["result"], json!("pong"));
}

#[tokio::test]
async fn test_pending_limit_discards_oldest() {
	let (remote, _peer) = with_raw_peer(RemoteConfig {
		pending_limit: 2,
		pending_discard: 1,
	});

	let first = tokio::spawn({
		let remote = remote.clone();
		async move { remote.call_value("never_answered", vec![]).await }
	});
	wait_for_pending(&remote, 1).await;
	let _second = tokio::spawn({
		let remote = remote.clone();
		async move { remote.call_value("never_answered", vec![]).await }
	});
	wait_for_pending(&remote, 2).await;
	let _third = tokio::spawn({
		let remote = remote.clone();
		async move { remote.call_value("never_answered", vec![]).await }
	});

	let err = first.await.unwrap().unwrap_err();
	assert!(matches!(err, Error::PendingDiscarded), "got {err:?}");
	assert!(err.is_retryable());
	wait_for_pending(&remote, 2).await;
}

#[tokio::test]
async fn test_close_releases_pending_callers() {
	let (remote, _peer) = with_raw_peer(RemoteConfig::default());
	let serving = spawn_serve(&remote);

	let call = tokio::spawn({
		let remote = remote.clone();
		async move { remote.call_value("never_answered", vec![]).await }
	});
	wait_for_pending(&remote, 1).await;

	remote.close().await.unwrap();

	assert!(matches!(call.await.unwrap(), Err(Error::ConnectionClosed)));
	assert!(serving.await.unwrap().is_ok());
	assert_eq!(remote.state(), RemoteState::Closed);
	assert_eq!(remote.pending_len(), 0);

	let err = remote.call_value("echo_ping", vec![]).await.unwrap_err();
	assert!(err.is_closed());
	remote.close().await.unwrap();
}

#[tokio::test]
async fn test_peer_disconnect_ends_serve() {
	let (remote, mut peer) = with_raw_peer(RemoteConfig::default());
	let serving = spawn_serve(&remote);

	let call = tokio::spawn({
		let remote = remote.clone();
		async move { remote.call_value("never_answered", vec![]).await }
	});
	let request = peer.recv().await;
	assert_eq!(request["method"], json!("never_answered"));
	drop(peer);

	assert!(serving.await.unwrap().is_ok());
	assert!(matches!(call.await.unwrap(), Err(Error::ConnectionClosed)));
	assert!(remote.is_closed());
}

#[tokio::test]
async fn test_abandoned_call_clears_pending_entry() {
	let (remote, _peer) = with_raw_peer(RemoteConfig::default());
	spawn_serve(&remote);

	let outcome = tokio::time::timeout(
		Duration::from_millis(50),
		remote.call_value("never_answered", vec![]),
	)
	.await;

	assert!(outcome.is_err());
	assert_eq!(remote.pending_len(), 0);
}

#[tokio::test]
async fn test_serve_twice_is_rejected() {
	let (remote, _peer) = with_raw_peer(RemoteConfig::default());
	spawn_serve(&remote);

	tokio::time::timeout(Duration::from_secs(5), async {
		while remote.state() != RemoteState::Serving {
			tokio::task::yield_now().await;
		}
	})
	.await
	.unwrap();

	assert!(matches!(remote.serve().await, Err(Error::AlreadyServing)));
}
