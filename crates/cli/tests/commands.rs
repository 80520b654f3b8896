//! End-to-end tests running the `vipnode` binary against an in-process pool.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use jsonrpc2::http::DEFAULT_MAX_CONTENT_LENGTH;
use jsonrpc2::pending::{DEFAULT_PENDING_DISCARD, DEFAULT_PENDING_LIMIT};
use tokio::net::TcpListener;
use tokio::process::Command;
use vipnode_cli::cli::{ConnectionArgs, PoolArgs};
use vipnode_cli::commands::pool::PoolCommand;
use vipnode_pool::Pool;
use vipnode_protocol::{HostNode, NodeId, NodeKind};

struct TestPool {
	ws_url: String,
	http_url: String,
	pool: Arc<Pool>,
}

async fn start_pool() -> TestPool {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let ws_url = format!("ws://{}", listener.local_addr().unwrap());
	let http_url = format!("http://{}/", http_listener.local_addr().unwrap());

	let args = PoolArgs {
		bind: listener.local_addr().unwrap(),
		http_bind: Some(http_listener.local_addr().unwrap()),
		max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
		connection: ConnectionArgs {
			pending_limit: DEFAULT_PENDING_LIMIT,
			pending_discard: DEFAULT_PENDING_DISCARD,
		},
		expire_after: 300,
		message: Some("be nice".to_string()),
	};
	let command = PoolCommand::new(args).unwrap();
	let pool = command.pool().clone();
	tokio::spawn(command.serve(listener, Some(http_listener), std::future::pending()));

	TestPool {
		ws_url,
		http_url,
		pool,
	}
}

fn vipnode() -> Command {
	let mut command = Command::new(env!("CARGO_BIN_EXE_vipnode"));
	command
		.env_remove("RUST_LOG")
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true);
	command
}

async fn wait_for_host(pool: &Pool) {
	for _ in 0..100 {
		if !pool.hosts().is_empty() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}
	panic!("host never registered");
}

#[tokio::test]
async fn ping_over_websocket() {
	let pool = start_pool().await;

	let output = vipnode()
		.args(["ping", "--pool", &pool.ws_url])
		.output()
		.await
		.unwrap();

	assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
	assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "pong");
}

#[tokio::test]
async fn ping_over_http() {
	let pool = start_pool().await;

	let output = vipnode()
		.args(["ping", "--pool", &pool.http_url])
		.output()
		.await
		.unwrap();

	assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
	assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "pong");
}

#[tokio::test]
async fn agent_without_hosts_fails() {
	let pool = start_pool().await;

	let output = vipnode()
		.args(["agent", "--pool", &pool.ws_url, "--node-id", "agent1"])
		.output()
		.await
		.unwrap();

	assert_eq!(output.status.code(), Some(1));
	let stderr = String::from_utf8_lossy(&output.stderr);
	assert!(stderr.contains("no hosts available"), "{stderr}");
}

#[tokio::test]
async fn agent_receives_running_host() {
	let pool = start_pool().await;

	let _host = vipnode()
		.args([
			"host",
			"--pool",
			&pool.ws_url,
			"--uri",
			"enode://hostid@127.0.0.1:30303",
			"--kind",
			"geth",
		])
		.spawn()
		.unwrap();
	wait_for_host(&pool.pool).await;

	let output = vipnode()
		.args([
			"agent",
			"--pool",
			&pool.ws_url,
			"--node-id",
			"agent1",
			"--num-hosts",
			"1",
		])
		.output()
		.await
		.unwrap();

	assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
	let hosts: Vec<HostNode> = serde_json::from_slice(&output.stdout).unwrap();
	assert_eq!(
		hosts,
		vec![HostNode {
			id: NodeId::new("hostid"),
			uri: "enode://hostid@127.0.0.1:30303".to_string(),
			kind: NodeKind::Geth,
		}]
	);
}

#[tokio::test]
async fn host_requires_websocket_pool() {
	let pool = start_pool().await;

	let output = vipnode()
		.args([
			"host",
			"--pool",
			&pool.http_url,
			"--uri",
			"enode://hostid@127.0.0.1:30303",
		])
		.output()
		.await
		.unwrap();

	assert_eq!(output.status.code(), Some(1));
	assert!(pool.pool.hosts().is_empty());
}
