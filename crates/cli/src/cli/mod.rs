
use std::net::SocketAddr;
use std::time::Duration;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand};
use jsonrpc2::RemoteConfig;
use jsonrpc2::http::DEFAULT_MAX_CONTENT_LENGTH;
use jsonrpc2::pending::{DEFAULT_PENDING_DISCARD, DEFAULT_PENDING_LIMIT};
use vipnode_protocol::{DEFAULT_MAX_PEERS, DEFAULT_NUM_HOSTS, NodeKind};

/// Root CLI for vipnode.
#[derive(Parser, Debug)]
#[command(name = "vipnode")]
#[command(about = "Pool, host and agent for sharing Ethereum full node peer slots")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run a pool that pairs agents with hosts.
	Pool(PoolArgs),
	/// Offer peer slots on a full node through a pool.
	Host(HostArgs),
	/// Ask a pool for hosts and print them as JSON.
	Agent(AgentArgs),
	/// Check that a pool answers.
	Ping(PingArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PoolArgs {
	/// WebSocket listen address.
	#[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8080")]
	pub bind: SocketAddr,

	/// Also accept one-shot calls over HTTP POST on this address.
	#[arg(long, value_name = "ADDR")]
	pub http_bind: Option<SocketAddr>,

	/// Largest HTTP request body accepted, in bytes.
	#[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_CONTENT_LENGTH)]
	pub max_content_length: usize,

	#[command(flatten)]
	pub connection: ConnectionArgs,

	/// Forget nodes not heard from in this many seconds.
	#[arg(long, value_name = "SECS", default_value_t = 300)]
	pub expire_after: u64,

	/// Message shown to agents with every host list.
	#[arg(long)]
	pub message: Option<String>,
}

impl PoolArgs {
	pub fn expire_after(&self) -> Duration {
		Duration::from_secs(self.expire_after.max(1))
	}
}

/// Outstanding-call limits for each connection.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
	/// Outstanding outbound calls per connection before the oldest are discarded.
	#[arg(long, value_name = "N", default_value_t = DEFAULT_PENDING_LIMIT)]
	pub pending_limit: usize,

	/// How many outstanding calls to discard once the limit is hit.
	#[arg(long, value_name = "N", default_value_t = DEFAULT_PENDING_DISCARD)]
	pub pending_discard: usize,
}

impl ConnectionArgs {
	pub fn remote_config(&self) -> RemoteConfig {
		RemoteConfig {
			pending_limit: self.pending_limit,
			pending_discard: self.pending_discard,
		}
	}
}

#[derive(Args, Debug, Clone)]
pub struct HostArgs {
	#[command(flatten)]
	pub pool: PoolUrl,

	/// enode:// URI agents should connect to.
	#[arg(long, value_name = "ENODE")]
	pub uri: String,

	/// Node ID to register as. Taken from --uri when omitted.
	#[arg(long, value_name = "ID")]
	pub node_id: Option<String>,

	#[arg(long, default_value = "geth")]
	pub kind: NodeKind,

	/// Peer slots offered to agents.
	#[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_PEERS)]
	pub max_peers: usize,

	/// Seconds between peer reports sent to the pool.
	#[arg(long, value_name = "SECS", default_value_t = 60)]
	pub update_interval: u64,

	#[command(flatten)]
	pub connection: ConnectionArgs,
}

impl HostArgs {
	pub fn update_interval(&self) -> Duration {
		Duration::from_secs(self.update_interval.max(1))
	}
}

#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
	#[command(flatten)]
	pub pool: PoolUrl,

	/// Node ID of the local full node.
	#[arg(long, value_name = "ID")]
	pub node_id: String,

	#[arg(long, default_value = "geth")]
	pub kind: NodeKind,

	/// How many hosts to ask for.
	#[arg(long, value_name = "N", default_value_t = DEFAULT_NUM_HOSTS)]
	pub num_hosts: usize,
}

#[derive(Args, Debug, Clone)]
pub struct PingArgs {
	#[command(flatten)]
	pub pool: PoolUrl,
}

#[derive(Args, Debug, Clone)]
pub struct PoolUrl {
	/// Pool endpoint: ws:// or wss:// for a connection, http:// or https:// for one-shot calls.
	#[arg(long = "pool", value_name = "URL", default_value = "ws://127.0.0.1:8080")]
	pub url: String,
}

impl PoolUrl {
	pub fn is_http(&self) -> bool {
		self.url.starts_with("http://") || self.url.starts_with("https://")
	}
}

fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Yellow.on_default().bold())
		.usage(AnsiColor::Yellow.on_default().bold())
		.literal(AnsiColor::Green.on_default())
		.placeholder(AnsiColor::Green.on_default())
}
