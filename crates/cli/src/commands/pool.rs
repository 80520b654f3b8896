//! `vipnode pool`: serves the pool over WebSocket and, optionally, HTTP.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use jsonrpc2::{HttpServer, Server, websocket};
use tokio::net::TcpListener;
use vipnode_pool::Pool;
use vipnode_protocol::PREFIX;

use crate::cli::PoolArgs;

/// A configured pool that has not started listening yet.
pub struct PoolCommand {
	args: PoolArgs,
	pool: Arc<Pool>,
	server: Arc<Server>,
}

impl PoolCommand {
	pub fn new(args: PoolArgs) -> Result<Self> {
		let mut pool = Pool::new();
		if let Some(message) = &args.message {
			pool = pool.with_message(message.as_str());
		}
		let pool = Arc::new(pool);

		let server = Server::new();
		server
			.register_receiver(PREFIX, pool.clone())
			.context("failed to register pool methods")?;

		Ok(Self {
			args,
			pool,
			server: Arc::new(server),
		})
	}

	pub fn pool(&self) -> &Arc<Pool> {
		&self.pool
	}

	/// Serves on already-bound listeners until `shutdown` resolves or a
	/// listener fails.
	pub async fn serve(
		self,
		listener: TcpListener,
		http_listener: Option<TcpListener>,
		shutdown: impl Future<Output = ()>,
	) -> Result<()> {
		let ws = websocket::serve(listener, self.server.clone(), self.args.connection.remote_config());

		let http = async {
			match http_listener {
				Some(listener) => {
					HttpServer::new(self.server.clone())
						.with_max_content_length(self.args.max_content_length)
						.serve(listener)
						.await
				}
				None => std::future::pending().await,
			}
		};

		tokio::select! {
			result = ws => result.context("websocket listener failed"),
			result = http => result.context("http listener failed"),
			() = expire_nodes(self.pool.clone(), self.args.expire_after()) => Ok(()),
			() = shutdown => {
				tracing::info!(target: "vipnode.cli", "shutting down");
				Ok(())
			}
		}
	}
}

pub async fn run(args: PoolArgs) -> Result<()> {
	let listener = TcpListener::bind(args.bind)
		.await
		.with_context(|| format!("failed to bind {}", args.bind))?;
	let http_listener = match args.http_bind {
		Some(addr) => Some(
			TcpListener::bind(addr)
				.await
				.with_context(|| format!("failed to bind {addr}"))?,
		),
		None => None,
	};

	let shutdown = async {
		if let Err(err) = tokio::signal::ctrl_c().await {
			tracing::warn!(target: "vipnode.cli", error = %err, "failed to listen for ctrl-c");
			std::future::pending::<()>().await;
		}
	};
	PoolCommand::new(args)?.serve(listener, http_listener, shutdown).await
}

async fn expire_nodes(pool: Arc<Pool>, max_age: Duration) {
	let mut ticker = tokio::time::interval(max_age);
	loop {
		ticker.tick().await;
		let expired = pool.expire(max_age);
		if !expired.is_empty() {
			tracing::debug!(target: "vipnode.cli", nodes = ?expired, "expired nodes");
		}
	}
}
