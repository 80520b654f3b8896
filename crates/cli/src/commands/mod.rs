pub mod agent;
pub mod host;
pub mod ping;
pub mod pool;

use std::sync::Arc;

use anyhow::{Context, Result};
use jsonrpc2::{HttpService, Remote, RemoteConfig, Server, ServiceExt, websocket};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::cli::{Cli, Commands, PoolUrl};

pub async fn dispatch(cli: Cli) -> Result<()> {
	match cli.command {
		Commands::Pool(args) => pool::run(args).await,
		Commands::Host(args) => host::run(args).await,
		Commands::Agent(args) => agent::run(args).await,
		Commands::Ping(args) => ping::run(args).await,
	}
}

/// Dials a pool over WebSocket and serves `server` on the connection in the
/// background. The handle resolves when the connection ends.
pub(crate) async fn connect(
	url: &str,
	server: Server,
	config: RemoteConfig,
) -> Result<(Remote, JoinHandle<jsonrpc2::Result<()>>)> {
	let codec = websocket::dial(url)
		.await
		.with_context(|| format!("failed to connect to pool at {url}"))?;
	let remote = Remote::with_config(codec, Arc::new(server), config);
	let serving = tokio::spawn({
		let remote = remote.clone();
		async move { remote.serve().await }
	});
	tracing::debug!(target: "vipnode.cli", url, "connected to pool");
	Ok((remote, serving))
}

/// Makes one call to the pool: a single POST for `http(s)://` URLs, a
/// short-lived connection otherwise.
pub(crate) async fn call_pool<R, P>(pool: &PoolUrl, method: &str, params: P) -> Result<R>
where
	R: DeserializeOwned,
	P: Serialize + Send,
{
	if pool.is_http() {
		return HttpService::new(pool.url.as_str())
			.call(method, params)
			.await
			.with_context(|| format!("{method} failed"));
	}

	let (remote, _serving) = connect(&pool.url, Server::new(), RemoteConfig::default()).await?;
	let result = remote.call(method, params).await;
	if let Err(err) = remote.close().await {
		tracing::debug!(target: "vipnode.cli", error = %err, "close failed");
	}
	result.with_context(|| format!("{method} failed"))
}
