//! `vipnode host`: registers a full node's peer slots with a pool.
//!
//! The connection stays open for the life of the command. The pool calls
//! `vipnode_whitelist` back over it whenever it hands this host to an
//! agent, and the host reports its whitelisted agents as peers on every
//! update tick.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use jsonrpc2::{Remote, Server};
use vipnode_pool::Whitelist;
use vipnode_protocol::{
	DISCONNECT, HOST, HostRequest, HostResponse, NodeId, PREFIX, UPDATE, UpdateRequest,
	UpdateResponse,
};

use crate::cli::HostArgs;

pub async fn run(args: HostArgs) -> Result<()> {
	let node_id = node_id(&args)?;
	let whitelist = Arc::new(Whitelist::new());
	let server = Server::new();
	server
		.register_receiver(PREFIX, whitelist.clone())
		.context("failed to register host methods")?;

	let (remote, serving) =
		super::connect(&args.pool.url, server, args.connection.remote_config()).await?;

	let request = HostRequest {
		kind: args.kind,
		node_uri: args.uri.clone(),
		max_peers: args.max_peers,
	};
	let response: HostResponse = remote
		.call(HOST, (node_id.clone(), request))
		.await
		.context("pool rejected host registration")?;
	tracing::info!(
		target: "vipnode.cli",
		node = %node_id,
		pool_version = %response.pool_version,
		"registered as host"
	);

	let result = tokio::select! {
		result = report_peers(&remote, &node_id, &whitelist, args.update_interval()) => result,
		joined = serving => match joined {
			Ok(Ok(())) => Err(anyhow!("pool closed the connection")),
			Ok(Err(err)) => Err(err).context("connection to pool failed"),
			Err(err) => Err(err.into()),
		},
		signal = tokio::signal::ctrl_c() => match signal {
			Ok(()) => {
				leave(&remote, &node_id).await;
				Ok(())
			}
			Err(err) => Err(err).context("failed to listen for ctrl-c"),
		},
	};

	if let Err(err) = remote.close().await {
		tracing::debug!(target: "vipnode.cli", error = %err, "close failed");
	}
	result
}

/// Uses `--node-id` when given, otherwise the ID inside the enode URI.
pub fn node_id(args: &HostArgs) -> Result<NodeId> {
	match &args.node_id {
		Some(id) => Ok(NodeId::new(id.as_str())),
		None => NodeId::from_enode(&args.uri)
			.ok_or_else(|| anyhow!("no node ID in {}, pass --node-id", args.uri)),
	}
}

/// Sends `vipnode_update` every `every` until the connection closes.
async fn report_peers(
	remote: &Remote,
	node_id: &NodeId,
	whitelist: &Whitelist,
	every: Duration,
) -> Result<()> {
	let mut ticker = tokio::time::interval(every);
	// registration just happened
	ticker.tick().await;

	loop {
		ticker.tick().await;

		let request = UpdateRequest {
			peers: whitelist.nodes(),
			block_number: 0,
		};
		match remote
			.call::<UpdateResponse, _>(UPDATE, (node_id.clone(), request))
			.await
		{
			Ok(response) => {
				tracing::debug!(
					target: "vipnode.cli",
					active = response.active_peers.len(),
					invalid = response.invalid_peers.len(),
					"peers reported"
				);
			}
			Err(err) if err.is_closed() => {
				return Err(err).context("connection to pool closed");
			}
			Err(err) => {
				tracing::warn!(target: "vipnode.cli", error = %err, "update failed");
			}
		}
	}
}

async fn leave(remote: &Remote, node_id: &NodeId) {
	match remote.call::<bool, _>(DISCONNECT, (node_id.clone(),)).await {
		Ok(_) => tracing::info!(target: "vipnode.cli", node = %node_id, "left pool"),
		Err(err) => tracing::warn!(target: "vipnode.cli", error = %err, "disconnect failed"),
	}
}
