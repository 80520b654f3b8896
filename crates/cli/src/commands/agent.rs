use anyhow::Result;
use vipnode_protocol::{CLIENT, ClientRequest, ClientResponse, NodeId};

use crate::cli::AgentArgs;

/// Asks the pool for hosts and prints them to stdout as a JSON array.
pub async fn run(args: AgentArgs) -> Result<()> {
	let request = ClientRequest {
		kind: args.kind,
		num_hosts: args.num_hosts,
	};
	let response: ClientResponse =
		super::call_pool(&args.pool, CLIENT, (NodeId::new(args.node_id), request)).await?;

	if let Some(message) = &response.message {
		tracing::info!(target: "vipnode.cli", %message, "message from pool");
	}
	tracing::info!(
		target: "vipnode.cli",
		hosts = response.hosts.len(),
		pool_version = %response.pool_version,
		"received hosts"
	);
	println!("{}", serde_json::to_string_pretty(&response.hosts)?);
	Ok(())
}
