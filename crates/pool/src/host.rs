//! Host side of the pool protocol: methods the pool calls back on hosts.

use std::sync::Arc;

use jsonrpc2::{Methods, Receiver};
use parking_lot::Mutex;
use vipnode_protocol::NodeId;

/// Records agents the pool has whitelisted on this host.
#[derive(Debug, Default)]
pub struct Whitelist {
	nodes: Mutex<Vec<NodeId>>,
}

impl Whitelist {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds `node_id`. Returns false if it was already whitelisted.
	pub fn add(&self, node_id: NodeId) -> bool {
		let mut nodes = self.nodes.lock();
		if nodes.contains(&node_id) {
			return false;
		}
		tracing::info!(target: "vipnode.pool", node = %node_id, "whitelisted agent");
		nodes.push(node_id);
		true
	}

	pub fn contains(&self, node_id: &NodeId) -> bool {
		self.nodes.lock().contains(node_id)
	}

	/// Whitelisted agents in the order they arrived.
	pub fn nodes(&self) -> Vec<NodeId> {
		self.nodes.lock().clone()
	}
}

impl Receiver for Whitelist {
	fn methods(self: Arc<Self>) -> Methods {
		Methods::new().method("whitelist", move |node_id: NodeId| {
			let whitelist = self.clone();
			async move {
				whitelist.add(node_id);
			}
		})
	}
}
