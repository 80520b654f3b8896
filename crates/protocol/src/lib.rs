//! Wire types for the vipnode pool protocol.
//!
//! Pools, hosts and agents talk JSON-RPC 2.0 with positional params. Every
//! method lives under the [`PREFIX`] namespace:
//!
//! 1. A host connects and calls [`HOST`] with its [`HostRequest`]
//! 2. An agent calls [`CLIENT`] with a [`ClientRequest`]; the pool calls
//!    [`WHITELIST`] back on each selected host before answering
//! 3. Hosts and agents report their peers with [`UPDATE`]
//! 4. Either side leaves with [`DISCONNECT`]
//!
//! # Main Types
//!
//! - [`NodeId`] - Ethereum node identity (enode public key)
//! - [`HostRequest`] / [`HostResponse`] - host registration
//! - [`ClientRequest`] / [`ClientResponse`] - agent asking for hosts
//! - [`UpdateRequest`] / [`UpdateResponse`] - periodic peer report

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Method namespace shared by every pool call.
pub const PREFIX: &str = "vipnode_";

pub const PING: &str = "vipnode_ping";
pub const HOST: &str = "vipnode_host";
pub const CLIENT: &str = "vipnode_client";
pub const UPDATE: &str = "vipnode_update";
pub const DISCONNECT: &str = "vipnode_disconnect";
/// Served by hosts, called by the pool.
pub const WHITELIST: &str = "vipnode_whitelist";

/// Protocol version reported by pools.
pub const POOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hosts returned to an agent when it does not ask for a number.
pub const DEFAULT_NUM_HOSTS: usize = 3;

/// Peer slots a host offers when it does not say otherwise.
pub const DEFAULT_MAX_PEERS: usize = 10;

/// Node identity, the hex public key from an `enode://` URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Extracts the ID from `enode://<id>@host:port`.
	pub fn from_enode(uri: &str) -> Option<Self> {
		let rest = uri.strip_prefix("enode://")?;
		let id = rest.split('@').next()?;
		(!id.is_empty()).then(|| Self::new(id))
	}
}

impl fmt::Display for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for NodeId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

/// Ethereum client implementation. Hosts only serve agents of the same kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
	Geth,
	Parity,
	#[default]
	#[serde(other)]
	Unknown,
}

impl NodeKind {
	pub fn as_str(self) -> &'static str {
		match self {
			NodeKind::Geth => "geth",
			NodeKind::Parity => "parity",
			NodeKind::Unknown => "unknown",
		}
	}

	/// Unknown kinds match anything.
	pub fn is_compatible(self, other: NodeKind) -> bool {
		self == other || self == NodeKind::Unknown || other == NodeKind::Unknown
	}
}

impl fmt::Display for NodeKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for NodeKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"geth" => Ok(NodeKind::Geth),
			"parity" | "openethereum" => Ok(NodeKind::Parity),
			"unknown" => Ok(NodeKind::Unknown),
			other => Err(format!("unknown node kind: {other}")),
		}
	}
}

/// Sent by a host offering peer slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRequest {
	#[serde(default)]
	pub kind: NodeKind,
	/// `enode://` URI agents should connect to.
	pub node_uri: String,
	#[serde(default = "default_max_peers")]
	pub max_peers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostResponse {
	pub pool_version: String,
}

/// Sent by an agent looking for hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest {
	#[serde(default)]
	pub kind: NodeKind,
	#[serde(default = "default_num_hosts")]
	pub num_hosts: usize,
}

impl Default for ClientRequest {
	fn default() -> Self {
		Self {
			kind: NodeKind::Unknown,
			num_hosts: DEFAULT_NUM_HOSTS,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientResponse {
	pub hosts: Vec<HostNode>,
	pub pool_version: String,
	/// Operator message shown to the agent, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

/// A host as seen by agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostNode {
	pub id: NodeId,
	pub uri: String,
	pub kind: NodeKind,
}

/// Periodic report of a node's connected peers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
	pub peers: Vec<NodeId>,
	#[serde(default)]
	pub block_number: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
	/// Reported peers the pool knows about.
	pub active_peers: Vec<NodeId>,
	/// Reported peers the pool does not know about.
	pub invalid_peers: Vec<NodeId>,
}

fn default_num_hosts() -> usize {
	DEFAULT_NUM_HOSTS
}

fn default_max_peers() -> usize {
	DEFAULT_MAX_PEERS
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn test_method_names_share_prefix() {
		for method in [PING, HOST, CLIENT, UPDATE, DISCONNECT, WHITELIST] {
			assert!(method.starts_with(PREFIX), "{method}");
		}
	}

	#[test]
	fn test_node_kind_wire_format() {
		assert_eq!(serde_json::to_value(NodeKind::Geth).unwrap(), json!("geth"));
		assert_eq!(
			serde_json::from_value::<NodeKind>(json!("parity")).unwrap(),
			NodeKind::Parity
		);
		assert_eq!(
			serde_json::from_value::<NodeKind>(json!("nethermind")).unwrap(),
			NodeKind::Unknown
		);
		assert_eq!("GETH".parse::<NodeKind>().unwrap(), NodeKind::Geth);
		assert!("bogus".parse::<NodeKind>().is_err());
	}

	#[test]
	fn test_request_defaults() {
		let request: ClientRequest = serde_json::from_value(json!({})).unwrap();
		assert_eq!(request, ClientRequest::default());

		let request: HostRequest =
			serde_json::from_value(json!({"node_uri": "enode://abc@127.0.0.1:30303"})).unwrap();
		assert_eq!(request.kind, NodeKind::Unknown);
		assert_eq!(request.max_peers, DEFAULT_MAX_PEERS);
	}

	#[test]
	fn test_client_response_shape() {
		let response = ClientResponse {
			hosts: vec![HostNode {
				id: NodeId::new("abc"),
				uri: "enode://abc@10.0.0.1:30303".to_string(),
				kind: NodeKind::Geth,
			}],
			pool_version: "1.0.0".to_string(),
			message: None,
		};

		assert_eq!(
			serde_json::to_value(&response).unwrap(),
			json!({
				"hosts": [{"id": "abc", "uri": "enode://abc@10.0.0.1:30303", "kind": "geth"}],
				"pool_version": "1.0.0",
			})
		);
	}

	#[test]
	fn test_node_id_from_enode() {
		assert_eq!(
			NodeId::from_enode("enode://deadbeef@127.0.0.1:30303"),
			Some(NodeId::new("deadbeef"))
		);
		assert_eq!(NodeId::from_enode("http://x"), None);
		assert_eq!(NodeId::from_enode("enode://@host"), None);
	}

	#[test]
	fn test_kind_compatibility() {
		assert!(NodeKind::Geth.is_compatible(NodeKind::Geth));
		assert!(NodeKind::Unknown.is_compatible(NodeKind::Parity));
		assert!(!NodeKind::Geth.is_compatible(NodeKind::Parity));
	}
}
