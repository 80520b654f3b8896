//! Pool coordinator: tracks hosts and agents and pairs them up.
//!
//! All bookkeeping lives in memory behind one lock, held only for map
//! operations. Hosts are remembered together with the [`Service`] of the
//! connection they registered on, so the pool can whitelist agents on them
//! while answering the agent's own call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use jsonrpc2::{Context, Methods, Receiver, Service, ServiceExt};
use parking_lot::Mutex;
use vipnode_protocol::{
	ClientRequest, ClientResponse, HostNode, HostRequest, HostResponse, NodeId, NodeKind,
	POOL_VERSION, UpdateRequest, UpdateResponse, WHITELIST,
};

use crate::error::{PoolError, Result};

enum Role {
	Host {
		uri: String,
		max_peers: usize,
		service: Arc<dyn Service>,
	},
	Agent,
}

struct Node {
	kind: NodeKind,
	role: Role,
	peers: HashSet<NodeId>,
	block_number: u64,
	last_seen: Instant,
}

impl Node {
	fn new(kind: NodeKind, role: Role) -> Self {
		Self {
			kind,
			role,
			peers: HashSet::new(),
			block_number: 0,
			last_seen: Instant::now(),
		}
	}
}

struct Candidate {
	id: NodeId,
	uri: String,
	kind: NodeKind,
	load: usize,
	service: Arc<dyn Service>,
}

/// In-memory pool. Register with [`jsonrpc2::Server::register_receiver`]
/// under [`vipnode_protocol::PREFIX`].
#[derive(Default)]
pub struct Pool {
	nodes: Mutex<HashMap<NodeId, Node>>,
	message: Option<String>,
}

impl Pool {
	pub fn new() -> Self {
		Self::default()
	}

	/// Operator message included in every client response.
	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());
		self
	}

	pub fn ping(&self) -> &'static str {
		"pong"
	}

	/// Registers `node_id` as a host reachable over the calling connection.
	///
	/// # Errors
	///
	/// Fails if the request came over a transport that cannot call back, or
	/// if `node_uri` is empty.
	pub fn host(&self, ctx: &Context, node_id: NodeId, request: HostRequest) -> Result<HostResponse> {
		if request.node_uri.trim().is_empty() {
			return Err(PoolError::InvalidRequest("node_uri is required".to_string()));
		}
		if request.max_peers == 0 {
			return Err(PoolError::InvalidRequest("max_peers must be positive".to_string()));
		}
		let service = ctx.service()?;

		tracing::info!(
			target: "vipnode.pool",
			node = %node_id,
			kind = %request.kind,
			max_peers = request.max_peers,
			"host registered"
		);
		let node = Node::new(
			request.kind,
			Role::Host {
				uri: request.node_uri,
				max_peers: request.max_peers,
				service,
			},
		);
		self.nodes.lock().insert(node_id, node);

		Ok(HostResponse {
			pool_version: POOL_VERSION.to_string(),
		})
	}

	/// Finds hosts for the agent `node_id` and whitelists it on each.
	///
	/// Hosts are picked least loaded first among those of a compatible kind
	/// with a free peer slot. A host whose whitelist call fails is forgotten
	/// and skipped. Each accepted host counts the agent as a peer right away.
	pub async fn client(&self, node_id: NodeId, request: ClientRequest) -> Result<ClientResponse> {
		let wanted = request.num_hosts.max(1);
		let mut remaining = self.candidates(&node_id, request.kind).into_iter();

		let mut hosts = Vec::new();
		while hosts.len() < wanted {
			let batch: Vec<Candidate> = remaining.by_ref().take(wanted - hosts.len()).collect();
			if batch.is_empty() {
				break;
			}

			let calls = batch.iter().map(|candidate| {
				let agent = node_id.clone();
				async move {
					candidate
						.service
						.call::<(), _>(WHITELIST, (agent,))
						.await
				}
			});
			let results = join_all(calls).await;

			for (candidate, result) in batch.into_iter().zip(results) {
				match result {
					Ok(()) => hosts.push(HostNode {
						id: candidate.id,
						uri: candidate.uri,
						kind: candidate.kind,
					}),
					Err(err) => {
						tracing::warn!(
							target: "vipnode.pool",
							host = %candidate.id,
							error = %err,
							"whitelist failed, dropping host"
						);
						self.disconnect(&candidate.id);
					}
				}
			}
		}

		if hosts.is_empty() {
			return Err(PoolError::NoHostsAvailable);
		}

		{
			// Reserve the slots now; the next update from either side replaces them.
			let mut nodes = self.nodes.lock();
			for host in &hosts {
				if let Some(node) = nodes.get_mut(&host.id) {
					node.peers.insert(node_id.clone());
				}
			}
			let agent = nodes
				.entry(node_id.clone())
				.or_insert_with(|| Node::new(request.kind, Role::Agent));
			agent.peers.extend(hosts.iter().map(|host| host.id.clone()));
			agent.last_seen = Instant::now();
		}
		tracing::info!(
			target: "vipnode.pool",
			node = %node_id,
			hosts = hosts.len(),
			"client matched"
		);

		Ok(ClientResponse {
			hosts,
			pool_version: POOL_VERSION.to_string(),
			message: self.message.clone(),
		})
	}

	/// Replaces the peer set reported by `node_id`.
	pub fn update(&self, node_id: &NodeId, request: UpdateRequest) -> Result<UpdateResponse> {
		let mut nodes = self.nodes.lock();
		if !nodes.contains_key(node_id) {
			return Err(PoolError::UnknownNode(node_id.clone()));
		}

		let (active_peers, invalid_peers): (Vec<NodeId>, Vec<NodeId>) = request
			.peers
			.into_iter()
			.partition(|peer| nodes.contains_key(peer));

		if let Some(node) = nodes.get_mut(node_id) {
			node.peers = active_peers.iter().cloned().collect();
			node.block_number = request.block_number;
			node.last_seen = Instant::now();
		}
		tracing::debug!(
			target: "vipnode.pool",
			node = %node_id,
			block = request.block_number,
			active = active_peers.len(),
			invalid = invalid_peers.len(),
			"node updated"
		);

		Ok(UpdateResponse {
			active_peers,
			invalid_peers,
		})
	}

	/// Forgets `node_id` and drops it from every other node's peer set.
	/// Returns false if the node was not registered.
	pub fn disconnect(&self, node_id: &NodeId) -> bool {
		let mut nodes = self.nodes.lock();
		let removed = nodes.remove(node_id).is_some();
		for node in nodes.values_mut() {
			node.peers.remove(node_id);
		}
		if removed {
			tracing::info!(target: "vipnode.pool", node = %node_id, "node disconnected");
		}
		removed
	}

	/// Forgets every node not seen within `max_age`, returning their IDs.
	pub fn expire(&self, max_age: Duration) -> Vec<NodeId> {
		let mut nodes = self.nodes.lock();
		let mut expired: Vec<NodeId> = nodes
			.iter()
			.filter(|(_, node)| node.last_seen.elapsed() >= max_age)
			.map(|(id, _)| id.clone())
			.collect();
		expired.sort();

		for id in &expired {
			nodes.remove(id);
		}
		for node in nodes.values_mut() {
			node.peers.retain(|peer| !expired.contains(peer));
		}
		if !expired.is_empty() {
			tracing::info!(target: "vipnode.pool", count = expired.len(), "expired stale nodes");
		}
		expired
	}

	/// Registered hosts, sorted by ID.
	pub fn hosts(&self) -> Vec<HostNode> {
		let nodes = self.nodes.lock();
		let mut hosts: Vec<HostNode> = nodes
			.iter()
			.filter_map(|(id, node)| match &node.role {
				Role::Host { uri, .. } => Some(HostNode {
					id: id.clone(),
					uri: uri.clone(),
					kind: node.kind,
				}),
				Role::Agent => None,
			})
			.collect();
		hosts.sort_by(|a, b| a.id.cmp(&b.id));
		hosts
	}

	pub fn node_count(&self) -> usize {
		self.nodes.lock().len()
	}

	pub fn block_number(&self, node_id: &NodeId) -> Option<u64> {
		self.nodes.lock().get(node_id).map(|node| node.block_number)
	}

	fn candidates(&self, agent: &NodeId, kind: NodeKind) -> Vec<Candidate> {
		let nodes = self.nodes.lock();
		let connected = nodes
			.get(agent)
			.map(|node| node.peers.clone())
			.unwrap_or_default();

		let mut candidates: Vec<Candidate> = nodes
			.iter()
			.filter(|(id, _)| *id != agent && !connected.contains(*id))
			.filter_map(|(id, node)| match &node.role {
				Role::Host {
					uri,
					max_peers,
					service,
				} if node.kind.is_compatible(kind) && node.peers.len() < *max_peers => {
					Some(Candidate {
						id: id.clone(),
						uri: uri.clone(),
						kind: node.kind,
						load: node.peers.len(),
						service: service.clone(),
					})
				}
				_ => None,
			})
			.collect();
		candidates.sort_by(|a, b| a.load.cmp(&b.load).then_with(|| a.id.cmp(&b.id)));
		candidates
	}
}

impl Receiver for Pool {
	fn methods(self: Arc<Self>) -> Methods {
		let ping = self.clone();
		let host = self.clone();
		let client = self.clone();
		let update = self.clone();
		let disconnect = self;

		Methods::new()
			.method("ping", move || {
				let pool = ping.clone();
				async move { pool.ping() }
			})
			.try_method_with_context("host", move |ctx: Context, id: NodeId, request: HostRequest| {
				let pool = host.clone();
				async move { pool.host(&ctx, id, request) }
			})
			.try_method("client", move |id: NodeId, request: ClientRequest| {
				let pool = client.clone();
				async move { pool.client(id, request).await }
			})
			.try_method("update", move |id: NodeId, request: UpdateRequest| {
				let pool = update.clone();
				async move { pool.update(&id, request) }
			})
			.method("disconnect", move |id: NodeId| {
				let pool = disconnect.clone();
				async move { pool.disconnect(&id) }
			})
	}
}
