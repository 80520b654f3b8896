//! Server role: method registry and request dispatch.
//!
//! Registered names are `prefix + lower_first(name)`, so
//! `register("vipnode_", Methods::new().method("Host", ..))` answers
//! `vipnode_host`. Registering a name again replaces the earlier entry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::handler::{Method, Methods, Receiver};
use crate::message::{ErrResponse, Request, Response};
use crate::service::Context;

/// Method registry and dispatcher.
#[derive(Default)]
pub struct Server {
	methods: RwLock<HashMap<String, Method>>,
}

impl Server {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers every method in `methods` under `prefix`.
	///
	/// # Errors
	///
	/// Returns [`Error::Registration`] if the table is empty or a name is not
	/// a valid method identifier. Nothing is registered in that case.
	pub fn register(&self, prefix: &str, methods: Methods) -> Result<()> {
		if methods.is_empty() {
			return Err(Error::Registration(format!(
				"no methods to register under prefix {prefix:?}"
			)));
		}

		let entries = methods.into_entries();
		if let Some(bad) = entries.iter().find(|m| !is_valid_name(m.name())) {
			return Err(Error::Registration(format!(
				"invalid method name {:?}",
				bad.name()
			)));
		}

		let mut registry = self.methods.write();
		for method in entries {
			let key = format!("{prefix}{}", lower_first(method.name()));
			tracing::debug!(
				target: "vipnode.rpc",
				method = %key,
				arity = method.arity(),
				"registered method"
			);
			registry.insert(key.clone(), method.renamed(key));
		}
		Ok(())
	}

	/// Registers a [`Receiver`]'s own method table under `prefix`.
	pub fn register_receiver<R: Receiver>(&self, prefix: &str, receiver: Arc<R>) -> Result<()> {
		self.register(prefix, receiver.methods())
	}

	/// Returns the registered method names, sorted.
	pub fn method_names(&self) -> Vec<String> {
		let mut names: Vec<String> = self.methods.read().keys().cloned().collect();
		names.sort();
		names
	}

	pub fn has_method(&self, name: &str) -> bool {
		self.methods.read().contains_key(name)
	}

	/// Resolves and invokes `request`, always producing a response.
	///
	/// Unknown method, params that are not a positional array of the right
	/// length and shape, handler errors and unserializable results each map
	/// to their JSON-RPC error code.
	pub async fn handle(&self, ctx: Context, request: &Request) -> Response {
		// Clone out of the lock; handlers run without holding it.
		let method = self.methods.read().get(&request.method).cloned();
		let Some(method) = method else {
			tracing::debug!(target: "vipnode.rpc", method = %request.method, "method not found");
			return Response::Error(ErrResponse::method_not_found(&request.method));
		};

		let params = match positional_params(request.params.as_ref(), method.arity()) {
			Ok(params) => params,
			Err(err) => return Response::Error(err),
		};

		let result = method.call(ctx, params).await;
		if let Err(err) = &result {
			tracing::debug!(
				target: "vipnode.rpc",
				method = %request.method,
				code = i64::from(err.code),
				error = %err.message,
				"method returned error"
			);
		}
		Response::from(result)
	}
}

fn positional_params(
	params: Option<&Value>,
	arity: usize,
) -> std::result::Result<Vec<Value>, ErrResponse> {
	let params = match params {
		None | Some(Value::Null) => Vec::new(),
		Some(Value::Array(values)) => values.clone(),
		Some(_) => {
			return Err(ErrResponse::invalid_params(
				"params must be a positional array",
			));
		}
	};

	if params.len() != arity {
		return Err(ErrResponse::invalid_params(format!(
			"expected {arity} params, got {}",
			params.len()
		)));
	}

	Ok(params)
}

fn is_valid_name(name: &str) -> bool {
	!name.is_empty()
		&& name
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn lower_first(name: &str) -> String {
	let mut chars = name.chars();
	match chars.next() {
		Some(first) => first.to_lowercase().chain(chars).collect(),
		None => String::new(),
	}
}
