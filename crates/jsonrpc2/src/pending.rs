//! Pending-call table: correlates outbound request IDs with waiting callers.
//!
//! The table is bounded. Inserting into a full table first evicts the
//! `discard` entries with the oldest enqueue time (insertion sequence breaks
//! ties). Evicted waiters are handed back to the caller so they can be
//! released after the table lock is dropped.

use std::collections::HashMap;
use std::time::Instant;

/// Default bound on in-flight calls per connection.
pub const DEFAULT_PENDING_LIMIT: usize = 50;

/// Default number of entries evicted when the bound is hit.
pub const DEFAULT_PENDING_DISCARD: usize = 10;

struct Entry<W> {
	waiter: W,
	enqueued_at: Instant,
	seq: u64,
}

/// Bounded map from request-ID key to waiter.
pub struct PendingTable<W> {
	entries: HashMap<String, Entry<W>>,
	limit: usize,
	discard: usize,
	next_seq: u64,
}

impl<W> Default for PendingTable<W> {
	fn default() -> Self {
		Self::new(DEFAULT_PENDING_LIMIT, DEFAULT_PENDING_DISCARD)
	}
}

impl<W> PendingTable<W> {
	/// Creates a table holding at most `limit` entries.
	///
	/// `limit == 0` disables the bound. `discard` is clamped to `1..=limit`.
	pub fn new(limit: usize, discard: usize) -> Self {
		Self {
			entries: HashMap::new(),
			limit,
			discard: discard.clamp(1, limit.max(1)),
			next_seq: 0,
		}
	}

	pub fn limit(&self) -> usize {
		self.limit
	}

	pub fn discard(&self) -> usize {
		self.discard
	}

	/// Inserts a waiter under `key`, returning any waiters that were evicted.
	///
	/// A waiter already stored under the same key is replaced and returned
	/// with the evicted ones.
	pub fn insert(&mut self, key: String, waiter: W) -> Vec<W> {
		let mut evicted = Vec::new();
		if let Some(previous) = self.entries.remove(&key) {
			evicted.push(previous.waiter);
		}

		if self.limit > 0 && self.entries.len() >= self.limit {
			evicted.extend(self.evict_oldest(self.discard));
		}

		let seq = self.next_seq;
		self.next_seq += 1;
		self.entries.insert(
			key,
			Entry {
				waiter,
				enqueued_at: Instant::now(),
				seq,
			},
		);
		evicted
	}

	pub fn remove(&mut self, key: &str) -> Option<W> {
		self.entries.remove(key).map(|entry| entry.waiter)
	}

	pub fn contains(&self, key: &str) -> bool {
		self.entries.contains_key(key)
	}

	/// Removes every entry, oldest first.
	pub fn drain(&mut self) -> Vec<W> {
		let mut entries: Vec<Entry<W>> = self.entries.drain().map(|(_, entry)| entry).collect();
		entries.sort_by_key(|entry| (entry.enqueued_at, entry.seq));
		entries.into_iter().map(|entry| entry.waiter).collect()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	fn evict_oldest(&mut self, count: usize) -> Vec<W> {
		let mut order: Vec<(Instant, u64, String)> = self
			.entries
			.iter()
			.map(|(key, entry)| (entry.enqueued_at, entry.seq, key.clone()))
			.collect();
		order.sort_unstable();

		order
			.into_iter()
			.take(count)
			.filter_map(|(_, _, key)| self.entries.remove(&key))
			.map(|entry| entry.waiter)
			.collect()
	}
}
