// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing how a [`TokenCache`](crate::cache::TokenCache) served
/// its callers.
#[derive(Debug, Default)]
pub struct CacheStats {
	hits: AtomicU64,
	joins: AtomicU64,
	fetches: AtomicU64,
	failures: AtomicU64,
}
impl CacheStats {
	/// Calls answered from a valid cached token.
	pub fn hits(&self) -> u64 {
		self.hits.load(Ordering::Relaxed)
	}

	/// Calls that attached to an in-flight fetch.
	pub fn joins(&self) -> u64 {
		self.joins.load(Ordering::Relaxed)
	}

	/// Fetches started; equals the number of token exchanges attempted.
	pub fn fetches(&self) -> u64 {
		self.fetches.load(Ordering::Relaxed)
	}

	/// Fetches that resolved to an error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_hit(&self) {
		self.hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_join(&self) {
		self.joins.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_fetch(&self) {
		self.fetches.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
