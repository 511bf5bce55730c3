//! Single-flight access-token cache keyed by normalized scope set.
//!
//! Each key moves through `Absent -> Pending -> Ready | Absent`. The check-or-claim step runs
//! under one lock: a valid [`Slot::Ready`] token is returned immediately, a live
//! [`Slot::Pending`] fetch is joined, and anything else (absent, expired, or a fetch whose
//! waiters all went away) is claimed by installing a new pending fetch before the lock is
//! released. Only the claiming caller's fetch future ever runs an exchange.
//!
//! Pending slots hold a [`WeakShared`] handle, so the map never keeps a fetch alive. The fetch
//! runs for as long as at least one waiter is polling it; a waiter that gives up (for example
//! through a timeout) detaches without disturbing the others, and the fetch is dropped only
//! when the last waiter leaves.
//!
//! Every settled fetch also sweeps the map, dropping expired tokens and abandoned fetches
//! under any key, so scope sets that stop being requested do not accumulate.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use futures::{
	FutureExt,
	future::{BoxFuture, Shared, WeakShared},
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeSet},
	error::AuthenticationError,
	obs::{self, AuthorizeOutcome, CacheStats},
};

/// Default safety margin subtracted from every token's expiry.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::seconds(30);

type FetchFuture = BoxFuture<'static, Result<AccessToken>>;

enum Slot {
	Pending { generation: u64, fetch: WeakShared<FetchFuture> },
	Ready(AccessToken),
}

enum Claim {
	Hit(AccessToken),
	Join(Shared<FetchFuture>),
	Owner(Shared<FetchFuture>),
}

struct Inner {
	entries: Mutex<HashMap<ScopeSet, Slot>>,
	generation: AtomicU64,
	margin: Duration,
	stats: CacheStats,
}

/// Shared, clonable token cache with at most one in-flight fetch per scope set.
#[derive(Clone)]
pub struct TokenCache {
	inner: Arc<Inner>,
}
impl TokenCache {
	/// Creates a cache applying `margin` to every expiry check; negative margins count as zero.
	pub fn new(margin: Duration) -> Self {
		Self {
			inner: Arc::new(Inner {
				entries: Default::default(),
				generation: AtomicU64::new(0),
				margin: margin.max(Duration::ZERO),
				stats: CacheStats::default(),
			}),
		}
	}

	/// Safety margin applied to expiry checks.
	pub fn margin(&self) -> Duration {
		self.inner.margin
	}

	/// Hit, join, and fetch counters.
	pub fn stats(&self) -> &CacheStats {
		&self.inner.stats
	}

	/// Returns a cached token for `scope` when it is still outside the safety margin.
	pub fn lookup(&self, scope: &ScopeSet) -> Option<AccessToken> {
		let now = OffsetDateTime::now_utc();

		match self.inner.entries.lock().get(scope) {
			Some(Slot::Ready(token)) if !token.is_expired_at(now, self.inner.margin) =>
				Some(token.clone()),
			_ => None,
		}
	}

	/// Returns the cached token for `scope`, joining or starting a fetch when needed.
	///
	/// `fetch` is only invoked when this caller claims the key, and it is invoked while the
	/// cache lock is held, so it must merely build its future. All callers attached to the
	/// same fetch receive the same outcome. Failures are never cached, and neither is a token
	/// that is already inside the safety margin when it arrives; that case resolves to
	/// [`AuthenticationError::ExpiredOnArrival`].
	pub async fn get_or_fetch<F, Fut>(&self, scope: &ScopeSet, fetch: F) -> Result<AccessToken>
	where
		F: FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = Result<AccessToken>>,
	{
		match self.claim(scope, fetch) {
			Claim::Hit(token) => {
				#[cfg(feature = "tracing")]
				tracing::debug!(scope = scope.as_str(), "Serving cached access token.");

				self.inner.stats.record_hit();
				obs::record_authorize_outcome(AuthorizeOutcome::CacheHit);

				Ok(token)
			},
			Claim::Join(shared) => {
				#[cfg(feature = "tracing")]
				tracing::debug!(scope = scope.as_str(), "Joining in-flight token fetch.");

				self.inner.stats.record_join();
				obs::record_authorize_outcome(AuthorizeOutcome::Joined);

				shared.await
			},
			Claim::Owner(shared) => {
				#[cfg(feature = "tracing")]
				tracing::debug!(scope = scope.as_str(), "Starting token fetch.");

				self.inner.stats.record_fetch();

				shared.await
			},
		}
	}

	/// Drops the entry for `scope`, returning whether one existed.
	///
	/// An in-flight fetch keeps running for its waiters but will no longer populate the cache.
	pub fn invalidate(&self, scope: &ScopeSet) -> bool {
		self.inner.entries.lock().remove(scope).is_some()
	}

	/// Removes expired tokens and abandoned fetches, returning how many entries were dropped.
	pub fn evict_expired(&self) -> usize {
		prune(&mut self.inner.entries.lock(), OffsetDateTime::now_utc(), self.inner.margin)
	}

	/// Drops every entry.
	pub fn clear(&self) {
		self.inner.entries.lock().clear();
	}

	/// Number of entries, pending or ready.
	pub fn len(&self) -> usize {
		self.inner.entries.lock().len()
	}

	/// Returns `true` when the cache holds no entries.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn claim<F, Fut>(&self, scope: &ScopeSet, fetch: F) -> Claim
	where
		F: FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = Result<AccessToken>>,
	{
		let now = OffsetDateTime::now_utc();
		let mut entries = self.inner.entries.lock();

		match entries.get(scope) {
			Some(Slot::Ready(token)) if !token.is_expired_at(now, self.inner.margin) =>
				return Claim::Hit(token.clone()),
			Some(Slot::Pending { fetch: weak, .. }) =>
				if let Some(shared) = weak.upgrade() {
					return Claim::Join(shared);
				},
			_ => {},
		}

		let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
		let shared = settle(Arc::clone(&self.inner), scope.clone(), generation, fetch())
			.boxed()
			.shared();

		match shared.downgrade() {
			Some(weak) => {
				entries.insert(scope.clone(), Slot::Pending { generation, fetch: weak });
			},
			None => {
				entries.remove(scope);
			},
		}

		Claim::Owner(shared)
	}
}
impl Default for TokenCache {
	fn default() -> Self {
		Self::new(DEFAULT_EXPIRY_MARGIN)
	}
}
impl Debug for TokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCache")
			.field("margin", &self.inner.margin)
			.field("entries", &self.len())
			.field("stats", &self.inner.stats)
			.finish()
	}
}

/// Runs one fetch and publishes its outcome to the map if the slot still belongs to it.
async fn settle<Fut>(
	inner: Arc<Inner>,
	scope: ScopeSet,
	generation: u64,
	fetch: Fut,
) -> Result<AccessToken>
where
	Fut: Future<Output = Result<AccessToken>>,
{
	let outcome = match fetch.await {
		Ok(token) if token.is_expired(inner.margin) => Err(AuthenticationError::ExpiredOnArrival {
			expires_in: token.expires_in,
			margin_secs: inner.margin.whole_seconds(),
		}
		.into()),
		other => other,
	};

	{
		let mut entries = inner.entries.lock();
		let owned = matches!(
			entries.get(&scope),
			Some(Slot::Pending { generation: current, .. }) if *current == generation
		);

		if owned {
			match &outcome {
				Ok(token) => {
					entries.insert(scope.clone(), Slot::Ready(token.clone()));
				},
				Err(_) => {
					entries.remove(&scope);
				},
			}
		}

		prune(&mut entries, OffsetDateTime::now_utc(), inner.margin);
	}

	match &outcome {
		Ok(_) => {
			#[cfg(feature = "tracing")]
			tracing::debug!(scope = scope.as_str(), "Token fetch succeeded.");

			obs::record_authorize_outcome(AuthorizeOutcome::Fetched);
		},
		Err(_e) => {
			#[cfg(feature = "tracing")]
			tracing::warn!(scope = scope.as_str(), error = %_e, "Token fetch failed.");

			inner.stats.record_failure();
		},
	}

	outcome
}

fn prune(entries: &mut HashMap<ScopeSet, Slot>, now: OffsetDateTime, margin: Duration) -> usize {
	let before = entries.len();

	entries.retain(|_, slot| match slot {
		Slot::Ready(token) => !token.is_expired_at(now, margin),
		Slot::Pending { fetch, .. } => fetch.upgrade().is_some(),
	});

	before - entries.len()
}
