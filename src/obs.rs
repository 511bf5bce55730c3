//! Optional observability helpers for token authorization.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `jwt_bearer_broker.authorize` with the
//!   `scope` (cache key) and `stage` (call site) fields, plus debug events for cache decisions.
//! - Enable `metrics` to increment the `jwt_bearer_broker_authorize_total` counter labeled by
//!   `outcome`.
//!
//! [`CacheStats`] counters are always available, independent of either feature.

mod metrics;
mod stats;
mod tracing;

pub use metrics::*;
pub use stats::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Outcome labels recorded for authorization calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthorizeOutcome {
	/// Entry to [`TokenClient::authorize`](crate::client::TokenClient::authorize).
	Attempt,
	/// Served from a valid cached token.
	CacheHit,
	/// Attached to a fetch another caller had already started.
	Joined,
	/// A token exchange completed and its token was cached.
	Fetched,
	/// Failure propagated back to a caller.
	Failure,
}
impl AuthorizeOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthorizeOutcome::Attempt => "attempt",
			AuthorizeOutcome::CacheHit => "cache_hit",
			AuthorizeOutcome::Joined => "joined",
			AuthorizeOutcome::Fetched => "fetched",
			AuthorizeOutcome::Failure => "failure",
		}
	}
}
impl Display for AuthorizeOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
