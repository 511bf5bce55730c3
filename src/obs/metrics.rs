// self
use crate::obs::AuthorizeOutcome;

/// Records an authorization outcome via the global metrics recorder (when enabled).
pub fn record_authorize_outcome(outcome: AuthorizeOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("jwt_bearer_broker_authorize_total", "outcome" => outcome.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}
