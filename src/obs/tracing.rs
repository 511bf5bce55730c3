// self
use crate::_prelude::*;

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedAuthorize<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedAuthorize<F> = F;

/// Span wrapping one authorization call.
#[derive(Clone, Debug)]
pub struct AuthorizeSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl AuthorizeSpan {
	/// Creates a span tagged with the normalized scope key and call-site stage.
	pub fn new(scope: &str, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("jwt_bearer_broker.authorize", scope, stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (scope, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedAuthorize<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}
