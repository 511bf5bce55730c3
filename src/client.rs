//! Public entry point: scope-keyed access tokens backed by the single-flight cache.
//!
//! [`TokenClient::authorize`] normalizes the requested scopes, consults the shared
//! [`TokenCache`], and on a miss reads one [`Settings`] snapshot, signs a grant assertion, and
//! exchanges it at `{authority}/token`. Clones share the transport, settings provider, and
//! cache, so one client can be handed to every task that needs tokens.

// crates.io
use oauth2::{HttpRequest, http::Method};
// self
use crate::{
	_prelude::*,
	assertion::AssertionBuilder,
	auth::{AccessToken, ScopeSet},
	cache::TokenCache,
	error::ConfigError,
	exchange::{TokenExchange, TransportErrorMapper},
	http::TokenHttpClient,
	obs::{self, AuthorizeOutcome, AuthorizeSpan},
	settings::{Settings, SettingsProvider},
	sign::BearerAuth,
};
#[cfg(feature = "reqwest")]
use crate::{exchange::ReqwestTransportErrorMapper, http::ReqwestHttpClient};

/// Token client specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestTokenClient = TokenClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Obtains JWT-bearer access tokens and caches them per scope set.
pub struct TokenClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	exchange: TokenExchange<C, M>,
	settings: Arc<dyn SettingsProvider>,
	cache: TokenCache,
}
#[cfg(feature = "reqwest")]
impl TokenClient<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a client on a fresh reqwest transport (redirects disabled, 30 s timeout).
	pub fn new(settings: impl 'static + SettingsProvider) -> Result<Self, ConfigError> {
		Ok(Self::with_http_client(settings, ReqwestHttpClient::new()?, ReqwestTransportErrorMapper))
	}
}
impl<C, M> TokenClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		settings: impl 'static + SettingsProvider,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			exchange: TokenExchange::new(http_client, mapper),
			settings: Arc::new(settings),
			cache: TokenCache::default(),
		}
	}

	/// Replaces the cache with an empty one applying `margin` to every expiry check.
	pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
		self.cache = TokenCache::new(margin);

		self
	}

	/// Shared token cache, for maintenance and statistics.
	pub fn cache(&self) -> &TokenCache {
		&self.cache
	}

	/// Current settings snapshot.
	pub fn settings(&self) -> Result<Arc<Settings>, ConfigError> {
		self.settings.current()
	}

	/// Returns a valid access token for `scopes`.
	///
	/// Scopes are deduplicated and sorted, so any ordering of the same set shares one cache
	/// entry. Concurrent calls for the same set share one exchange and its outcome.
	pub async fn authorize<I, S>(&self, scopes: I) -> Result<AccessToken>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let scope = ScopeSet::new(scopes).map_err(ConfigError::from)?;

		self.authorize_scope(&scope).await
	}

	/// Same as [`authorize`](Self::authorize) for an already normalized scope set.
	pub async fn authorize_scope(&self, scope: &ScopeSet) -> Result<AccessToken> {
		let span = AuthorizeSpan::new(scope.as_str(), "authorize");

		obs::record_authorize_outcome(AuthorizeOutcome::Attempt);

		let result = span
			.instrument(async move {
				scope.ensure_not_empty().map_err(ConfigError::from)?;

				let exchange = self.exchange.clone();
				let settings = Arc::clone(&self.settings);
				let requested = scope.clone();

				self.cache.get_or_fetch(scope, move || fetch_token(exchange, settings, requested)).await
			})
			.await;

		if result.is_err() {
			obs::record_authorize_outcome(AuthorizeOutcome::Failure);
		}

		result
	}

	/// Builds an empty-bodied request to `uri` carrying a bearer token for `scopes`.
	pub async fn authorized_request<I, S>(
		&self,
		scopes: I,
		method: Method,
		uri: &str,
	) -> Result<HttpRequest>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let token = self.authorize(scopes).await?;
		let request = oauth2::http::Request::builder()
			.method(method)
			.uri(uri)
			.body(Vec::new())
			.map_err(ConfigError::from)?;

		request.with_bearer(&token)
	}

	/// Attaches a bearer token for `scopes` to a caller-built request.
	pub async fn authorize_request<R, I, S>(&self, request: R, scopes: I) -> Result<R>
	where
		R: BearerAuth,
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let token = self.authorize(scopes).await?;

		request.with_bearer(&token)
	}

	/// Binds a fixed scope set to this client.
	pub fn scoped<I, S>(&self, scopes: I) -> Result<ScopedAuthorizer<C, M>, ConfigError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let scope = ScopeSet::new(scopes)?;

		scope.ensure_not_empty()?;

		Ok(ScopedAuthorizer { client: self.clone(), scope })
	}
}
impl<C, M> Clone for TokenClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			exchange: self.exchange.clone(),
			settings: Arc::clone(&self.settings),
			cache: self.cache.clone(),
		}
	}
}
impl<C, M> Debug for TokenClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenClient").field("cache", &self.cache).finish_non_exhaustive()
	}
}

/// A [`TokenClient`] bound to one scope set, for signing every request of a downstream API.
pub struct ScopedAuthorizer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	client: TokenClient<C, M>,
	scope: ScopeSet,
}
impl<C, M> ScopedAuthorizer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Scope set requested for every call.
	pub fn scope(&self) -> &ScopeSet {
		&self.scope
	}

	/// Returns a valid access token for the bound scopes.
	pub async fn token(&self) -> Result<AccessToken> {
		self.client.authorize_scope(&self.scope).await
	}

	/// Attaches a bearer token for the bound scopes to `request`.
	pub async fn sign<R>(&self, request: R) -> Result<R>
	where
		R: BearerAuth,
	{
		let token = self.token().await?;

		request.with_bearer(&token)
	}
}
impl<C, M> Clone for ScopedAuthorizer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self { client: self.client.clone(), scope: self.scope.clone() }
	}
}
impl<C, M> Debug for ScopedAuthorizer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ScopedAuthorizer").field("scope", &self.scope).finish_non_exhaustive()
	}
}

async fn fetch_token<C, M>(
	exchange: TokenExchange<C, M>,
	settings: Arc<dyn SettingsProvider>,
	scope: ScopeSet,
) -> Result<AccessToken>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let settings = settings.current()?;
	let endpoint = settings.token_endpoint()?;
	let assertion = AssertionBuilder::new(&settings, &scope).sign()?;

	#[cfg(feature = "tracing")]
	tracing::debug!(
		scope = scope.as_str(),
		client_id = settings.client_id.as_str(),
		endpoint = endpoint.as_str(),
		"Exchanging grant assertion."
	);

	exchange.exchange(&endpoint, &assertion, &scope).await
}
