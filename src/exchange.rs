//! Token-endpoint exchange for the JWT-bearer grant.
//!
//! [`TokenExchange`] POSTs a signed assertion to `{authority}/token` and classifies the outcome:
//! 2xx bodies become [`AccessToken`]s, non-2xx answers become
//! [`AuthenticationError::Rejected`], and anything the transport reports goes through a
//! [`TransportErrorMapper`].

// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest,
	basic::BasicErrorResponse,
	http::{
		Method,
		header::{ACCEPT, CONTENT_TYPE, HeaderValue},
	},
};
use url::form_urlencoded::Serializer as FormSerializer;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeSet, TokenResponse},
	error::{AuthenticationError, ConfigError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

/// `grant_type` value registered by RFC 7523.
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	///
	/// `metadata` holds whatever the transport captured before failing, if anything.
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Mapper for any transport; every transport-specific failure becomes
/// [`TransportError::Network`].
#[derive(Clone, Debug, Default)]
pub struct GenericTransportErrorMapper;
impl<E> TransportErrorMapper<E> for GenericTransportErrorMapper
where
	E: 'static + Send + Sync + StdError,
{
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<E>,
	) -> Error {
		map_common_error(meta, err)
	}
}

/// Mapper for reqwest-backed transports; recognizes timeouts and request-builder failures.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(meta, *inner),
			other => map_common_error(meta, other),
		}
	}
}

/// Performs token-endpoint exchanges over a shared transport.
pub struct TokenExchange<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> TokenExchange<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Binds a transport and its error mapper.
	pub fn new(http_client: impl Into<Arc<C>>, error_mapper: impl Into<Arc<M>>) -> Self {
		Self { http_client: http_client.into(), error_mapper: error_mapper.into() }
	}

	/// Exchanges `assertion` for an access token at `token_endpoint`.
	///
	/// `requested_scope` stands in for the granted scope when the server omits it. The token
	/// is stamped with the local clock as soon as the response arrives.
	pub async fn exchange(
		&self,
		token_endpoint: &Url,
		assertion: &str,
		requested_scope: &ScopeSet,
	) -> Result<AccessToken> {
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let request = token_request(token_endpoint, assertion)?;
		let response = handle
			.call(request)
			.await
			.map_err(|err| self.error_mapper.map_transport_error(meta.take().as_ref(), err))?;
		let issued_at = OffsetDateTime::now_utc();
		let retry_after = meta.take().and_then(|value| value.retry_after);

		Ok(parse_token_response(
			response.status().as_u16(),
			response.body(),
			retry_after,
			requested_scope,
			issued_at,
		)?)
	}
}
impl<C, M> Clone for TokenExchange<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self { http_client: Arc::clone(&self.http_client), error_mapper: Arc::clone(&self.error_mapper) }
	}
}
impl<C, M> Debug for TokenExchange<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenExchange").finish_non_exhaustive()
	}
}

/// Builds the form-encoded grant request for `token_endpoint`.
pub fn token_request(token_endpoint: &Url, assertion: &str) -> Result<HttpRequest, ConfigError> {
	let body = FormSerializer::new(String::new())
		.append_pair("grant_type", JWT_BEARER_GRANT_TYPE)
		.append_pair("assertion", assertion)
		.finish();
	let request = oauth2::http::Request::builder()
		.method(Method::POST)
		.uri(token_endpoint.as_str())
		.header(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE))
		.header(ACCEPT, HeaderValue::from_static("application/json"))
		.body(body.into_bytes())?;

	Ok(request)
}

/// Classifies a raw token-endpoint response.
///
/// Non-2xx statuses become [`AuthenticationError::Rejected`] carrying the raw body; when that
/// body is a standard OAuth error object its fields are lifted out as well. A 2xx body that is
/// not a token response becomes [`AuthenticationError::InvalidResponse`], and one whose token
/// cannot travel in an `Authorization` header becomes
/// [`AuthenticationError::UnusableAccessToken`].
pub fn parse_token_response(
	status: u16,
	body: &[u8],
	retry_after: Option<Duration>,
	requested_scope: &ScopeSet,
	issued_at: OffsetDateTime,
) -> Result<AccessToken, AuthenticationError> {
	if !(200..300).contains(&status) {
		let parsed = serde_json::from_slice::<BasicErrorResponse>(body).ok();

		return Err(AuthenticationError::Rejected {
			status,
			body: String::from_utf8_lossy(body).into_owned(),
			error: parsed.as_ref().map(|value| value.error().as_ref().to_owned()),
			error_description: parsed.as_ref().and_then(|value| value.error_description().cloned()),
			error_uri: parsed.as_ref().and_then(|value| value.error_uri().cloned()),
			retry_after,
		});
	}

	let deserializer = &mut serde_json::Deserializer::from_slice(body);
	let response: TokenResponse =
		serde_path_to_error::deserialize(deserializer).map_err(|e| {
			AuthenticationError::InvalidResponse {
				status,
				body: String::from_utf8_lossy(body).into_owned(),
				source: Arc::new(e),
			}
		})?;

	if HeaderValue::from_str(&format!("Bearer {}", response.access_token.expose())).is_err() {
		return Err(AuthenticationError::UnusableAccessToken { status });
	}

	AccessToken::from_response(response, requested_scope.as_str(), issued_at)
}

fn map_common_error<E>(meta: Option<&ResponseMetadata>, err: HttpClientError<E>) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	match err {
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::from(inner).into(),
		HttpClientError::Other(message) => TransportError::Other { message }.into(),
		HttpClientError::Reqwest(inner) => TransportError::network(meta_status(meta), *inner).into(),
		_ => TransportError::Other { message: "unrecognized transport failure".into() }.into(),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransportError::Timeout.into();
	}

	let status = meta_status(meta).or_else(|| err.status().map(|code| code.as_u16()));

	TransportError::network(status, err).into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

#[cfg(test)]
mod tests {
	// std
	use std::io::{Error as IoError, ErrorKind};
	// crates.io
	use oauth2::{HttpResponse, http::StatusCode};
	use time::macros;
	// self
	use super::*;

	type Scripted = Result<(u16, &'static str), ErrorKind>;

	/// In-memory transport returning one scripted outcome and recording requests.
	struct ScriptedHttpClient {
		outcome: Scripted,
		seen: Arc<Mutex<Vec<HttpRequest>>>,
	}
	impl ScriptedHttpClient {
		fn new(outcome: Scripted) -> Self {
			Self { outcome, seen: Default::default() }
		}
	}
	impl TokenHttpClient for ScriptedHttpClient {
		type Handle = ScriptedHandle;
		type TransportError = IoError;

		fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
			ScriptedHandle { outcome: self.outcome, seen: Arc::clone(&self.seen), slot }
		}
	}

	struct ScriptedHandle {
		outcome: Scripted,
		seen: Arc<Mutex<Vec<HttpRequest>>>,
		slot: ResponseMetadataSlot,
	}
	impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
		type Error = HttpClientError<IoError>;
		type Future =
			Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

		fn call(&'c self, request: HttpRequest) -> Self::Future {
			Box::pin(async move {
				self.slot.take();
				self.seen.lock().push(request);

				let (status, body) = match self.outcome {
					Ok(scripted) => scripted,
					Err(kind) => return Err(HttpClientError::Reqwest(Box::new(IoError::from(kind)))),
				};

				self.slot.store(ResponseMetadata { status: Some(status), retry_after: None });

				let mut response = HttpResponse::new(body.as_bytes().to_vec());

				*response.status_mut() =
					StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

				Ok(response)
			})
		}
	}

	fn scope() -> ScopeSet {
		ScopeSet::new(["a", "b"]).expect("Scopes should be valid.")
	}

	fn endpoint() -> Url {
		Url::parse("https://mp.example/token").expect("Endpoint should parse.")
	}

	fn block_on<F: Future>(future: F) -> F::Output {
		futures::executor::block_on(future)
	}

	#[test]
	fn request_is_a_two_field_form_post() {
		let request = token_request(&endpoint(), "h.p.s").expect("Request should build.");
		let body = String::from_utf8(request.body().clone()).expect("Body should be UTF-8.");

		assert_eq!(request.method(), Method::POST);
		assert_eq!(request.uri(), "https://mp.example/token");
		assert_eq!(
			request.headers().get(CONTENT_TYPE).and_then(|value| value.to_str().ok()),
			Some(FORM_CONTENT_TYPE)
		);
		assert_eq!(
			body,
			"grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer&assertion=h.p.s"
		);
	}

	#[test]
	fn success_body_becomes_access_token() {
		let issued_at = macros::datetime!(2025-01-01 00:00 UTC);
		let token = parse_token_response(
			200,
			br#"{"access_token":"tok1","token_type":"Bearer","expires_in":120,"scope":"a b"}"#,
			None,
			&scope(),
			issued_at,
		)
		.expect("Token response should parse.");

		assert_eq!(token.access_token.expose(), "tok1");
		assert_eq!(token.expires_at(), macros::datetime!(2025-01-01 00:02 UTC));
	}

	#[test]
	fn rejected_grant_keeps_status_body_and_oauth_fields() {
		let body = r#"{"error":"invalid_client","error_description":"unknown kid"}"#;
		let err = parse_token_response(
			400,
			body.as_bytes(),
			Some(Duration::seconds(5)),
			&scope(),
			OffsetDateTime::now_utc(),
		)
		.expect_err("Non-2xx must be rejected.");

		match err {
			AuthenticationError::Rejected {
				status, body: raw, error, error_description, retry_after, ..
			} => {
				assert_eq!(status, 400);
				assert_eq!(raw, body);
				assert_eq!(error.as_deref(), Some("invalid_client"));
				assert_eq!(error_description.as_deref(), Some("unknown kid"));
				assert_eq!(retry_after, Some(Duration::seconds(5)));
			},
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	#[test]
	fn opaque_error_bodies_are_kept_verbatim() {
		let err = parse_token_response(
			502,
			b"<html>bad gateway</html>",
			None,
			&scope(),
			OffsetDateTime::now_utc(),
		)
		.expect_err("Non-2xx must be rejected.");

		assert_eq!(err.oauth_error(), None);
		assert!(err.to_string().contains("<html>bad gateway</html>"));
	}

	#[test]
	fn malformed_success_bodies_are_authentication_errors() {
		let not_json =
			parse_token_response(200, b"not-json", None, &scope(), OffsetDateTime::now_utc());
		let missing_field = parse_token_response(
			200,
			br#"{"access_token":"tok","token_type":"Bearer"}"#,
			None,
			&scope(),
			OffsetDateTime::now_utc(),
		);

		assert!(matches!(not_json, Err(AuthenticationError::InvalidResponse { status: 200, .. })));
		match missing_field {
			Err(AuthenticationError::InvalidResponse { source, .. }) =>
				assert!(source.to_string().contains("expires_in")),
			other => panic!("Unexpected outcome: {other:?}."),
		}
	}

	#[test]
	fn tokens_unfit_for_a_header_are_rejected() {
		let err = parse_token_response(
			200,
			br#"{"access_token":"tok\n1","token_type":"Bearer","expires_in":120}"#,
			None,
			&scope(),
			OffsetDateTime::now_utc(),
		)
		.expect_err("Control characters must be rejected.");

		assert!(matches!(err, AuthenticationError::UnusableAccessToken { status: 200 }));
		assert!(!err.to_string().contains("tok\n1"));
	}

	#[test]
	fn overflowing_lifetimes_are_rejected() {
		let err = parse_token_response(
			200,
			br#"{"access_token":"t","token_type":"Bearer","expires_in":9223372036854775807}"#,
			None,
			&scope(),
			OffsetDateTime::now_utc(),
		)
		.expect_err("Overflowing expires_in must be rejected.");

		assert!(matches!(err, AuthenticationError::ExpiresInOutOfRange { expires_in: i64::MAX }));
	}

	#[test]
	fn exchange_runs_over_any_transport() {
		let client = Arc::new(ScriptedHttpClient::new(Ok((
			200,
			r#"{"access_token":"tok1","token_type":"Bearer","expires_in":120}"#,
		))));
		let exchange: TokenExchange<ScriptedHttpClient, GenericTransportErrorMapper> =
			TokenExchange::new(Arc::clone(&client), GenericTransportErrorMapper);
		let token = block_on(exchange.exchange(&endpoint(), "h.p.s", &scope()))
			.expect("Exchange should succeed.");
		let seen = client.seen.lock();

		assert_eq!(token.scope, "a b");
		assert_eq!(seen.len(), 1);
		assert_eq!(seen[0].uri(), "https://mp.example/token");
	}

	#[test]
	fn transport_failures_are_transport_errors() {
		let client = ScriptedHttpClient::new(Err(ErrorKind::ConnectionRefused));
		let exchange: TokenExchange<ScriptedHttpClient, GenericTransportErrorMapper> =
			TokenExchange::new(client, GenericTransportErrorMapper);
		let err = block_on(exchange.exchange(&endpoint(), "h.p.s", &scope()))
			.expect_err("Refused connection must fail.");

		assert!(err.is_transport());
		assert_eq!(err.status(), None);
	}
}
