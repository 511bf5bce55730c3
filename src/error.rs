//! Broker-level error taxonomy shared by the assertion builder, token exchange, and cache.
//!
//! Every failure surfaces as one of three kinds: [`ConfigError`] (bad or missing settings,
//! keys, or scopes), [`AuthenticationError`] (the token endpoint rejected the grant or
//! answered with something unusable), and [`TransportError`] (the HTTP call itself failed).
//! All variants are `Clone` so one in-flight outcome can be handed to every waiter.

// std
use std::path::PathBuf;
// self
use crate::{_prelude::*, auth::ScopeValidationError};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn std::error::Error + Send + Sync>;
type JsonPathError = serde_path_to_error::Error<serde_json::Error>;

/// Canonical broker error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Local configuration problem; retrying without changing settings will not help.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Token endpoint rejected the grant or returned an unusable success body.
	#[error(transparent)]
	Authentication(#[from] AuthenticationError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl Error {
	/// Returns the HTTP status code attached to the failure, when one was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Authentication(AuthenticationError::Rejected { status, .. })
			| Self::Authentication(AuthenticationError::InvalidResponse { status, .. })
			| Self::Authentication(AuthenticationError::UnusableAccessToken { status }) =>
				Some(*status),
			Self::Transport(TransportError::Network { status, .. }) => *status,
			_ => None,
		}
	}

	/// Returns `true` for configuration failures.
	pub fn is_config(&self) -> bool {
		matches!(self, Self::Config(_))
	}

	/// Returns `true` for authentication failures.
	pub fn is_authentication(&self) -> bool {
		matches!(self, Self::Authentication(_))
	}

	/// Returns `true` for transport failures.
	pub fn is_transport(&self) -> bool {
		matches!(self, Self::Transport(_))
	}
}

/// Configuration and validation failures raised before any network traffic.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// No settings snapshot has been supplied yet.
	#[error("Broker settings have not been configured.")]
	MissingSettings,
	/// Authority could not be parsed as a URL.
	#[error("Authority URL is invalid.")]
	InvalidAuthority {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Authority parsed but cannot host a token endpoint.
	#[error("Authority `{authority}` must be an absolute http(s) URL.")]
	UnsupportedAuthority {
		/// Offending authority string.
		authority: String,
	},
	/// Client identifier is empty or whitespace.
	#[error("Client identifier cannot be empty.")]
	EmptyClientId,
	/// Signing key material could not be loaded.
	#[error("Signing key is invalid: {reason}.")]
	InvalidKey {
		/// Human-readable reason.
		reason: String,
	},
	/// JWK declares a key type other than RSA.
	#[error("Signing key type `{kty}` is not supported; expected RSA.")]
	UnsupportedKeyType {
		/// Declared `kty` value.
		kty: String,
	},
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] ScopeValidationError),
	/// Settings file could not be read.
	#[error("Settings file {} could not be read.", .path.display())]
	SettingsFile {
		/// Path that was read.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: Arc<std::io::Error>,
	},
	/// Settings document is not valid JSON or misses required fields.
	#[error("Settings from {origin} are malformed.")]
	SettingsParse {
		/// File path or `<inline>` for in-memory documents.
		origin: String,
		/// Structured parsing failure including the offending JSON path.
		#[source]
		source: Arc<JsonPathError>,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest {
		/// Underlying `http` crate failure.
		#[source]
		source: Arc<oauth2::http::Error>,
	},
	/// The assertion could not be signed with the configured key.
	#[error("Grant assertion could not be signed.")]
	Signing {
		/// Underlying JWT encoding failure.
		#[source]
		source: Arc<jsonwebtoken::errors::Error>,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}

	/// Builds an [`ConfigError::InvalidKey`] from any displayable reason.
	pub fn invalid_key(reason: impl Display) -> Self {
		Self::InvalidKey { reason: reason.to_string() }
	}
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest { source: Arc::new(e) }
	}
}
impl From<jsonwebtoken::errors::Error> for ConfigError {
	fn from(e: jsonwebtoken::errors::Error) -> Self {
		Self::Signing { source: Arc::new(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures reported by (or parsed from) the token endpoint.
#[derive(Clone, Debug, ThisError)]
pub enum AuthenticationError {
	/// Token endpoint answered with a non-2xx status.
	///
	/// `body` holds the raw response text. When it is a standard OAuth error object the
	/// `error`, `error_description`, and `error_uri` fields are populated as well.
	#[error("Token endpoint rejected the grant with status {status}: {body}")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Raw response body.
		body: String,
		/// OAuth `error` code, if the body was a standard error object.
		error: Option<String>,
		/// OAuth `error_description`, if present.
		error_description: Option<String>,
		/// OAuth `error_uri`, if present.
		error_uri: Option<String>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint answered 2xx with a body that is not a token response.
	#[error("Token endpoint returned an invalid token response (status {status}): {body}")]
	InvalidResponse {
		/// HTTP status code.
		status: u16,
		/// Raw response body.
		body: String,
		/// Structured parsing failure including the offending JSON path.
		#[source]
		source: Arc<JsonPathError>,
	},
	/// Token endpoint returned a zero or negative `expires_in`.
	#[error("Token endpoint returned a non-positive expires_in ({expires_in}).")]
	NonPositiveExpiresIn {
		/// Reported lifetime in seconds.
		expires_in: i64,
	},
	/// Token endpoint returned an `expires_in` too large to compute an expiry instant.
	#[error("Token endpoint returned an out-of-range expires_in ({expires_in}).")]
	ExpiresInOutOfRange {
		/// Reported lifetime in seconds.
		expires_in: i64,
	},
	/// Token endpoint returned an access token that cannot be sent in an `Authorization` header.
	#[error(
		"Token endpoint returned an access token that is not a valid header value (status {status})."
	)]
	UnusableAccessToken {
		/// HTTP status code.
		status: u16,
	},
	/// Freshly issued token is already inside the expiry safety margin.
	#[error(
		"Access token lifetime of {expires_in}s does not exceed the {margin_secs}s expiry safety margin."
	)]
	ExpiredOnArrival {
		/// Reported lifetime in seconds.
		expires_in: i64,
		/// Configured safety margin in seconds.
		margin_secs: i64,
	},
}
impl AuthenticationError {
	/// Returns the OAuth `error` code for rejected grants.
	pub fn oauth_error(&self) -> Option<&str> {
		match self {
			Self::Rejected { error, .. } => error.as_deref(),
			_ => None,
		}
	}
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// HTTP status code, when a response head had already arrived.
		status: Option<u16>,
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// The request did not complete in time.
	#[error("Request timed out while calling the token endpoint.")]
	Timeout,
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[source] Arc<std::io::Error>),
	/// Transport failed in a way it could only describe as text.
	#[error("HTTP client error occurred while calling the token endpoint: {message}.")]
	Other {
		/// Transport-supplied description.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(status: Option<u16>, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { status, source: Arc::new(src) }
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::Io(Arc::new(e))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn rejected_grant_message_carries_status_and_body() {
		let err: Error = AuthenticationError::Rejected {
			status: 401,
			body: "{\"error\":\"invalid_client\"}".into(),
			error: Some("invalid_client".into()),
			error_description: None,
			error_uri: None,
			retry_after: None,
		}
		.into();
		let message = err.to_string();

		assert!(err.is_authentication());
		assert_eq!(err.status(), Some(401));
		assert!(message.contains("401"));
		assert!(message.contains("invalid_client"));
	}

	#[test]
	fn errors_clone_with_shared_sources() {
		let io = std::io::Error::other("socket closed");
		let err: Error = TransportError::from(io).into();
		let cloned = err.clone();

		assert!(cloned.is_transport());
		assert_eq!(err.to_string(), cloned.to_string());
		assert!(std::error::Error::source(&cloned).is_some());
	}

	#[test]
	fn config_kind_is_reported() {
		let err: Error = ConfigError::MissingSettings.into();

		assert!(err.is_config());
		assert_eq!(err.status(), None);
	}
}
