//! Attaching `Authorization: Bearer` headers to outbound requests.

// crates.io
use oauth2::http::{
	Request as HttpRequest,
	header::{AUTHORIZATION, HeaderValue},
};
// self
use crate::{_prelude::*, auth::AccessToken, error::ConfigError};

/// Request types that can carry a bearer token.
///
/// Implemented for [`http::Request`](oauth2::http::Request) and, with the `reqwest` feature,
/// for `reqwest::Request` and `reqwest::RequestBuilder`. Any existing `Authorization` header
/// is replaced.
pub trait BearerAuth
where
	Self: Sized,
{
	/// Returns the request with `token` attached.
	fn with_bearer(self, token: &AccessToken) -> Result<Self>;
}
impl<B> BearerAuth for HttpRequest<B> {
	fn with_bearer(mut self, token: &AccessToken) -> Result<Self> {
		self.headers_mut().insert(AUTHORIZATION, header_value(token)?);

		Ok(self)
	}
}
#[cfg(feature = "reqwest")]
impl BearerAuth for reqwest::Request {
	fn with_bearer(mut self, token: &AccessToken) -> Result<Self> {
		self.headers_mut().insert(AUTHORIZATION, header_value(token)?);

		Ok(self)
	}
}
#[cfg(feature = "reqwest")]
impl BearerAuth for reqwest::RequestBuilder {
	fn with_bearer(self, token: &AccessToken) -> Result<Self> {
		Ok(reqwest::RequestBuilder::bearer_auth(self, token.access_token.expose()))
	}
}

fn header_value(token: &AccessToken) -> Result<HeaderValue, ConfigError> {
	let mut value = HeaderValue::from_str(&token.authorization_value())
		.map_err(oauth2::http::Error::from)?;

	value.set_sensitive(true);

	Ok(value)
}
