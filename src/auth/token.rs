//! Access tokens issued by the token endpoint and their expiry accounting.

mod secret;

pub use secret::*;

// self
use crate::{_prelude::*, error::AuthenticationError};

/// Success body returned by the token endpoint.
///
/// `scope` is optional on the wire; when omitted the requested scope string is assumed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
	/// Bearer credential for downstream requests.
	pub access_token: TokenSecret,
	/// Token type, normally `Bearer`.
	pub token_type: String,
	/// Lifetime in seconds counted from issuance.
	pub expires_in: i64,
	/// Space-delimited scopes granted to the token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
}

/// Access token plus the local instant it was received.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
	/// Bearer credential; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Token type reported by the server.
	pub token_type: String,
	/// Lifetime in seconds reported by the server.
	pub expires_in: i64,
	/// Space-delimited scopes granted to the token.
	pub scope: String,
	/// Local receipt instant; expiry is measured from here.
	pub issued_at: OffsetDateTime,
}
impl AccessToken {
	/// Builds a token from a parsed response, stamping `issued_at`.
	///
	/// Fails when the server reports a non-positive lifetime or one whose expiry instant is
	/// not representable.
	pub fn from_response(
		response: TokenResponse,
		requested_scope: &str,
		issued_at: OffsetDateTime,
	) -> Result<Self, AuthenticationError> {
		if response.expires_in <= 0 {
			return Err(AuthenticationError::NonPositiveExpiresIn {
				expires_in: response.expires_in,
			});
		}
		if issued_at.checked_add(Duration::seconds(response.expires_in)).is_none() {
			return Err(AuthenticationError::ExpiresInOutOfRange {
				expires_in: response.expires_in,
			});
		}

		Ok(Self {
			access_token: response.access_token,
			token_type: response.token_type,
			expires_in: response.expires_in,
			scope: response.scope.unwrap_or_else(|| requested_scope.to_owned()),
			issued_at,
		})
	}

	/// Nominal expiry instant (`issued_at + expires_in`).
	///
	/// Falls back to `issued_at` when the sum is not representable, which only happens for
	/// tokens assembled by hand.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.checked_expires_at().unwrap_or(self.issued_at)
	}

	/// Returns `true` once `now >= expires_at - margin`.
	///
	/// A deadline that cannot be computed counts as expired.
	pub fn is_expired_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
		match self.checked_expires_at().and_then(|expires_at| expires_at.checked_sub(margin)) {
			Some(deadline) => now >= deadline,
			None => true,
		}
	}

	/// Checks [`is_expired_at`](Self::is_expired_at) against the current UTC clock.
	pub fn is_expired(&self, margin: Duration) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc(), margin)
	}

	/// Time left before the nominal expiry, clamped at zero.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Duration {
		let remaining = self.expires_at() - now;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}

	/// Value for an `Authorization` header, e.g. `Bearer eyJ...`.
	pub fn authorization_value(&self) -> String {
		format!("Bearer {}", self.access_token.expose())
	}

	fn checked_expires_at(&self) -> Option<OffsetDateTime> {
		self.issued_at.checked_add(Duration::seconds(self.expires_in))
	}

	/// Converts back to the wire representation.
	pub fn to_response(&self) -> TokenResponse {
		TokenResponse {
			access_token: self.access_token.clone(),
			token_type: self.token_type.clone(),
			expires_in: self.expires_in,
			scope: Some(self.scope.clone()),
		}
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("access_token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("expires_in", &self.expires_in)
			.field("scope", &self.scope)
			.field("issued_at", &self.issued_at)
			.finish()
	}
}
