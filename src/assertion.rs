//! JWT-bearer grant assertions (RFC 7523) signed with the client's RSA key.

// crates.io
use jsonwebtoken::{Algorithm, Header};
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{_prelude::*, auth::ScopeSet, error::ConfigError, settings::Settings};

/// Fixed lifetime of every assertion, independent of the access token it buys.
pub const ASSERTION_LIFETIME: Duration = Duration::seconds(120);

const JTI_LEN: usize = 32;

/// Claims carried by a grant assertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
	/// Issuer; the client identifier.
	pub iss: String,
	/// Audience; the authority exactly as configured.
	pub aud: String,
	/// Issued-at, seconds since the Unix epoch.
	pub iat: i64,
	/// Expiry, always `iat + 120`.
	pub exp: i64,
	/// Space-delimited normalized scopes.
	pub scope: String,
	/// Unique assertion identifier.
	pub jti: String,
}

/// Builds and signs one assertion for a settings snapshot and scope set.
///
/// `iat` defaults to the current UTC time and `jti` to a fresh random identifier; both can be
/// pinned for tests.
#[derive(Debug)]
pub struct AssertionBuilder<'a> {
	settings: &'a Settings,
	scope: &'a ScopeSet,
	issued_at: Option<OffsetDateTime>,
	jti: Option<String>,
}
impl<'a> AssertionBuilder<'a> {
	/// Starts an assertion for `scope` under `settings`.
	pub fn new(settings: &'a Settings, scope: &'a ScopeSet) -> Self {
		Self { settings, scope, issued_at: None, jti: None }
	}

	/// Pins the issued-at instant.
	pub fn issued_at(mut self, issued_at: OffsetDateTime) -> Self {
		self.issued_at = Some(issued_at);

		self
	}

	/// Pins the assertion identifier.
	pub fn jti(mut self, jti: impl Into<String>) -> Self {
		self.jti = Some(jti.into());

		self
	}

	/// Resolves the claim set without signing.
	pub fn claims(&self) -> Result<AssertionClaims, ConfigError> {
		self.scope.ensure_not_empty()?;

		let iat = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc).unix_timestamp();

		Ok(AssertionClaims {
			iss: self.settings.client_id.clone(),
			aud: self.settings.audience().to_owned(),
			iat,
			exp: iat + ASSERTION_LIFETIME.whole_seconds(),
			scope: self.scope.as_str().to_owned(),
			jti: self.jti.clone().unwrap_or_else(|| random_jti(JTI_LEN)),
		})
	}

	/// Signs the assertion with RS256, returning the compact JWT.
	pub fn sign(&self) -> Result<String, ConfigError> {
		let claims = self.claims()?;
		let mut header = Header::new(Algorithm::RS256);

		header.kid = self.settings.key.key_id().map(str::to_owned);

		Ok(jsonwebtoken::encode(&header, &claims, self.settings.key.encoding_key())?)
	}
}

fn random_jti(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

#[cfg(test)]
mod tests {
	// crates.io
	use jsonwebtoken::{DecodingKey, Validation};
	use time::macros;
	// self
	use super::*;
	use crate::settings::SigningKey;

	const PRIVATE_PEM: &str = include_str!("../tests/fixtures/signing-key.pem");
	const PUBLIC_PEM: &str = include_str!("../tests/fixtures/signing-key.pub.pem");

	fn settings(key: SigningKey) -> Settings {
		Settings::new("https://mp.example/", "c1", key).expect("Settings should be valid.")
	}

	fn decode(jwt: &str) -> jsonwebtoken::TokenData<AssertionClaims> {
		let key = DecodingKey::from_rsa_pem(PUBLIC_PEM.as_bytes())
			.expect("Public key fixture should load.");
		let mut validation = Validation::new(Algorithm::RS256);

		validation.set_audience(&["https://mp.example/"]);
		validation.validate_exp = false;

		jsonwebtoken::decode(jwt, &key, &validation).expect("Assertion should verify.")
	}

	#[test]
	fn signed_assertion_carries_grant_claims() {
		let settings = settings(SigningKey::from_pem(PRIVATE_PEM).expect("PEM should load."));
		let scope = ScopeSet::new(["s2", "s1"]).expect("Scopes should be valid.");
		let jwt = AssertionBuilder::new(&settings, &scope)
			.issued_at(macros::datetime!(2025-03-01 12:00 UTC))
			.sign()
			.expect("Assertion should sign.");
		let data = decode(&jwt);

		assert_eq!(data.header.alg, Algorithm::RS256);
		assert_eq!(data.header.kid, None);
		assert_eq!(data.claims.iss, "c1");
		assert_eq!(data.claims.aud, "https://mp.example/");
		assert_eq!(data.claims.scope, "s1 s2");
		assert_eq!(data.claims.iat, macros::datetime!(2025-03-01 12:00 UTC).unix_timestamp());
		assert_eq!(data.claims.exp - data.claims.iat, 120);
		assert_eq!(data.claims.jti.len(), JTI_LEN);
	}

	#[test]
	fn audience_is_the_authority_as_configured() {
		let key = SigningKey::from_pem(PRIVATE_PEM).expect("PEM should load.");
		let settings =
			Settings::new("https://MP.example", "c1", key).expect("Settings should be valid.");
		let scope = ScopeSet::new(["s1"]).expect("Scopes should be valid.");
		let claims = AssertionBuilder::new(&settings, &scope).claims().expect("Claims should resolve.");

		assert_eq!(claims.aud, "https://MP.example");
	}

	#[test]
	fn key_id_lands_in_the_header() {
		let key = SigningKey::from_pem(PRIVATE_PEM).expect("PEM should load.").with_key_id("kid-7");
		let settings = settings(key);
		let scope = ScopeSet::new(["s1"]).expect("Scopes should be valid.");
		let jwt = AssertionBuilder::new(&settings, &scope).sign().expect("Assertion should sign.");

		assert_eq!(decode(&jwt).header.kid.as_deref(), Some("kid-7"));
	}

	#[test]
	fn every_assertion_gets_a_fresh_jti() {
		let settings = settings(SigningKey::from_pem(PRIVATE_PEM).expect("PEM should load."));
		let scope = ScopeSet::new(["s1"]).expect("Scopes should be valid.");
		let builder = AssertionBuilder::new(&settings, &scope);
		let a = builder.claims().expect("Claims should resolve.");
		let b = builder.claims().expect("Claims should resolve.");

		assert_ne!(a.jti, b.jti);
		assert_eq!(builder.jti("fixed").claims().expect("Claims should resolve.").jti, "fixed");
	}

	#[test]
	fn empty_scope_sets_cannot_be_asserted() {
		let settings = settings(SigningKey::from_pem(PRIVATE_PEM).expect("PEM should load."));
		let scope = ScopeSet::default();

		assert!(matches!(
			AssertionBuilder::new(&settings, &scope).sign(),
			Err(ConfigError::InvalidScope(_))
		));
	}
}
