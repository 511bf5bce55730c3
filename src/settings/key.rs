//! RSA signing keys loaded from PEM or private JWK material.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::EncodingKey;
use rsa::{BigUint, RsaPrivateKey, pkcs1::EncodeRsaPrivateKey};
// self
use crate::{_prelude::*, error::ConfigError};

/// Private RSA key in JSON Web Key form.
///
/// Only the members needed to rebuild the key are read; CRT parameters (`dp`, `dq`, `qi`) are
/// recomputed from the primes.
#[derive(Clone, Deserialize)]
pub struct RsaPrivateJwk {
	/// Key type; must be `RSA`.
	pub kty: String,
	/// Optional key identifier, echoed as the JWT `kid` header.
	#[serde(default)]
	pub kid: Option<String>,
	/// Optional algorithm hint; must be `RS256` when present.
	#[serde(default)]
	pub alg: Option<String>,
	/// Modulus.
	pub n: String,
	/// Public exponent.
	pub e: String,
	/// Private exponent.
	#[serde(default)]
	pub d: Option<String>,
	/// First prime factor.
	#[serde(default)]
	pub p: Option<String>,
	/// Second prime factor.
	#[serde(default)]
	pub q: Option<String>,
}
impl Debug for RsaPrivateJwk {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RsaPrivateJwk")
			.field("kty", &self.kty)
			.field("kid", &self.kid)
			.field("alg", &self.alg)
			.finish_non_exhaustive()
	}
}

/// RS256 signing key for grant assertions.
#[derive(Clone)]
pub struct SigningKey {
	encoding: EncodingKey,
	key_id: Option<String>,
}
impl SigningKey {
	/// Loads a PKCS#1 (`BEGIN RSA PRIVATE KEY`) or PKCS#8 (`BEGIN PRIVATE KEY`) PEM document.
	pub fn from_pem(pem: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
		let encoding = EncodingKey::from_rsa_pem(pem.as_ref()).map_err(ConfigError::invalid_key)?;

		Ok(Self { encoding, key_id: None })
	}

	/// Rebuilds the key from a private JWK.
	pub fn from_jwk(jwk: &RsaPrivateJwk) -> Result<Self, ConfigError> {
		if jwk.kty != "RSA" {
			return Err(ConfigError::UnsupportedKeyType { kty: jwk.kty.clone() });
		}
		if let Some(alg) = jwk.alg.as_deref().filter(|alg| *alg != "RS256") {
			return Err(ConfigError::invalid_key(format_args!(
				"JWK algorithm `{alg}` is not RS256"
			)));
		}

		let n = decode_member("n", Some(&jwk.n))?;
		let e = decode_member("e", Some(&jwk.e))?;
		let d = decode_member("d", jwk.d.as_ref())?;
		let p = decode_member("p", jwk.p.as_ref())?;
		let q = decode_member("q", jwk.q.as_ref())?;
		let key =
			RsaPrivateKey::from_components(n, e, d, vec![p, q]).map_err(ConfigError::invalid_key)?;

		key.validate().map_err(ConfigError::invalid_key)?;

		let der = key.to_pkcs1_der().map_err(ConfigError::invalid_key)?;

		Ok(Self { encoding: EncodingKey::from_rsa_der(der.as_bytes()), key_id: jwk.kid.clone() })
	}

	/// Parses a JWK JSON document and rebuilds the key.
	pub fn from_jwk_json(raw: &str) -> Result<Self, ConfigError> {
		let jwk: RsaPrivateJwk = serde_json::from_str(raw).map_err(ConfigError::invalid_key)?;

		Self::from_jwk(&jwk)
	}

	/// Overrides the key identifier placed in the JWT header.
	pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
		self.key_id = Some(key_id.into());

		self
	}

	/// Key identifier placed in the JWT header, if any.
	pub fn key_id(&self) -> Option<&str> {
		self.key_id.as_deref()
	}

	pub(crate) fn encoding_key(&self) -> &EncodingKey {
		&self.encoding
	}
}
impl Debug for SigningKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SigningKey")
			.field("key_id", &self.key_id)
			.field("material", &"<redacted>")
			.finish()
	}
}
impl<'de> Deserialize<'de> for SigningKey {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		#[derive(Deserialize)]
		#[serde(untagged)]
		enum Raw {
			Jwk(RsaPrivateJwk),
			Pem(String),
		}

		let key = match Raw::deserialize(deserializer)? {
			Raw::Jwk(jwk) => Self::from_jwk(&jwk),
			Raw::Pem(pem) => Self::from_pem(pem),
		};

		key.map_err(serde::de::Error::custom)
	}
}

fn decode_member(name: &'static str, value: Option<&String>) -> Result<BigUint, ConfigError> {
	let value = value.ok_or_else(|| {
		ConfigError::invalid_key(format_args!("JWK is missing the `{name}` member"))
	})?;
	let bytes = URL_SAFE_NO_PAD
		.decode(value.trim_end_matches('='))
		.map_err(|e| ConfigError::invalid_key(format_args!("JWK member `{name}`: {e}")))?;

	Ok(BigUint::from_bytes_be(&bytes))
}
