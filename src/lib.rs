//! Single-flight OAuth 2.0 JWT-bearer (RFC 7523) token broker: signed grant assertions,
//! token-endpoint exchanges, and a shared per-scope access-token cache in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod assertion;
pub mod auth;
pub mod cache;
pub mod client;
pub mod error;
pub mod exchange;
pub mod http;
pub mod obs;
pub mod settings;
pub mod sign;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// crates.io
	use jsonwebtoken::{Algorithm, DecodingKey, Validation};
	// self
	use crate::{
		assertion::AssertionClaims,
		client::ReqwestTokenClient,
		http::ReqwestHttpClient,
		settings::{ReloadableSettings, Settings, SigningKey},
	};

	/// PKCS#1 private key matching [`TEST_PUBLIC_KEY_PEM`].
	pub const TEST_PRIVATE_KEY_PEM: &str = include_str!("../tests/fixtures/signing-key.pem");
	/// PKCS#1 public key used to verify test assertions.
	pub const TEST_PUBLIC_KEY_PEM: &str = include_str!("../tests/fixtures/signing-key.pub.pem");
	/// Client identifier used by [`test_settings`].
	pub const TEST_CLIENT_ID: &str = "c1";

	/// Builds settings for `authority` signed with the fixture key.
	pub fn test_settings(authority: &str) -> Settings {
		let key = SigningKey::from_pem(TEST_PRIVATE_KEY_PEM)
			.expect("Failed to load the fixture signing key.")
			.with_key_id("test-key-1");

		Settings::new(authority, TEST_CLIENT_ID, key).expect("Failed to build test settings.")
	}

	/// Builds a reqwest transport with the production defaults.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		ReqwestHttpClient::new().expect("Failed to build Reqwest client for tests.")
	}

	/// Constructs a [`ReqwestTokenClient`] pointed at `authority`, returning the reloadable
	/// settings handle alongside it.
	pub fn build_reqwest_test_client(authority: &str) -> (ReqwestTokenClient, ReloadableSettings) {
		let settings = ReloadableSettings::new(test_settings(authority));
		let client = ReqwestTokenClient::with_http_client(
			settings.clone(),
			test_reqwest_http_client(),
			crate::exchange::ReqwestTransportErrorMapper,
		);

		(client, settings)
	}

	/// Verifies `assertion` with the fixture public key and returns its claims.
	pub fn decode_assertion(assertion: &str, audience: &str) -> AssertionClaims {
		let key = DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY_PEM.as_bytes())
			.expect("Failed to load the fixture public key.");
		let mut validation = Validation::new(Algorithm::RS256);

		validation.set_audience(&[audience]);

		jsonwebtoken::decode(assertion, &key, &validation)
			.expect("Failed to verify the grant assertion.")
			.claims
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
