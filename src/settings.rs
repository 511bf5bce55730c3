//! Client settings (authority, client id, signing key) and snapshot providers.
//!
//! The broker never loads or watches configuration on its own. Callers hand it a
//! [`SettingsProvider`], and every token fetch reads exactly one [`Settings`] snapshot from it,
//! so a concurrent [`ReloadableSettings::replace`] is observed either completely or not at all.

pub mod key;
pub mod provider;

pub use key::*;
pub use provider::*;

// std
use std::{env, fs, path::Path};
// self
use crate::{_prelude::*, error::ConfigError};

/// Immutable settings snapshot consumed by the broker.
///
/// Deserializes from the settings document shape
/// `{"authority": "...", "clientId": "...", "key": <JWK object or PEM string>}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "SettingsDocument")]
pub struct Settings {
	/// Authorization server base URL, normalized by [`Url`]; the token endpoint derives from it.
	pub authority: Url,
	/// Client identifier registered with the authorization server; the `iss` claim.
	pub client_id: String,
	/// Private key used to sign grant assertions.
	pub key: SigningKey,
	audience: String,
}
impl Settings {
	/// Environment variable that overrides [`DEFAULT_FILEPATH`](Self::DEFAULT_FILEPATH).
	pub const FILEPATH_ENV: &'static str = "MASKINPORTEN_SETTINGS_FILEPATH";
	/// Conventional mount point for the settings document.
	pub const DEFAULT_FILEPATH: &'static str = "/mnt/app-secrets/maskinporten-settings.json";

	/// Builds and validates a settings snapshot.
	pub fn new(
		authority: impl AsRef<str>,
		client_id: impl Into<String>,
		key: SigningKey,
	) -> Result<Self, ConfigError> {
		let settings = Self::unvalidated(authority.as_ref(), client_id.into(), key)?;

		settings.validate()?;

		Ok(settings)
	}

	/// Authority exactly as configured; the `aud` claim of every assertion.
	pub fn audience(&self) -> &str {
		&self.audience
	}

	/// Checks invariants serde cannot express.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.client_id.trim().is_empty() {
			return Err(ConfigError::EmptyClientId);
		}
		if !matches!(self.authority.scheme(), "https" | "http")
			|| self.authority.cannot_be_a_base()
			|| self.authority.host_str().is_none()
		{
			return Err(ConfigError::UnsupportedAuthority {
				authority: self.authority.to_string(),
			});
		}

		Ok(())
	}

	/// Token endpoint derived from the authority: trailing slashes are stripped before
	/// appending `/token`.
	pub fn token_endpoint(&self) -> Result<Url, ConfigError> {
		let base = self.authority.as_str().trim_end_matches('/');

		Url::parse(&format!("{base}/token")).map_err(|source| ConfigError::InvalidAuthority { source })
	}

	/// Parses and validates an in-memory settings document.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		Self::parse(raw, "<inline>")
	}

	/// Reads, parses, and validates a settings document from disk.
	pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let raw = fs::read_to_string(path).map_err(|e| ConfigError::SettingsFile {
			path: path.to_path_buf(),
			source: Arc::new(e),
		})?;

		Self::parse(&raw, &path.display().to_string())
	}

	/// Loads from the path in [`FILEPATH_ENV`](Self::FILEPATH_ENV), falling back to
	/// [`DEFAULT_FILEPATH`](Self::DEFAULT_FILEPATH).
	pub fn from_env_or_default() -> Result<Self, ConfigError> {
		let path = env::var(Self::FILEPATH_ENV).unwrap_or_else(|_| {
			#[cfg(feature = "tracing")]
			tracing::warn!(
				default = Self::DEFAULT_FILEPATH,
				"No settings path provided; assuming the default location."
			);

			Self::DEFAULT_FILEPATH.to_owned()
		});

		Self::from_json_file(path)
	}

	fn unvalidated(
		authority: &str,
		client_id: String,
		key: SigningKey,
	) -> Result<Self, ConfigError> {
		let url =
			Url::parse(authority).map_err(|source| ConfigError::InvalidAuthority { source })?;

		Ok(Self { authority: url, client_id, key, audience: authority.to_owned() })
	}

	fn parse(raw: &str, origin: &str) -> Result<Self, ConfigError> {
		let deserializer = &mut serde_json::Deserializer::from_str(raw);
		let settings: Self = serde_path_to_error::deserialize(deserializer).map_err(|e| {
			ConfigError::SettingsParse { origin: origin.to_owned(), source: Arc::new(e) }
		})?;

		settings.validate()?;

		Ok(settings)
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsDocument {
	authority: String,
	client_id: String,
	key: SigningKey,
}
impl TryFrom<SettingsDocument> for Settings {
	type Error = ConfigError;

	fn try_from(document: SettingsDocument) -> Result<Self, Self::Error> {
		Self::unvalidated(&document.authority, document.client_id, document.key)
	}
}
