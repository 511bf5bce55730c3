//! Snapshot providers that hand the broker its current [`Settings`].

// std
use std::path::Path;
// self
use crate::{_prelude::*, error::ConfigError, settings::Settings};

/// Source of the settings snapshot used for a single token fetch.
///
/// Implementations must return a complete snapshot; the broker reads it once per fetch and
/// never mixes fields from two snapshots.
pub trait SettingsProvider
where
	Self: Send + Sync,
{
	/// Returns the snapshot to use, or [`ConfigError::MissingSettings`] when none is available.
	fn current(&self) -> Result<Arc<Settings>, ConfigError>;
}

/// Provider returning one fixed snapshot.
#[derive(Clone, Debug)]
pub struct StaticSettings(Arc<Settings>);
impl StaticSettings {
	/// Wraps a fixed snapshot.
	pub fn new(settings: Settings) -> Self {
		Self(Arc::new(settings))
	}
}
impl SettingsProvider for StaticSettings {
	fn current(&self) -> Result<Arc<Settings>, ConfigError> {
		Ok(Arc::clone(&self.0))
	}
}
impl From<Settings> for StaticSettings {
	fn from(settings: Settings) -> Self {
		Self::new(settings)
	}
}

/// Provider whose snapshot can be swapped at runtime.
///
/// Clones share the same slot, so a handle kept by an operator task can rotate keys for every
/// broker built from it. Replacing the snapshot does not touch cached tokens; call
/// [`TokenCache::clear`](crate::cache::TokenCache::clear) when old tokens must not be served.
#[derive(Clone, Debug, Default)]
pub struct ReloadableSettings(Arc<RwLock<Option<Arc<Settings>>>>);
impl ReloadableSettings {
	/// Starts with the provided snapshot.
	pub fn new(settings: Settings) -> Self {
		Self(Arc::new(RwLock::new(Some(Arc::new(settings)))))
	}

	/// Starts without a snapshot; fetches fail with [`ConfigError::MissingSettings`] until
	/// [`replace`](Self::replace) is called.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Atomically swaps in a new snapshot, returning the previous one.
	pub fn replace(&self, settings: Settings) -> Option<Arc<Settings>> {
		self.0.write().replace(Arc::new(settings))
	}

	/// Removes the current snapshot.
	pub fn clear(&self) -> Option<Arc<Settings>> {
		self.0.write().take()
	}

	/// Loads a settings document from disk and swaps it in.
	///
	/// The current snapshot is left untouched when loading fails.
	pub fn reload_from(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
		let settings = Settings::from_json_file(path)?;

		self.replace(settings);

		Ok(())
	}
}
impl SettingsProvider for ReloadableSettings {
	fn current(&self) -> Result<Arc<Settings>, ConfigError> {
		self.0.read().clone().ok_or(ConfigError::MissingSettings)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::settings::SigningKey;

	fn settings(client_id: &str) -> Settings {
		let key = SigningKey::from_pem(include_str!("../../tests/fixtures/signing-key.pem"))
			.expect("PEM fixture should load.");

		Settings::new("https://mp.example/", client_id, key).expect("Settings should be valid.")
	}

	#[test]
	fn static_settings_always_return_the_same_snapshot() {
		let provider = StaticSettings::new(settings("c1"));
		let a = provider.current().expect("Snapshot should be present.");
		let b = provider.current().expect("Snapshot should be present.");

		assert!(Arc::ptr_eq(&a, &b));
	}

	#[test]
	fn reloadable_settings_swap_whole_snapshots() {
		let provider = ReloadableSettings::empty();

		assert!(matches!(provider.current(), Err(ConfigError::MissingSettings)));
		assert!(provider.replace(settings("c1")).is_none());

		let before = provider.current().expect("Snapshot should be present.");
		let handle = provider.clone();

		handle.replace(settings("c2"));

		assert_eq!(before.client_id, "c1");
		assert_eq!(provider.current().expect("Snapshot should be present.").client_id, "c2");
		assert!(provider.clear().is_some());
		assert!(provider.current().is_err());
	}

	#[test]
	fn failed_reload_keeps_previous_snapshot() {
		let provider = ReloadableSettings::new(settings("c1"));
		let err = provider
			.reload_from("/definitely/not/here.json")
			.expect_err("Missing file must fail the reload.");

		assert!(matches!(err, ConfigError::SettingsFile { .. }));
		assert_eq!(provider.current().expect("Snapshot should survive.").client_id, "c1");
	}
}
