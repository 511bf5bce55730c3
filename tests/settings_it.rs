// std
use std::path::PathBuf;
// crates.io
use httpmock::prelude::*;
// self
use jwt_bearer_broker::{
	client::ReqwestTokenClient,
	error::{ConfigError, Error},
	settings::{ReloadableSettings, Settings, SettingsProvider},
};

const TOKEN_BODY: &str =
	"{\"access_token\":\"tok1\",\"token_type\":\"Bearer\",\"expires_in\":120,\"scope\":\"a\"}";

fn fixture(name: &str) -> PathBuf {
	PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn settings_json(authority: &str) -> String {
	let raw = std::fs::read_to_string(fixture("settings.json")).expect("Fixture should be readable.");
	let mut document: serde_json::Value =
		serde_json::from_str(&raw).expect("Fixture should be JSON.");

	document["authority"] = authority.into();

	document.to_string()
}

#[test]
fn settings_file_loads_with_jwk_key() {
	let settings =
		Settings::from_json_file(fixture("settings.json")).expect("Settings file should load.");

	assert_eq!(settings.client_id, "c1");
	assert_eq!(settings.key.key_id(), Some("test-key-1"));
	assert_eq!(
		settings.token_endpoint().expect("Endpoint should resolve.").as_str(),
		"https://mp.example/token"
	);
	assert!(!format!("{settings:?}").contains("\"d\""));
}

#[tokio::test]
async fn jwk_settings_drive_a_real_exchange() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").form_urlencoded_tuple_exists("assertion");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let settings = Settings::from_json_str(&settings_json(&server.base_url()))
		.expect("Settings document should parse.");
	let client = ReqwestTokenClient::new(ReloadableSettings::new(settings))
		.expect("Client should build.");
	let token = client.authorize(["a"]).await.expect("Authorize should succeed.");

	assert_eq!(token.access_token.expose(), "tok1");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn reloadable_settings_start_empty_and_fill_from_disk() {
	let provider = ReloadableSettings::empty();
	let client = ReqwestTokenClient::new(provider.clone()).expect("Client should build.");

	assert!(matches!(
		client.authorize(["a"]).await,
		Err(Error::Config(ConfigError::MissingSettings))
	));

	provider.reload_from(fixture("settings.json")).expect("Reload should succeed.");

	assert_eq!(client.settings().expect("Snapshot should be present.").client_id, "c1");
	assert!(matches!(
		provider.reload_from(fixture("missing.json")),
		Err(ConfigError::SettingsFile { .. })
	));
	assert!(provider.current().is_ok(), "Failed reload keeps the previous snapshot.");
}

#[test]
fn malformed_documents_name_the_offending_field() {
	let document = "{\"authority\":\"https://mp.example/\",\"clientId\":\"c1\",\"key\":42}";
	let err = Settings::from_json_str(document).expect_err("Numeric key must be rejected.");

	match err {
		ConfigError::SettingsParse { source, .. } => assert_eq!(source.path().to_string(), "key"),
		other => panic!("Unexpected error: {other:?}."),
	}
}
