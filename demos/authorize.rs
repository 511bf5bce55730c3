//! Demonstrates obtaining a JWT-bearer access token against a mock authorization server, then
//! reusing it from the cache and attaching it to a downstream request.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use jwt_bearer_broker::{
	client::ReqwestTokenClient,
	oauth2::http::Method,
	settings::{ReloadableSettings, Settings, SigningKey},
};

const SIGNING_KEY_PEM: &str = include_str!("../tests/fixtures/signing-key.pem");
const TOKEN_BODY: &str = r#"{
	"access_token": "demo-access",
	"token_type": "Bearer",
	"expires_in": 120,
	"scope": "digdir:dialogporten skatteetaten:api"
}"#;

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let key = SigningKey::from_pem(SIGNING_KEY_PEM)?.with_key_id("demo-key");
	let settings = ReloadableSettings::new(Settings::new(server.base_url(), "demo-client", key)?);
	let client = ReqwestTokenClient::new(settings)?;
	let token = client.authorize(["skatteetaten:api", "digdir:dialogporten"]).await?;

	println!("Access token for `{}` expires at {}.", token.scope, token.expires_at());

	let request = client
		.authorized_request(
			["digdir:dialogporten", "skatteetaten:api"],
			Method::GET,
			"https://api.example/dialogs",
		)
		.await?;

	println!("Signed {} {} from the cache.", request.method(), request.uri());

	token_mock.assert_async().await;

	Ok(())
}
