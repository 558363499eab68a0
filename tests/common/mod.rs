// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use calendar_sync::config::Config;
use calendar_sync::db::{Datastore, FirestoreDb};
use calendar_sync::models::{Credential, Identity, IdentityClaims};
use calendar_sync::routes::create_router;
use calendar_sync::services::IdentityVerifier;
use calendar_sync::AppState;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Key ID of the fixture provider key (also in `fixtures/jwks.json`).
#[allow(dead_code)]
pub const TEST_KID: &str = "test-key-1";

#[allow(dead_code)]
pub const PROVIDER_KEY_PEM: &[u8] = include_bytes!("../fixtures/provider_key.pem");
#[allow(dead_code)]
pub const PROVIDER_PUB_PEM: &[u8] = include_bytes!("../fixtures/provider_pub.pem");
#[allow(dead_code)]
pub const ROGUE_KEY_PEM: &[u8] = include_bytes!("../fixtures/rogue_key.pem");
#[allow(dead_code)]
pub const JWKS_JSON: &str = include_str!("../fixtures/jwks.json");

/// Calendar events collection path on the mock server.
#[allow(dead_code)]
pub const EVENTS_PATH: &str = "/calendar/v3/calendars/primary/events";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Router plus the mock server standing in for the provider and calendar.
#[allow(dead_code)]
pub struct TestApp {
    pub app: axum::Router,
    pub state: Arc<AppState>,
    pub server: mockito::ServerGuard,
}

/// Config whose outbound endpoints all point at `server`.
#[allow(dead_code)]
pub fn test_config(server: &mockito::ServerGuard) -> Config {
    Config::test_default().with_endpoints_at(&server.url())
}

/// Verifier trusting only the fixture provider key.
#[allow(dead_code)]
pub fn static_verifier(config: &Config) -> Arc<IdentityVerifier> {
    let key = DecodingKey::from_rsa_pem(PROVIDER_PUB_PEM).expect("fixture public key");
    Arc::new(
        IdentityVerifier::new_with_static_key(config, TEST_KID, key)
            .expect("static verifier should build"),
    )
}

/// Create a test app over an in-memory datastore.
#[allow(dead_code)]
pub async fn create_test_app() -> TestApp {
    create_test_app_with(Datastore::memory()).await
}

/// Create a test app over the given datastore.
#[allow(dead_code)]
pub async fn create_test_app_with(datastore: Datastore) -> TestApp {
    let server = mockito::Server::new_async().await;
    let config = test_config(&server);
    let verifier = static_verifier(&config);

    let state = Arc::new(AppState::new(config, datastore, verifier).expect("state should build"));

    TestApp {
        app: create_router(state.clone()),
        state,
        server,
    }
}

#[allow(dead_code)]
fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Valid ID token claims for the test client.
#[allow(dead_code)]
pub fn id_token_claims(config: &Config, subject: &str, email: &str) -> serde_json::Value {
    let now = now_secs();
    serde_json::json!({
        "iss": config.oidc_issuers[0],
        "aud": config.client_id,
        "sub": subject,
        "email": email,
        "email_verified": true,
        "name": "Test User",
        "iat": now,
        "exp": now + 3600,
    })
}

/// Sign `claims` as the provider would (RS256, fixture key).
#[allow(dead_code)]
pub fn sign_id_token(claims: &serde_json::Value) -> String {
    sign_with(PROVIDER_KEY_PEM, TEST_KID, claims)
}

/// Sign `claims` with an arbitrary PEM private key and key ID.
#[allow(dead_code)]
pub fn sign_with(pem: &[u8], kid: &str, claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem).expect("fixture private key");
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// Token endpoint JSON body.
#[allow(dead_code)]
pub fn token_response(
    access_token: &str,
    refresh_token: Option<&str>,
    id_token: Option<&str>,
) -> String {
    let mut body = serde_json::json!({
        "access_token": access_token,
        "expires_in": 3599,
        "token_type": "Bearer",
        "scope": "openid email profile https://www.googleapis.com/auth/calendar",
    });
    if let Some(refresh) = refresh_token {
        body["refresh_token"] = refresh.into();
    }
    if let Some(id_token) = id_token {
        body["id_token"] = id_token.into();
    }
    body.to_string()
}

/// Store an identity with the given credential directly.
#[allow(dead_code)]
pub async fn seed_identity(
    state: &AppState,
    subject: &str,
    email: &str,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_at: DateTime<Utc>,
) -> IdentityClaims {
    let claims = IdentityClaims {
        subject: subject.to_string(),
        email: email.to_string(),
        name: Some("Test User".to_string()),
        picture: None,
    };
    let credential = Credential {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_at,
    };
    state
        .datastore
        .credentials
        .upsert(&Identity::from_claims(&claims, Utc::now()), &credential)
        .await
        .expect("seed upsert");
    claims
}

/// `Cookie` header value carrying a fresh session for `claims`.
#[allow(dead_code)]
pub fn session_cookie(state: &AppState, claims: &IdentityClaims) -> String {
    let token = state
        .session_signer
        .issue(&Identity::from_claims(claims, Utc::now()))
        .unwrap();
    format!("token={token}")
}

/// All `Set-Cookie` header values of a response.
#[allow(dead_code)]
pub fn set_cookie_headers(response: &axum::response::Response) -> Vec<String> {
    response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

/// The `Set-Cookie` value for cookie `name`.
#[allow(dead_code)]
pub fn find_cookie(headers: &[String], name: &str) -> String {
    headers
        .iter()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
        .unwrap_or_else(|| panic!("missing Set-Cookie header for {name}: {headers:?}"))
}

/// Read a JSON response body.
#[allow(dead_code)]
pub async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
