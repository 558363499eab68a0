// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Loaded once at startup and passed explicitly to every component that needs
//! it; nothing reads the environment after `from_env` returns.

use hkdf::Hkdf;
use sha2::Sha256;
use std::env;
use std::time::Duration;

const GOOGLE_ISSUER: &str = "https://accounts.google.com";
const GOOGLE_ISSUER_BARE: &str = "accounts.google.com";
const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";

/// Calendar all events are written to and read from.
pub const PRIMARY_CALENDAR_ID: &str = "primary";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// OAuth client ID (also the expected ID token audience)
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Registered OAuth redirect URL (`.../auth/provider/callback`)
    pub redirect_url: String,
    /// Secret the session and OAuth state keys are derived from
    pub session_secret: Vec<u8>,
    /// Datastore URL: `memory://` or `firestore://<project-id>`
    pub datastore_url: String,
    /// Server port
    pub port: u16,
    /// Accepted `iss` values for provider ID tokens
    pub oidc_issuers: Vec<String>,
    /// OpenID discovery document URL
    pub oidc_discovery_url: String,
    /// JWKS URL used when discovery is unreachable
    pub oidc_jwks_url: String,
    /// Provider authorization endpoint
    pub authorize_url: String,
    /// Provider token endpoint
    pub token_url: String,
    /// Calendar API base URL
    pub calendar_api_base: String,
    /// Timeout for every outbound HTTP call
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let issuer = env::var("OIDC_ISSUER").unwrap_or_else(|_| GOOGLE_ISSUER.to_string());
        let oidc_issuers = if issuer == GOOGLE_ISSUER {
            vec![GOOGLE_ISSUER.to_string(), GOOGLE_ISSUER_BARE.to_string()]
        } else {
            vec![issuer.clone()]
        };

        let session_secret = required("SECRET_KEY")?.into_bytes();
        if session_secret.len() < 32 {
            return Err(ConfigError::Invalid(
                "SECRET_KEY",
                "must be at least 32 bytes".to_string(),
            ));
        }

        Ok(Self {
            client_id: required("GOOGLE_CLIENT_ID")?,
            client_secret: required("GOOGLE_CLIENT_SECRET")?,
            redirect_url: required("GOOGLE_REDIRECT_URL")?,
            session_secret,
            datastore_url: required("DB_URL")?,
            port: parsed("PORT", 8080)?,
            oidc_discovery_url: env::var("OIDC_DISCOVERY_URL").unwrap_or_else(|_| {
                format!(
                    "{}/.well-known/openid-configuration",
                    issuer.trim_end_matches('/')
                )
            }),
            oidc_issuers,
            oidc_jwks_url: env::var("OIDC_JWKS_URL")
                .unwrap_or_else(|_| GOOGLE_JWKS_URL.to_string()),
            authorize_url: env::var("OAUTH_AUTHORIZE_URL")
                .unwrap_or_else(|_| GOOGLE_AUTHORIZE_URL.to_string()),
            token_url: env::var("OAUTH_TOKEN_URL")
                .unwrap_or_else(|_| GOOGLE_TOKEN_URL.to_string()),
            calendar_api_base: env::var("CALENDAR_API_BASE")
                .unwrap_or_else(|_| GOOGLE_CALENDAR_API.to_string()),
            http_timeout: Duration::from_secs(parsed("HTTP_TIMEOUT_SECS", 5)?),
        })
    }

    /// Deterministic config for tests. Network endpoints point at an
    /// unroutable host until a test overrides them.
    pub fn test_default() -> Self {
        Self {
            client_id: "test-client-id.apps.example.com".to_string(),
            client_secret: "test_secret".to_string(),
            redirect_url: "http://localhost:8080/auth/provider/callback".to_string(),
            session_secret: b"test_session_secret_32_bytes_min!".to_vec(),
            datastore_url: "memory://".to_string(),
            port: 8080,
            oidc_issuers: vec!["https://issuer.test".to_string()],
            oidc_discovery_url: "http://127.0.0.1:9/.well-known/openid-configuration"
                .to_string(),
            oidc_jwks_url: "http://127.0.0.1:9/certs".to_string(),
            authorize_url: "http://127.0.0.1:9/authorize".to_string(),
            token_url: "http://127.0.0.1:9/token".to_string(),
            calendar_api_base: "http://127.0.0.1:9/calendar/v3".to_string(),
            http_timeout: Duration::from_secs(2),
        }
    }

    /// Point every outbound endpoint at a single base URL (mock server).
    pub fn with_endpoints_at(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.oidc_discovery_url = format!("{base}/.well-known/openid-configuration");
        self.oidc_jwks_url = format!("{base}/certs");
        self.authorize_url = format!("{base}/authorize");
        self.token_url = format!("{base}/token");
        self.calendar_api_base = format!("{base}/calendar/v3");
        self
    }

    /// Derive a 32-byte key for one purpose from the session secret.
    pub fn derived_key(&self, purpose: &str) -> [u8; 32] {
        let hk = Hkdf::<Sha256>::new(Some(b"calendar-sync"), &self.session_secret);
        let mut okm = [0u8; 32];
        hk.expand(purpose.as_bytes(), &mut okm)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        okm
    }

    /// Whether cookies must carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.redirect_url.starts_with("https://")
    }

    /// Scheme + host of the redirect URL, used as the allowed CORS origin.
    pub fn app_origin(&self) -> String {
        let Some((scheme, rest)) = self.redirect_url.split_once("://") else {
            return self.redirect_url.clone();
        };
        let host = rest.split('/').next().unwrap_or(rest);
        format!("{scheme}://{host}")
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid(name, e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
