// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth authorization-code exchange and access token refresh.
//!
//! Nothing here persists; callers store the returned credential.

use crate::config::Config;
use crate::error::AppError;
use crate::models::{Credential, IdentityClaims};
use crate::services::oidc::IdentityVerifier;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identity plus calendar read/write.
pub const OAUTH_SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/calendar.events",
];

/// Used when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Token endpoint response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    id_token: Option<String>,
}

impl TokenResponse {
    fn credential(&self, now: DateTime<Utc>, grant: Grant) -> Result<Credential, AppError> {
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let expires_at = Some(expires_in)
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| grant.rejected(format!("invalid expires_in: {expires_in}")))?;

        Ok(Credential {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone().filter(|t| !t.is_empty()),
            expires_at,
        })
    }
}

/// OAuth error body, e.g. `{"error": "invalid_grant"}`.
#[derive(Deserialize, Default)]
struct TokenErrorBody {
    #[serde(default)]
    error: String,
}

#[derive(Serialize)]
struct CodeExchangeForm<'a> {
    code: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
    grant_type: &'static str,
}

#[derive(Serialize)]
struct RefreshForm<'a> {
    refresh_token: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
}

/// Which token grant a failure belongs to.
#[derive(Clone, Copy)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

impl Grant {
    fn rejected(self, reason: String) -> AppError {
        match self {
            Grant::AuthorizationCode => AppError::ExchangeFailed(reason),
            Grant::RefreshToken => AppError::RefreshFailed(reason),
        }
    }
}

/// Client for the provider's OAuth endpoints.
pub struct TokenIssuer {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    authorize_url: String,
    token_url: String,
    verifier: Arc<IdentityVerifier>,
}

impl TokenIssuer {
    pub fn new(config: &Config, verifier: Arc<IdentityVerifier>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("failed building OAuth HTTP client")?;

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: config.redirect_url.clone(),
            authorize_url: config.authorize_url.clone(),
            token_url: config.token_url.clone(),
            verifier,
        })
    }

    /// Provider consent URL carrying the signed `state`.
    ///
    /// Requests offline access with forced consent so a refresh token is issued.
    pub fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?\
             client_id={}&\
             redirect_uri={}&\
             response_type=code&\
             scope={}&\
             access_type=offline&\
             prompt=consent&\
             include_granted_scopes=true&\
             state={}",
            self.authorize_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_url),
            urlencoding::encode(&OAUTH_SCOPES.join(" ")),
            urlencoding::encode(state)
        )
    }

    /// Redeem a one-time authorization code.
    ///
    /// The returned ID token is verified before its claims are trusted.
    pub async fn exchange(&self, code: &str) -> Result<(Credential, IdentityClaims), AppError> {
        let form = CodeExchangeForm {
            code,
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            redirect_uri: &self.redirect_url,
            grant_type: "authorization_code",
        };

        tracing::debug!("Exchanging authorization code for tokens");

        let response = self.post_token_request(&form, Grant::AuthorizationCode).await?;
        let credential = response.credential(Utc::now(), Grant::AuthorizationCode)?;

        let id_token = response
            .id_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::ExchangeFailed("token response has no id_token".into()))?;

        let claims = self.verifier.verify(id_token).await?;

        tracing::info!(
            subject = %claims.subject,
            has_refresh_token = credential.refresh_token.is_some(),
            "Authorization code exchanged"
        );

        Ok((credential, claims))
    }

    /// Obtain a new access token. The result may carry no refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Credential, AppError> {
        if refresh_token.is_empty() {
            return Err(AppError::RefreshFailed("no refresh token stored".into()));
        }

        let form = RefreshForm {
            refresh_token,
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            grant_type: "refresh_token",
        };

        let response = self.post_token_request(&form, Grant::RefreshToken).await?;
        let credential = response.credential(Utc::now(), Grant::RefreshToken)?;

        tracing::debug!(
            expires_at = %credential.expires_at,
            rotated = credential.refresh_token.is_some(),
            "Access token refreshed"
        );

        Ok(credential)
    }

    async fn post_token_request<F: Serialize>(
        &self,
        form: &F,
        grant: Grant,
    ) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("token request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| grant.rejected(format!("invalid token response: {e}")));
        }

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::ProviderUnavailable(format!(
                "token endpoint returned {status}"
            )));
        }

        // Only the OAuth error code is kept; descriptions may echo input.
        let body: TokenErrorBody = response.json().await.unwrap_or_default();
        tracing::warn!(status = %status, error = %body.error, "Token endpoint rejected request");

        Err(grant.rejected(format!("HTTP {status}: {}", body.error)))
    }
}
