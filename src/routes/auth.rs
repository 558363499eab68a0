// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Login, OAuth callback and logout routes.

use axum::{
    extract::{Query, State},
    response::{Html, Redirect},
    routing::get,
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::auth::SESSION_COOKIE;
use crate::models::Identity;
use crate::services::oauth_state::STATE_MAX_AGE_SECS;
use crate::services::session::SESSION_TTL_SECS;
use crate::AppState;

/// Cookie holding the signed OAuth state during login.
pub const STATE_COOKIE: &str = "oauthstate";

const CALLBACK_PATH: &str = "/auth/provider/callback";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", get(login_page))
        .route("/auth/provider/login", get(auth_start))
        .route(CALLBACK_PATH, get(auth_callback))
        .route("/logout", get(logout))
}

#[derive(Deserialize)]
pub struct LoginPageParams {
    #[serde(default)]
    error: Option<String>,
}

/// Minimal sign-in page. Any `error` value shows the same fixed message.
async fn login_page(Query(params): Query<LoginPageParams>) -> Html<String> {
    let notice = if params.error.is_some() {
        r#"<p class="error">Sign-in was cancelled or failed. Please try again.</p>"#
    } else {
        ""
    };

    Html(format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Sign in</title>
<style>body{{font-family:sans-serif;max-width:32rem;margin:4rem auto}}.error{{color:#b00020}}</style>
</head>
<body>
<h1>Calendar Sync</h1>
{notice}
<p><a href="/auth/provider/login">Sign in with Google</a></p>
</body>
</html>
"#
    ))
}

/// Start OAuth flow - redirect to the provider's consent page.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    let oauth_state = state.oauth_state.issue()?;

    let cookie = Cookie::build((STATE_COOKIE, oauth_state.clone()))
        .path(CALLBACK_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.secure_cookies())
        .max_age(time::Duration::seconds(STATE_MAX_AGE_SECS as i64));

    let auth_url = state.token_issuer.authorization_url(&oauth_state);

    tracing::info!(
        client_id = %state.config.client_id,
        "Starting OAuth flow, redirecting to provider"
    );

    Ok((jar.add(cookie), Redirect::temporary(&auth_url)))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - check state, exchange code, store credential, start session.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect)> {
    // Single use: read the state cookie, then expire it on every path out.
    let cookie_state = jar
        .get(STATE_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());
    let jar = jar.remove(Cookie::build(STATE_COOKIE).path(CALLBACK_PATH));

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from provider");
        return Ok((jar, Redirect::temporary("/login?error=access_denied")));
    }

    let returned_state = params
        .state
        .as_deref()
        .ok_or_else(|| AppError::InvalidCredential("missing state parameter".into()))?;
    state
        .oauth_state
        .verify(returned_state, cookie_state.as_deref())?;

    let code = params
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing authorization code".into()))?;

    tracing::info!("Exchanging authorization code for tokens");
    let (credential, claims) = state.token_issuer.exchange(code).await?;

    let identity = Identity::from_claims(&claims, chrono::Utc::now());
    let record = state
        .datastore
        .credentials
        .upsert(&identity, &credential)
        .await?;

    let session_token = state.session_signer.issue(&record.identity)?;

    tracing::info!(subject = %record.identity.subject, "Login complete, session issued");

    let jar = jar.add(session_cookie(session_token, state.config.secure_cookies()));
    Ok((jar, Redirect::temporary("/api/dashboard")))
}

/// Logout - clear the session cookie.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    let removal = session_cookie(String::new(), state.config.secure_cookies());
    (jar.remove(removal), Redirect::temporary("/login"))
}

fn session_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(SESSION_TTL_SECS as i64))
        .build()
}
