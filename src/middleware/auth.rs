// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request authentication middleware.
//!
//! Accepts either a locally issued session JWT (HS256) or a provider ID token
//! (RS256), from the `Authorization: Bearer` header or the `token` cookie.
//! Verified claims are attached to the request as [`AuthenticatedIdentity`].
//! No refresh and no storage access happens here.

use crate::error::AppError;
use crate::models::IdentityClaims;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode_header, Algorithm};
use std::sync::Arc;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "token";

/// Verified identity attached to an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity(pub IdentityClaims);

/// Middleware that requires a verified session or ID token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers().get(header::AUTHORIZATION))
        .or_else(|| {
            jar.get(SESSION_COOKIE)
                .map(|cookie| cookie.value().to_string())
                .filter(|value| !value.is_empty())
        })
        .ok_or(AppError::Unauthenticated)?;

    let claims = verify_token(&state, &token).await?;

    tracing::debug!(subject = %claims.subject, "Request authenticated");
    request
        .extensions_mut()
        .insert(AuthenticatedIdentity(claims));

    Ok(next.run(request).await)
}

/// Dispatch on the JWT header algorithm.
async fn verify_token(state: &AppState, token: &str) -> Result<IdentityClaims, AppError> {
    let header = decode_header(token)
        .map_err(|e| AppError::InvalidCredential(format!("invalid JWT header: {e}")))?;

    match header.alg {
        Algorithm::HS256 => state.session_signer.verify(token),
        Algorithm::RS256 => state.identity_verifier.verify(token).await,
        other => Err(AppError::InvalidCredential(format!(
            "unsupported JWT alg: {other:?}"
        ))),
    }
}

fn extract_bearer_token(value: Option<&axum::http::HeaderValue>) -> Option<String> {
    let raw = value?.to_str().ok()?;
    let (scheme, token) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    Some(token.to_string())
}
