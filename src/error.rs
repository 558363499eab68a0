// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.
//!
//! Authentication failures are deliberately collapsed into a generic
//! `unauthenticated` body; the underlying reason is only logged.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Identity token is missing required claim: {0}")]
    IncompleteClaims(&'static str),

    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authorization code exchange failed: {0}")]
    ExchangeFailed(String),

    /// Terminal for the session: the user must log in again.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Calendar API unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Calendar API rejected request: {0}")]
    RemoteRejected(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether a caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::RemoteUnavailable(_) | AppError::ProviderUnavailable(_)
        )
    }

    /// Whether this error means the request carried no usable identity.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            AppError::Unauthenticated
                | AppError::InvalidCredential(_)
                | AppError::IncompleteClaims(_)
                | AppError::ExchangeFailed(_)
                | AppError::RefreshFailed(_)
        )
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::BadRequest(errors.to_string())
    }
}

/// Unreadable or ill-typed request bodies are reported like validation errors.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthenticated
            | AppError::InvalidCredential(_)
            | AppError::IncompleteClaims(_)
            | AppError::ExchangeFailed(_) => {
                tracing::warn!(reason = %self, "Rejected unauthenticated request");
                (StatusCode::UNAUTHORIZED, "unauthenticated", None)
            }
            AppError::RefreshFailed(msg) => {
                tracing::warn!(reason = %msg, "Token refresh failed, re-login required");
                (StatusCode::UNAUTHORIZED, "reauthentication_required", None)
            }
            AppError::ProviderUnavailable(msg) => {
                tracing::error!(error = %msg, "Identity provider unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "provider_unavailable", None)
            }
            AppError::RemoteUnavailable(msg) => {
                tracing::error!(error = %msg, "Calendar API unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "calendar_unavailable", None)
            }
            AppError::RemoteRejected(msg) => {
                tracing::warn!(error = %msg, "Calendar API rejected request");
                (StatusCode::BAD_GATEWAY, "calendar_rejected", None)
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Storage(msg) => {
                tracing::error!(error = %msg, "Storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(AppError::RemoteUnavailable("503".into()).is_retryable());
        assert!(AppError::ProviderUnavailable("timeout".into()).is_retryable());
        assert!(!AppError::RemoteRejected("400".into()).is_retryable());
        assert!(!AppError::RefreshFailed("invalid_grant".into()).is_retryable());
    }

    #[test]
    fn auth_failures_hide_provider_text() {
        let response =
            AppError::InvalidCredential("signature mismatch for kid abc".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AppError::RefreshFailed("invalid_grant".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn remote_status_mapping() {
        assert_eq!(
            AppError::RemoteUnavailable("x".into())
                .into_response()
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::RemoteRejected("x".into()).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Storage("x".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
