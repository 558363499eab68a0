// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! OAuth state tests.
//!
//! These tests verify that the callback only proceeds when the returned
//! `state` matches the signed value bound to the browser's state cookie.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use tower::ServiceExt;

mod common;

fn callback(query: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(format!("/auth/provider/callback?{query}"));
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, format!("oauthstate={cookie}"));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_state_mismatch_is_rejected() {
    let mut t = common::create_test_app().await;
    let token_mock = t
        .server
        .mock("POST", "/token")
        .expect(0)
        .create_async()
        .await;

    let cookie_state = t.state.oauth_state.issue().unwrap();
    let other_state = t.state.oauth_state.issue().unwrap();

    let response = t
        .app
        .clone()
        .oneshot(callback(
            &format!("code=abc&state={other_state}"),
            Some(&cookie_state),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    token_mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_state_cookie_is_rejected() {
    let t = common::create_test_app().await;
    let state = t.state.oauth_state.issue().unwrap();

    let response = t
        .app
        .oneshot(callback(&format!("code=abc&state={state}"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_state_param_is_rejected() {
    let t = common::create_test_app().await;
    let state = t.state.oauth_state.issue().unwrap();

    let response = t
        .app
        .oneshot(callback("code=abc", Some(&state)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unsigned_state_is_rejected() {
    let t = common::create_test_app().await;
    // Same shape as a real state but without a valid signature
    let now = chrono::Utc::now().timestamp();
    let forged = URL_SAFE_NO_PAD.encode(format!("{}|{:x}|{}", "00".repeat(16), now, "ab".repeat(32)));

    let response = t
        .app
        .oneshot(callback(&format!("code=abc&state={forged}"), Some(&forged)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_state_from_other_deployment_is_rejected() {
    let t = common::create_test_app().await;

    let mut other_config = calendar_sync::config::Config::test_default();
    other_config.session_secret = b"a-completely-different-secret-value".to_vec();
    let foreign = calendar_sync::services::OAuthStateSigner::new(&other_config)
        .issue()
        .unwrap();

    let response = t
        .app
        .oneshot(callback(&format!("code=abc&state={foreign}"), Some(&foreign)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_provider_error_redirects_to_login() {
    let t = common::create_test_app().await;
    let state = t.state.oauth_state.issue().unwrap();

    let response = t
        .app
        .oneshot(callback(
            &format!("error=access_denied&state={state}"),
            Some(&state),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/login?error=access_denied"
    );
}

#[tokio::test]
async fn test_login_page_shows_fixed_error_text() {
    let t = common::create_test_app().await;

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/login?error=%3Cscript%3Ealert(1)%3C%2Fscript%3E")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("Sign-in was cancelled or failed"));
    assert!(!html.contains("<script>"));
}
