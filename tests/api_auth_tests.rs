// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API authentication and CORS tests.
//!
//! These tests verify that:
//! 1. Protected routes reject requests without valid credentials
//! 2. Session cookies, session bearer tokens and provider ID tokens are accepted
//! 3. CORS preflight requests return correct headers

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use calendar_sync::models::IdentityClaims;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use tower::ServiceExt;

mod common;

fn claims() -> IdentityClaims {
    IdentityClaims {
        subject: "u1".to_string(),
        email: "a@x.com".to_string(),
        name: Some("Ada".to_string()),
        picture: None,
    }
}

#[tokio::test]
async fn test_protected_route_without_credentials() {
    let t = common::create_test_app().await;

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/api/dashboard")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = common::json_body(response).await;
    assert_eq!(body["error"], "unauthenticated");
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn test_protected_route_with_garbage_token() {
    let t = common::create_test_app().await;

    for auth in ["Bearer not-a-jwt", "Bearer a.b.c", "Basic dXNlcjpwYXNz"] {
        let response = t
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/me")
                    .header(header::AUTHORIZATION, auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{auth}");
    }
}

#[tokio::test]
async fn test_session_cookie_authenticates() {
    let t = common::create_test_app().await;
    let cookie = common::session_cookie(&t.state, &claims());

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::json_body(response).await;
    assert_eq!(body["subject"], "u1");
    assert_eq!(body["email"], "a@x.com");
}

#[tokio::test]
async fn test_dashboard_greets_identity() {
    let t = common::create_test_app().await;
    let cookie = common::session_cookie(&t.state, &claims());

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/api/dashboard")
                .header(header::COOKIE, cookie)
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
    assert!(html.contains("Welcome, Ada"));
}

#[tokio::test]
async fn test_bearer_header_takes_precedence_over_cookie() {
    let t = common::create_test_app().await;
    let header_claims = IdentityClaims {
        subject: "u2".to_string(),
        email: "b@x.com".to_string(),
        name: None,
        picture: None,
    };
    let bearer = common::session_cookie(&t.state, &header_claims)
        .trim_start_matches("token=")
        .to_string();
    let cookie = common::session_cookie(&t.state, &claims());

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::json_body(response).await;
    assert_eq!(body["subject"], "u2");
}

#[tokio::test]
async fn test_provider_id_token_authenticates() {
    let t = common::create_test_app().await;
    let token = common::sign_id_token(&common::id_token_claims(&t.state.config, "u9", "z@x.com"));

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::json_body(response).await;
    assert_eq!(body["subject"], "u9");
    assert_eq!(body["name"], "Test User");
}

#[tokio::test]
async fn test_id_token_for_other_audience_is_rejected() {
    let t = common::create_test_app().await;
    let mut id_claims = common::id_token_claims(&t.state.config, "u9", "z@x.com");
    id_claims["aud"] = "some-other-client".into();
    let token = common::sign_id_token(&id_claims);

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_signed_with_raw_secret_is_rejected() {
    let t = common::create_test_app().await;
    let now = chrono::Utc::now().timestamp() as u64;
    let forged = encode(
        &Header::new(Algorithm::HS256),
        &serde_json::json!({
            "sub": "u1", "email": "a@x.com", "iss": "calendar-sync",
            "iat": now, "exp": now + 3600
        }),
        &EncodingKey::from_secret(b"guessed-secret"),
    )
    .unwrap();

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::COOKIE, format!("token={forged}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_public_routes_need_no_auth() {
    let t = common::create_test_app().await;

    for uri in ["/health", "/login"] {
        let response = t
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
    }
}

#[tokio::test]
async fn test_cors_preflight_allows_idempotency_key() {
    let t = common::create_test_app().await;

    let response = t
        .app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/events/create")
                .header(header::ORIGIN, "http://localhost:8080")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "idempotency-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:8080"
    );
    assert_eq!(
        headers
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_cors_rejects_unknown_origin() {
    let t = common::create_test_app().await;

    let response = t
        .app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/me")
                .header(header::ORIGIN, "https://evil.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
