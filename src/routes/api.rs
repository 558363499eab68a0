// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthenticatedIdentity;
use crate::models::{EventSpec, EventView, EventWindow};
use crate::time_utils::parse_rfc3339_utc;
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Html,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::{Validate, ValidateEmail, ValidationError};

/// Optional client-chosen key that makes event creation safe to retry.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// API routes (require authentication).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/dashboard", get(dashboard))
        .route("/api/me", get(get_me))
        .route("/api/events/create", post(create_event))
        .route("/api/events/list", get(list_events))
}

// ─── Identity ────────────────────────────────────────────────

/// Current identity response.
#[derive(Serialize)]
pub struct MeResponse {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Get the verified identity of the caller.
async fn get_me(
    Extension(AuthenticatedIdentity(claims)): Extension<AuthenticatedIdentity>,
) -> Json<MeResponse> {
    Json(MeResponse {
        subject: claims.subject,
        email: claims.email,
        name: claims.name,
        picture: claims.picture,
    })
}

async fn dashboard(
    Extension(AuthenticatedIdentity(claims)): Extension<AuthenticatedIdentity>,
) -> Html<String> {
    let who = escape_html(claims.name.as_deref().unwrap_or(&claims.email));

    Html(format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Dashboard</title>
<style>body{{font-family:sans-serif;max-width:32rem;margin:4rem auto}}</style>
</head>
<body>
<h1>Welcome, {who}</h1>
<p>Your calendar is connected.</p>
<p><a href="/logout">Log out</a></p>
</body>
</html>
"#
    ))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ─── Events ──────────────────────────────────────────────────

/// Start or end of a new event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTimeInput {
    /// RFC3339 datetime
    pub date_time: String,
    /// IANA zone name
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEventRequest {
    #[serde(rename = "summary")]
    #[validate(length(min = 1, max = 1024, message = "summary must be 1-1024 characters"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 8192, message = "description must be at most 8192 characters"))]
    pub description: String,
    pub start: EventTimeInput,
    pub end: EventTimeInput,
    #[serde(default)]
    #[validate(custom(function = "validate_attendees"))]
    pub attendees: Vec<String>,
}

fn validate_attendees(attendees: &[String]) -> std::result::Result<(), ValidationError> {
    if attendees.iter().all(|email| email.validate_email()) {
        Ok(())
    } else {
        Err(ValidationError::new("attendees")
            .with_message("every attendee must be a valid email address".into()))
    }
}

impl CreateEventRequest {
    /// Validate and convert into an event to create.
    pub fn into_spec(self) -> Result<EventSpec> {
        self.validate()?;

        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::BadRequest("summary must not be blank".into()));
        }

        let start = parse_rfc3339_utc("start.dateTime", &self.start.date_time)
            .map_err(AppError::BadRequest)?;
        let end =
            parse_rfc3339_utc("end.dateTime", &self.end.date_time).map_err(AppError::BadRequest)?;
        if end <= start {
            return Err(AppError::BadRequest(
                "'end.dateTime' must be after 'start.dateTime'".into(),
            ));
        }

        let time_zone = self
            .start
            .time_zone
            .or(self.end.time_zone)
            .filter(|tz| !tz.trim().is_empty());

        Ok(EventSpec {
            title,
            description: self.description,
            start,
            end,
            time_zone,
            attendees: self.attendees,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CreateEventResponse {
    pub message: String,
    pub event_id: String,
    pub duplicate: bool,
    pub partial_write: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedIdentity(claims)): Extension<AuthenticatedIdentity>,
    headers: HeaderMap,
    WithRejection(Json(request), _): WithRejection<Json<CreateEventRequest>, AppError>,
) -> Result<(StatusCode, Json<CreateEventResponse>)> {
    let idempotency_key = idempotency_key(&headers)?;
    let spec = request.into_spec()?;

    let outcome = state
        .calendar_sync
        .create_event(&claims, &spec, idempotency_key.as_deref())
        .await?;

    let warning = outcome.partial_write.then(|| {
        "Event was created in the calendar but could not be saved locally".to_string()
    });

    Ok((
        StatusCode::CREATED,
        Json(CreateEventResponse {
            message: "Event created successfully".to_string(),
            event_id: outcome.event_id,
            duplicate: outcome.duplicate,
            partial_write: outcome.partial_write,
            warning,
        }),
    ))
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };

    let key = value
        .to_str()
        .map_err(|_| AppError::BadRequest("Idempotency-Key must be visible ASCII".into()))?
        .trim();

    if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::BadRequest(format!(
            "Idempotency-Key must be 1-{MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }

    Ok(Some(key.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    /// Window start (RFC3339), default now
    #[serde(default)]
    pub time_min: Option<String>,
    /// Window end (RFC3339), default start + 7 days
    #[serde(default)]
    pub time_max: Option<String>,
}

impl ListEventsQuery {
    pub fn window(&self, now: chrono::DateTime<chrono::Utc>) -> Result<EventWindow> {
        let parse = |field: &str, raw: &Option<String>| {
            raw.as_deref()
                .map(|value| parse_rfc3339_utc(field, value))
                .transpose()
                .map_err(AppError::BadRequest)
        };

        let start = parse("time_min", &self.time_min)?;
        let end = parse("time_max", &self.time_max)?;
        EventWindow::resolve(start, end, now).map_err(AppError::BadRequest)
    }
}

#[derive(Debug, Serialize)]
pub struct ListEventsResponse {
    pub events: Vec<EventView>,
    /// Set when the calendar had more events than one listing returns
    pub truncated: bool,
}

async fn list_events(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedIdentity(claims)): Extension<AuthenticatedIdentity>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<ListEventsResponse>> {
    let window = query.window(chrono::Utc::now())?;
    let listing = state.calendar_sync.list_events(&claims, &window).await?;
    Ok(Json(ListEventsResponse {
        events: listing.events,
        truncated: listing.truncated,
    }))
}
