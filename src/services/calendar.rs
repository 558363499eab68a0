// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar API client and the sync service built on it.
//!
//! Handles:
//! - Event insert and windowed listing against the remote calendar
//! - Lazy access token refresh before any remote call
//! - Mirroring created events into the local meeting store

use crate::config::{Config, PRIMARY_CALENDAR_ID};
use crate::error::AppError;
use crate::models::EventWindow;
use crate::time_utils::format_utc_rfc3339;
use anyhow::Context;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Upper bound on followed `nextPageToken` links for one list call.
const MAX_LIST_PAGES: usize = 20;

/// Calendar API client.
#[derive(Clone)]
pub struct CalendarClient {
    http: reqwest::Client,
    base_url: String,
}

impl CalendarClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("failed building calendar HTTP client")?;

        Ok(Self {
            http,
            base_url: config.calendar_api_base.trim_end_matches('/').to_string(),
        })
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        )
    }

    /// Insert an event. A 409 means an event with the requested ID already exists.
    pub async fn insert_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &EventResource<'_>,
    ) -> Result<InsertOutcome, AppError> {
        let response = self
            .http
            .post(self.events_url(calendar_id))
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await
            .map_err(|e| AppError::RemoteUnavailable(format!("insert request failed: {e}")))?;

        if response.status() == StatusCode::CONFLICT {
            return Ok(InsertOutcome::AlreadyExists);
        }

        let created: RemoteEvent = check_response_json(response).await?;
        Ok(InsertOutcome::Created(created))
    }

    /// List single occurrences in `window`, ordered by start time.
    ///
    /// Follows `nextPageToken` for up to `MAX_LIST_PAGES` pages and drops
    /// cancelled events.
    pub async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        window: &EventWindow,
    ) -> Result<RemotePages, AppError> {
        let url = self.events_url(calendar_id);
        let time_min = format_utc_rfc3339(window.start);
        let time_max = format_utc_rfc3339(window.end);

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let mut query = vec![
                ("timeMin", time_min.clone()),
                ("timeMax", time_max.clone()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("showDeleted", "false".to_string()),
            ];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .query(&query)
                .send()
                .await
                .map_err(|e| AppError::RemoteUnavailable(format!("list request failed: {e}")))?;

            let page: EventsPage = check_response_json(response).await?;
            events.extend(
                page.items
                    .into_iter()
                    .filter(|event| event.status.as_deref() != Some("cancelled")),
            );

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => {
                    return Ok(RemotePages {
                        events,
                        truncated: false,
                    })
                }
            }
        }

        tracing::warn!(
            pages = MAX_LIST_PAGES,
            returned = events.len(),
            "Event listing truncated at page limit"
        );
        Ok(RemotePages {
            events,
            truncated: true,
        })
    }
}

/// Map a non-success response to the remote error kinds, else parse JSON.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    let status = response.status();
    if !status.is_success() {
        let body: RemoteErrorBody = response.json().await.unwrap_or_default();
        let message = body.error.map(|e| e.message).unwrap_or_default();

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(status = %status, "Calendar API unavailable");
            return Err(AppError::RemoteUnavailable(format!("HTTP {status}")));
        }

        return Err(AppError::RemoteRejected(format!("HTTP {status}: {message}")));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::RemoteRejected(format!("JSON parse error: {e}")))
}

/// Events gathered across list pages.
#[derive(Debug)]
pub struct RemotePages {
    pub events: Vec<RemoteEvent>,
    /// A `nextPageToken` was still pending at the page limit
    pub truncated: bool,
}

/// Result of an insert call.
#[derive(Debug)]
pub enum InsertOutcome {
    Created(RemoteEvent),
    /// The requested event ID is already taken (earlier attempt succeeded).
    AlreadyExists,
}

/// Event body sent on insert.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResource<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<&'a str>,
    pub summary: &'a str,
    pub description: &'a str,
    pub start: EventDateTime,
    pub end: EventDateTime,
    pub attendees: Vec<Attendee>,
}

/// Start or end of an event. All-day events carry `date` instead of `dateTime`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    fn display(&self) -> Option<String> {
        self.date_time.clone().or_else(|| self.date.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attendee {
    #[serde(default)]
    pub email: Option<String>,
}

/// Event as returned by the calendar API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start: Option<EventDateTime>,
    #[serde(default)]
    pub end: Option<EventDateTime>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    #[serde(default)]
    pub html_link: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<RemoteEvent>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RemoteErrorBody {
    #[serde(default)]
    error: Option<RemoteErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct RemoteErrorDetail {
    #[serde(default)]
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// CalendarSyncService - credential resolution plus local reconciliation
// ─────────────────────────────────────────────────────────────────────────────

use crate::db::Datastore;
use crate::locks::KeyedLocks;
use crate::models::{
    CreateEventOutcome, Credential, EventListing, EventSpec, EventView, IdentityClaims,
};
use crate::services::token_issuer::TokenIssuer;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Credentials expiring within this margin are refreshed before use.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Remote event ID derived from an idempotency key.
///
/// Lowercase hex is a subset of the calendar's base32hex ID alphabet.
pub fn idempotent_event_id(subject: &str, key: &str) -> String {
    hex::encode(Sha256::digest(format!("{subject}:{key}").as_bytes()))
}

/// Creates and lists events for verified identities.
#[derive(Clone)]
pub struct CalendarSyncService {
    client: CalendarClient,
    token_issuer: Arc<TokenIssuer>,
    datastore: Datastore,
    /// Per-subject mutex serializing refresh-then-persist.
    refresh_locks: KeyedLocks,
}

impl CalendarSyncService {
    pub fn new(client: CalendarClient, token_issuer: Arc<TokenIssuer>, datastore: Datastore) -> Self {
        Self {
            client,
            token_issuer,
            datastore,
            refresh_locks: KeyedLocks::new(),
        }
    }

    /// Stored credential for `subject`, refreshed and persisted first if stale.
    ///
    /// Concurrent callers for one subject refresh at most once: the record is
    /// re-read after the lock is taken.
    pub async fn valid_credential(&self, subject: &str) -> Result<Credential, AppError> {
        let margin = Duration::seconds(REFRESH_MARGIN_SECS);

        let record = self
            .datastore
            .credentials
            .get(subject)
            .await?
            .ok_or(AppError::Unauthenticated)?;
        if !record.credential.is_expired(Utc::now(), margin) {
            return Ok(record.credential);
        }

        let _guard = self.refresh_locks.lock(subject).await;

        let record = self
            .datastore
            .credentials
            .get(subject)
            .await?
            .ok_or(AppError::Unauthenticated)?;
        if !record.credential.is_expired(Utc::now(), margin) {
            return Ok(record.credential);
        }

        let refresh_token = record
            .credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| AppError::RefreshFailed("no refresh token stored".into()))?;

        tracing::info!(subject, "Access token expired, refreshing");
        let fresh = self.token_issuer.refresh(refresh_token).await?;

        let stored = self
            .datastore
            .credentials
            .upsert(&record.identity, &fresh)
            .await?;

        tracing::info!(subject, expires_at = %stored.credential.expires_at, "Refreshed credential stored");
        Ok(stored.credential)
    }

    /// Create an event upstream, then record it locally.
    ///
    /// A failed local write after a successful insert is reported through
    /// `partial_write`, not as an error.
    pub async fn create_event(
        &self,
        claims: &IdentityClaims,
        spec: &EventSpec,
        idempotency_key: Option<&str>,
    ) -> Result<CreateEventOutcome, AppError> {
        let credential = self.valid_credential(&claims.subject).await?;

        let requested_id = idempotency_key.map(|key| idempotent_event_id(&claims.subject, key));
        let start = format_utc_rfc3339(spec.start);
        let end = format_utc_rfc3339(spec.end);

        let resource = EventResource {
            id: requested_id.as_deref(),
            summary: &spec.title,
            description: &spec.description,
            start: EventDateTime {
                date_time: Some(start),
                date: None,
                time_zone: spec.time_zone.clone(),
            },
            end: EventDateTime {
                date_time: Some(end),
                date: None,
                time_zone: spec.time_zone.clone(),
            },
            attendees: spec
                .attendees
                .iter()
                .map(|email| Attendee {
                    email: Some(email.clone()),
                })
                .collect(),
        };

        let outcome = self
            .client
            .insert_event(&credential.access_token, PRIMARY_CALENDAR_ID, &resource)
            .await?;

        let (event_id, duplicate) = match (outcome, requested_id) {
            (InsertOutcome::Created(event), _) => (event.id, false),
            (InsertOutcome::AlreadyExists, Some(id)) => (id, true),
            (InsertOutcome::AlreadyExists, None) => {
                return Err(AppError::RemoteRejected(
                    "calendar reported a conflict for a new event".into(),
                ));
            }
        };

        tracing::info!(
            subject = %claims.subject,
            event_id = %event_id,
            duplicate,
            "Calendar event created"
        );

        let partial_write = match self.mirror_meeting(claims, spec, &event_id, duplicate).await {
            Ok(()) => false,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    event_id = %event_id,
                    "Remote event exists but local meeting record was not written"
                );
                true
            }
        };

        Ok(CreateEventOutcome {
            event_id,
            duplicate,
            partial_write,
        })
    }

    /// Write the local meeting record; on a duplicate only back-fill a missing one.
    async fn mirror_meeting(
        &self,
        claims: &IdentityClaims,
        spec: &EventSpec,
        event_id: &str,
        duplicate: bool,
    ) -> Result<(), AppError> {
        if duplicate && self.datastore.meetings.get_meeting(event_id).await?.is_some() {
            return Ok(());
        }

        let meeting = spec.to_meeting(event_id, &claims.email, &claims.subject, Utc::now());
        self.datastore.meetings.insert_meeting(&meeting).await
    }

    /// Read-through listing of remote events in `window`.
    pub async fn list_events(
        &self,
        claims: &IdentityClaims,
        window: &EventWindow,
    ) -> Result<EventListing, AppError> {
        let credential = self.valid_credential(&claims.subject).await?;

        let pages = self
            .client
            .list_events(&credential.access_token, PRIMARY_CALENDAR_ID, window)
            .await?;

        tracing::debug!(
            subject = %claims.subject,
            count = pages.events.len(),
            truncated = pages.truncated,
            "Listed events"
        );

        Ok(EventListing {
            events: pages
                .events
                .into_iter()
                .map(|event| event.into_view(&claims.email))
                .collect(),
            truncated: pages.truncated,
        })
    }
}

impl RemoteEvent {
    /// Client view, attributed to the requesting identity.
    pub fn into_view(self, created_by: &str) -> EventView {
        EventView {
            id: self.id,
            title: self.summary.unwrap_or_default(),
            description: self.description,
            start: self.start.as_ref().and_then(EventDateTime::display),
            end: self.end.as_ref().and_then(EventDateTime::display),
            attendees: self.attendees.into_iter().filter_map(|a| a.email).collect(),
            html_link: self.html_link,
            created_by: created_by.to_string(),
        }
    }
}
