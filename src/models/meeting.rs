// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Meeting records and calendar event views.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default list window length when the caller gives no upper bound.
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Local audit record of an event created upstream.
///
/// Only written after the remote insert succeeded; never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    /// Remote calendar event ID (also the document ID)
    pub event_id: String,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub attendees: Vec<String>,
    /// Email of the creating identity
    pub created_by: String,
    /// Subject of the creating identity
    pub creator_subject: String,
    pub created_at: DateTime<Utc>,
}

/// A validated event to create upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSpec {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// IANA zone name passed through to the calendar
    pub time_zone: Option<String>,
    pub attendees: Vec<String>,
}

impl EventSpec {
    /// Local record for this event once the remote side has accepted it.
    pub fn to_meeting(
        &self,
        event_id: &str,
        creator_email: &str,
        creator_subject: &str,
        now: DateTime<Utc>,
    ) -> Meeting {
        Meeting {
            event_id: event_id.to_string(),
            title: self.title.clone(),
            description: self.description.clone(),
            start_time: self.start,
            end_time: self.end,
            attendees: self.attendees.clone(),
            created_by: creator_email.to_string(),
            creator_subject: creator_subject.to_string(),
            created_at: now,
        }
    }
}

/// Half-open time window `[start, end)` for listing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EventWindow {
    /// Build a window, filling in defaults of now and start + 7 days.
    pub fn resolve(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self, String> {
        let start = start.unwrap_or(now);
        let end = end.unwrap_or(start + Duration::days(DEFAULT_WINDOW_DAYS));
        if end <= start {
            return Err("'time_max' must be after 'time_min'".to_string());
        }
        Ok(Self { start, end })
    }
}

/// Remote event as returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventView {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// RFC3339 datetime, or a date for all-day events
    pub start: Option<String>,
    pub end: Option<String>,
    pub attendees: Vec<String>,
    pub html_link: Option<String>,
    /// Email of the requesting identity
    pub created_by: String,
}

/// Events listed for a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventListing {
    pub events: Vec<EventView>,
    /// More events remained upstream when the page limit was reached
    pub truncated: bool,
}

/// Result of creating an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateEventOutcome {
    pub event_id: String,
    /// The remote event already existed for this idempotency key
    pub duplicate: bool,
    /// The remote event exists but the local mirror could not be written
    pub partial_write: bool,
}
