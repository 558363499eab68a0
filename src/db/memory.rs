// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory datastore for local development and tests.

use super::{CredentialStore, MeetingStore};
use crate::error::AppError;
use crate::locks::KeyedLocks;
use crate::models::{Credential, Identity, IdentityRecord, Meeting};
use async_trait::async_trait;
use dashmap::DashMap;

/// Process-local store. Upserts are serialized per subject.
#[derive(Default)]
pub struct MemoryStore {
    identities: DashMap<String, IdentityRecord>,
    /// email -> subject
    email_index: DashMap<String, String>,
    meetings: DashMap<String, Meeting>,
    subject_locks: KeyedLocks,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn upsert(
        &self,
        identity: &Identity,
        credential: &Credential,
    ) -> Result<IdentityRecord, AppError> {
        let _guard = self.subject_locks.lock(&identity.subject).await;

        if let Some(owner) = self.email_index.get(&identity.email) {
            if *owner != identity.subject {
                return Err(AppError::Storage(
                    "email is already bound to another identity".to_string(),
                ));
            }
        }

        let existing = self
            .identities
            .get(&identity.subject)
            .map(|r| r.value().clone());
        let previous_email = existing.as_ref().map(|r| r.identity.email.clone());

        let merged = IdentityRecord::merge(existing, identity, credential, chrono::Utc::now());

        self.identities
            .insert(identity.subject.clone(), merged.clone());
        if let Some(previous) = previous_email.filter(|e| *e != merged.identity.email) {
            self.email_index.remove(&previous);
        }
        self.email_index
            .insert(merged.identity.email.clone(), identity.subject.clone());

        Ok(merged)
    }

    async fn get(&self, subject: &str) -> Result<Option<IdentityRecord>, AppError> {
        Ok(self.identities.get(subject).map(|r| r.value().clone()))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, AppError> {
        let Some(subject) = self.email_index.get(email).map(|s| s.value().clone()) else {
            return Ok(None);
        };
        self.get(&subject).await
    }
}

#[async_trait]
impl MeetingStore for MemoryStore {
    async fn insert_meeting(&self, meeting: &Meeting) -> Result<(), AppError> {
        self.meetings
            .entry(meeting.event_id.clone())
            .or_insert_with(|| meeting.clone());
        Ok(())
    }

    async fn get_meeting(&self, event_id: &str) -> Result<Option<Meeting>, AppError> {
        Ok(self.meetings.get(event_id).map(|m| m.value().clone()))
    }
}
