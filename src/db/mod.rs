// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer: storage traits plus Firestore and in-memory backends.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{Credential, Identity, IdentityRecord, Meeting};
use async_trait::async_trait;
use std::sync::Arc;

/// Collection names as constants.
pub mod collections {
    /// Identity + credential documents (keyed by subject)
    pub const IDENTITIES: &str = "identities";
    /// Meeting audit records (keyed by remote event ID)
    pub const MEETINGS: &str = "meetings";
}

/// Durable mapping from identity to OAuth credential state.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or merge an identity and its credential, atomically per subject.
    ///
    /// Returns the record as stored after the merge.
    async fn upsert(
        &self,
        identity: &Identity,
        credential: &Credential,
    ) -> Result<IdentityRecord, AppError>;

    async fn get(&self, subject: &str) -> Result<Option<IdentityRecord>, AppError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, AppError>;
}

/// Append-only store of locally mirrored meetings.
#[async_trait]
pub trait MeetingStore: Send + Sync {
    async fn insert_meeting(&self, meeting: &Meeting) -> Result<(), AppError>;

    async fn get_meeting(&self, event_id: &str) -> Result<Option<Meeting>, AppError>;
}

/// Both stores, backed by the same datastore.
#[derive(Clone)]
pub struct Datastore {
    pub credentials: Arc<dyn CredentialStore>,
    pub meetings: Arc<dyn MeetingStore>,
}

impl Datastore {
    /// In-memory datastore (local development and tests).
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            credentials: store.clone(),
            meetings: store,
        }
    }

    /// Open the datastore named by a `DB_URL`-style URL.
    ///
    /// Supported: `memory://` and `firestore://<project-id>`.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        if url == "memory://" || url == "memory" {
            tracing::warn!("Using in-memory datastore; data is lost on restart");
            return Ok(Self::memory());
        }

        if let Some(project_id) = url.strip_prefix("firestore://") {
            let project_id = project_id.trim_end_matches('/');
            if project_id.is_empty() {
                return Err(AppError::Storage(
                    "firestore URL is missing a project ID".to_string(),
                ));
            }
            let db = Arc::new(FirestoreDb::new(project_id).await?);
            return Ok(Self {
                credentials: db.clone(),
                meetings: db,
            });
        }

        Err(AppError::Storage(format!(
            "unsupported datastore URL scheme: {}",
            url.split("://").next().unwrap_or(url)
        )))
    }
}
