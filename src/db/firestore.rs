// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Identities (profile + OAuth credential, one document per subject)
//! - Meetings (audit records of events created upstream)

use super::{collections, CredentialStore, MeetingStore};
use crate::error::AppError;
use crate::locks::KeyedLocks;
use crate::models::{Credential, Identity, IdentityRecord, Meeting};
use crate::time_utils::{format_utc_rfc3339, parse_rfc3339_utc};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Stored form of an identity and its credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdentityDocument {
    subject: String,
    email: String,
    name: Option<String>,
    picture: Option<String>,
    access_token: String,
    refresh_token: Option<String>,
    /// Access token expiry (RFC3339)
    expires_at: String,
    created_at: String,
    updated_at: String,
}

impl IdentityDocument {
    fn from_record(record: &IdentityRecord) -> Self {
        Self {
            subject: record.identity.subject.clone(),
            email: record.identity.email.clone(),
            name: record.identity.name.clone(),
            picture: record.identity.picture.clone(),
            access_token: record.credential.access_token.clone(),
            refresh_token: record.credential.refresh_token.clone(),
            expires_at: format_utc_rfc3339(record.credential.expires_at),
            created_at: format_utc_rfc3339(record.identity.created_at),
            updated_at: format_utc_rfc3339(record.identity.updated_at),
        }
    }

    /// Corrupt timestamps surface as storage errors rather than defaults.
    fn into_record(self) -> Result<IdentityRecord, AppError> {
        let parse = |field: &str, raw: &str| {
            parse_rfc3339_utc(field, raw).map_err(|e| {
                AppError::Storage(format!("identity {}: {}", self.subject, e))
            })
        };

        let expires_at = parse("expires_at", &self.expires_at)?;
        let created_at = parse("created_at", &self.created_at)?;
        let updated_at = parse("updated_at", &self.updated_at)?;

        Ok(IdentityRecord {
            identity: Identity {
                subject: self.subject,
                email: self.email,
                name: self.name,
                picture: self.picture,
                created_at,
                updated_at,
            },
            credential: Credential {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
                expires_at,
            },
        })
    }
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
    /// Serializes upserts for a subject within this instance.
    subject_locks: KeyedLocks,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client,
            subject_locks: KeyedLocks::new(),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Storage(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client,
            subject_locks: KeyedLocks::new(),
        })
    }

    async fn get_document(
        client: &firestore::FirestoreDb,
        subject: &str,
    ) -> Result<Option<IdentityDocument>, AppError> {
        client
            .fluent()
            .select()
            .by_id_in(collections::IDENTITIES)
            .obj()
            .one(subject)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    async fn find_by_email(
        client: &firestore::FirestoreDb,
        email: &str,
    ) -> Result<Option<IdentityDocument>, AppError> {
        let email = email.to_string();
        let mut found: Vec<IdentityDocument> = client
            .fluent()
            .select()
            .from(collections::IDENTITIES)
            .filter(move |q| q.for_all([q.field("email").eq(email.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        Ok(found.pop())
    }

    /// Ownership check and merge, reading through `client`.
    ///
    /// Returns the merged record and whether the subject was new.
    async fn read_and_merge(
        client: &firestore::FirestoreDb,
        identity: &Identity,
        credential: &Credential,
    ) -> Result<(IdentityRecord, bool), AppError> {
        let subject = identity.subject.as_str();

        if let Some(owner) = Self::find_by_email(client, &identity.email).await? {
            if owner.subject != subject {
                return Err(AppError::Storage(
                    "email is already bound to another identity".to_string(),
                ));
            }
        }

        let existing = match Self::get_document(client, subject).await? {
            Some(doc) => Some(doc.into_record()?),
            None => None,
        };
        let is_new = existing.is_none();

        let merged = IdentityRecord::merge(existing, identity, credential, chrono::Utc::now());
        Ok((merged, is_new))
    }
}

#[async_trait]
impl CredentialStore for FirestoreDb {
    /// Read-merge-write of the identity document inside a transaction.
    ///
    /// Both reads go through the transaction, so a concurrent write to the
    /// same document from another instance aborts the commit instead of
    /// being overwritten. The per-subject lock keeps upserts in this
    /// instance from contending with each other.
    async fn upsert(
        &self,
        identity: &Identity,
        credential: &Credential,
    ) -> Result<IdentityRecord, AppError> {
        let subject = identity.subject.as_str();
        let _guard = self.subject_locks.lock(subject).await;

        let mut transaction = self
            .client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

        let in_transaction = self.client.clone_with_consistency_selector(
            firestore::FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ),
        );

        let (merged, is_new) =
            match Self::read_and_merge(&in_transaction, identity, credential).await {
                Ok(result) => result,
                Err(e) => {
                    let _ = transaction.rollback().await;
                    return Err(e);
                }
            };
        let document = IdentityDocument::from_record(&merged);

        let added = self
            .client
            .fluent()
            .update()
            .in_col(collections::IDENTITIES)
            .document_id(subject)
            .object(&document)
            .add_to_transaction(&mut transaction)
            .map(|_| ());
        if let Err(e) = added {
            let _ = transaction.rollback().await;
            return Err(AppError::Storage(format!(
                "Failed to add identity to transaction: {}",
                e
            )));
        }

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Storage(format!("Transaction commit failed: {}", e)))?;

        tracing::info!(subject, is_new, "Identity upserted");
        Ok(merged)
    }

    async fn get(&self, subject: &str) -> Result<Option<IdentityRecord>, AppError> {
        Self::get_document(&self.client, subject)
            .await?
            .map(IdentityDocument::into_record)
            .transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, AppError> {
        Self::find_by_email(&self.client, email)
            .await?
            .map(IdentityDocument::into_record)
            .transpose()
    }
}

#[async_trait]
impl MeetingStore for FirestoreDb {
    async fn insert_meeting(&self, meeting: &Meeting) -> Result<(), AppError> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::MEETINGS)
            .document_id(&meeting.event_id)
            .object(meeting)
            .execute()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_meeting(&self, event_id: &str) -> Result<Option<Meeting>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::MEETINGS)
            .obj()
            .one(event_id)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }
}
