// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity and OAuth credential models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Verified identity claims, decoded from a provider ID token or a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Provider-issued stable subject identifier
    pub subject: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// One authenticated end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider subject (unique, also the storage key)
    pub subject: String,
    /// Email address (unique)
    pub email: String,
    pub name: Option<String>,
    /// Profile image URL
    pub picture: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Build a fresh identity from verified claims.
    pub fn from_claims(claims: &IdentityClaims, now: DateTime<Utc>) -> Self {
        Self {
            subject: claims.subject.clone(),
            email: claims.email.clone(),
            name: claims.name.clone(),
            picture: claims.picture.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// OAuth credential owned by exactly one identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    /// Not always reissued on refresh; `None` means "keep the stored one".
    pub refresh_token: Option<String>,
    /// Expiry of `access_token`
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// True when the access token must not be presented anymore.
    pub fn is_expired(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        now + margin >= self.expires_at
    }

    fn usable_refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.usable_refresh_token().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Stored identity together with its credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub identity: Identity,
    pub credential: Credential,
}

impl IdentityRecord {
    /// Merge an incoming identity/credential pair into what is stored.
    ///
    /// On an existing record only email, name and credential fields change,
    /// and an empty incoming refresh token keeps the stored one.
    pub fn merge(
        existing: Option<IdentityRecord>,
        identity: &Identity,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> IdentityRecord {
        match existing {
            None => IdentityRecord {
                identity: Identity {
                    created_at: now,
                    updated_at: now,
                    ..identity.clone()
                },
                credential: Credential {
                    refresh_token: credential.usable_refresh_token().map(str::to_string),
                    ..credential.clone()
                },
            },
            Some(stored) => {
                let refresh_token = credential
                    .usable_refresh_token()
                    .or(stored.credential.usable_refresh_token())
                    .map(str::to_string);

                IdentityRecord {
                    identity: Identity {
                        email: identity.email.clone(),
                        name: identity.name.clone(),
                        updated_at: now,
                        ..stored.identity
                    },
                    credential: Credential {
                        access_token: credential.access_token.clone(),
                        refresh_token,
                        expires_at: credential.expires_at,
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn identity(email: &str, now: DateTime<Utc>) -> Identity {
        Identity {
            subject: "u1".to_string(),
            email: email.to_string(),
            name: Some("Ada".to_string()),
            picture: Some("https://img.example/a.png".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    fn credential(access: &str, refresh: Option<&str>, expires_at: DateTime<Utc>) -> Credential {
        Credential {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_at,
        }
    }

    #[test]
    fn merge_inserts_new_record() {
        let now = Utc::now();
        let cred = credential("a1", Some("r1"), now + Duration::hours(1));
        let merged = IdentityRecord::merge(None, &identity("a@x.com", now), &cred, now);

        assert_eq!(merged.credential, cred);
        assert_eq!(merged.identity.email, "a@x.com");
    }

    #[test]
    fn merge_keeps_refresh_token_when_not_reissued() {
        let now = Utc::now();
        let stored = IdentityRecord::merge(
            None,
            &identity("a@x.com", now),
            &credential("a1", Some("r1"), now),
            now,
        );

        for missing in [None, Some("")] {
            let later = now + Duration::minutes(5);
            let merged = IdentityRecord::merge(
                Some(stored.clone()),
                &identity("a@x.com", later),
                &credential("a2", missing, later + Duration::hours(1)),
                later,
            );
            assert_eq!(merged.credential.access_token, "a2");
            assert_eq!(merged.credential.refresh_token.as_deref(), Some("r1"));
            assert_eq!(merged.credential.expires_at, later + Duration::hours(1));
        }
    }

    #[test]
    fn merge_updates_profile_but_not_creation_or_picture() {
        let now = Utc::now();
        let stored = IdentityRecord::merge(
            None,
            &identity("a@x.com", now),
            &credential("a1", Some("r1"), now),
            now,
        );

        let later = now + Duration::days(1);
        let mut incoming = identity("new@x.com", later);
        incoming.name = Some("Ada L.".to_string());
        incoming.picture = None;

        let merged = IdentityRecord::merge(
            Some(stored),
            &incoming,
            &credential("a2", Some("r2"), later),
            later,
        );

        assert_eq!(merged.identity.email, "new@x.com");
        assert_eq!(merged.identity.name.as_deref(), Some("Ada L."));
        assert_eq!(
            merged.identity.picture.as_deref(),
            Some("https://img.example/a.png")
        );
        assert_eq!(merged.identity.created_at, now);
        assert_eq!(merged.identity.updated_at, later);
        assert_eq!(merged.credential.refresh_token.as_deref(), Some("r2"));
    }

    #[test]
    fn expiry_uses_margin() {
        let now = Utc::now();
        let cred = credential("a", None, now + Duration::seconds(30));
        assert!(cred.is_expired(now, Duration::seconds(60)));
        assert!(!cred.is_expired(now, Duration::zero()));
        assert!(credential("a", None, now).is_expired(now, Duration::zero()));
    }

    #[test]
    fn debug_redacts_tokens() {
        let rendered = format!(
            "{:?}",
            credential("secret-access", Some("secret-refresh"), Utc::now())
        );
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }
}
