// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Locally issued session tokens (HS256 JWT).

use crate::config::Config;
use crate::error::AppError;
use crate::models::{Identity, IdentityClaims};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// `iss` of every session token.
pub const SESSION_ISSUER: &str = "calendar-sync";

/// Session lifetime, independent of the OAuth access token expiry.
pub const SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Session JWT claims. Carries no OAuth token.
#[derive(Debug, Serialize, Deserialize, Clone)]
struct SessionClaims {
    /// Provider subject
    sub: String,
    email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    iss: String,
    iat: u64,
    exp: u64,
}

/// Signs and verifies session tokens with a key derived from the configured secret.
#[derive(Clone)]
pub struct SessionSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SessionSigner {
    pub fn new(config: &Config) -> Self {
        let key = config.derived_key("session");
        Self {
            encoding_key: EncodingKey::from_secret(&key),
            decoding_key: DecodingKey::from_secret(&key),
        }
    }

    /// Issue a 24h session token for `identity`.
    pub fn issue(&self, identity: &Identity) -> Result<String, AppError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
            .as_secs();

        let claims = SessionClaims {
            sub: identity.subject.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            iss: SESSION_ISSUER.to_string(),
            iat: now,
            exp: now + SESSION_TTL_SECS,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))
    }

    /// Verify a session token and return the identity it names.
    pub fn verify(&self, token: &str) -> Result<IdentityClaims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.set_issuer(&[SESSION_ISSUER]);

        let claims = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::InvalidCredential(format!("session token rejected: {e}")))?
            .claims;

        if claims.sub.is_empty() {
            return Err(AppError::IncompleteClaims("sub"));
        }
        if claims.email.is_empty() {
            return Err(AppError::IncompleteClaims("email"));
        }

        Ok(IdentityClaims {
            subject: claims.sub,
            email: claims.email,
            name: claims.name,
            picture: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn identity() -> Identity {
        Identity::from_claims(
            &IdentityClaims {
                subject: "u1".into(),
                email: "a@x.com".into(),
                name: Some("Ada".into()),
                picture: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn issue_then_verify() {
        let signer = SessionSigner::new(&Config::test_default());
        let token = signer.issue(&identity()).unwrap();
        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.subject, "u1");
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let mut other = Config::test_default();
        other.session_secret = b"another_secret_that_is_32_bytes!!".to_vec();

        let token = SessionSigner::new(&other).issue(&identity()).unwrap();
        let result = SessionSigner::new(&Config::test_default()).verify(&token);
        assert!(matches!(result, Err(AppError::InvalidCredential(_))));
    }

    #[test]
    fn rejects_expired_token() {
        let config = Config::test_default();
        let key = config.derived_key("session");
        let claims = SessionClaims {
            sub: "u1".into(),
            email: "a@x.com".into(),
            name: None,
            iss: SESSION_ISSUER.into(),
            iat: 1_000,
            exp: 2_000,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&key),
        )
        .unwrap();

        assert!(matches!(
            SessionSigner::new(&config).verify(&token),
            Err(AppError::InvalidCredential(_))
        ));
    }

    #[test]
    fn rejects_foreign_issuer_and_missing_email() {
        let config = Config::test_default();
        let key = config.derived_key("session");
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let sign = |iss: &str, email: &str| {
            encode(
                &Header::new(Algorithm::HS256),
                &SessionClaims {
                    sub: "u1".into(),
                    email: email.into(),
                    name: None,
                    iss: iss.into(),
                    iat: now,
                    exp: now + 60,
                },
                &EncodingKey::from_secret(&key),
            )
            .unwrap()
        };

        let signer = SessionSigner::new(&config);
        assert!(matches!(
            signer.verify(&sign("someone-else", "a@x.com")),
            Err(AppError::InvalidCredential(_))
        ));
        assert!(matches!(
            signer.verify(&sign(SESSION_ISSUER, "")),
            Err(AppError::IncompleteClaims("email"))
        ));
    }

    #[test]
    fn session_key_is_not_the_raw_secret() {
        let config = Config::test_default();
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({
                "sub": "u1", "email": "a@x.com", "iss": SESSION_ISSUER,
                "iat": 1, "exp": 4_000_000_000u64
            }),
            &EncodingKey::from_secret(&config.session_secret),
        )
        .unwrap();
        assert!(SessionSigner::new(&config).verify(&token).is_err());
    }
}
