// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Signed OAuth `state` values (CSRF protection for the login redirect).
//!
//! Format before base64url: `nonce_hex|issued_at_hex|hmac_hex`, where the
//! HMAC-SHA256 covers `nonce_hex|issued_at_hex`.

use crate::config::Config;
use crate::error::AppError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// How long a login attempt may take (also the state cookie max-age).
pub const STATE_MAX_AGE_SECS: u64 = 10 * 60;

const NONCE_LEN: usize = 16;

#[derive(Clone)]
pub struct OAuthStateSigner {
    key: [u8; 32],
    rng: SystemRandom,
}

impl OAuthStateSigner {
    pub fn new(config: &Config) -> Self {
        Self {
            key: config.derived_key("oauth-state"),
            rng: SystemRandom::new(),
        }
    }

    /// Create a fresh signed state value.
    pub fn issue(&self) -> Result<String, AppError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("random nonce generation failed")))?;

        let payload = format!("{}|{:x}", hex::encode(nonce), now_secs()?);
        let signature = hex::encode(self.sign(&payload)?);

        Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
    }

    /// Check that `state` matches the cookie copy and carries a fresh, valid signature.
    pub fn verify(&self, state: &str, cookie_state: Option<&str>) -> Result<(), AppError> {
        let Some(cookie_state) = cookie_state else {
            return Err(AppError::InvalidCredential("missing oauth state cookie".into()));
        };

        if !bool::from(state.as_bytes().ct_eq(cookie_state.as_bytes())) {
            tracing::warn!("OAuth state does not match cookie");
            return Err(AppError::InvalidCredential("oauth state mismatch".into()));
        }

        self.check_signature(state, now_secs()?)
    }

    fn check_signature(&self, state: &str, now: u64) -> Result<(), AppError> {
        let invalid = || AppError::InvalidCredential("malformed oauth state".into());

        let bytes = URL_SAFE_NO_PAD.decode(state).map_err(|_| invalid())?;
        let decoded = String::from_utf8(bytes).map_err(|_| invalid())?;

        let Some((payload, signature_hex)) = decoded.rsplit_once('|') else {
            return Err(invalid());
        };
        let Some((_nonce, issued_hex)) = payload.split_once('|') else {
            return Err(invalid());
        };

        let signature = hex::decode(signature_hex).map_err(|_| invalid())?;
        let expected = self.sign(payload)?;
        if !bool::from(expected.as_slice().ct_eq(signature.as_slice())) {
            tracing::error!("OAuth state signature mismatch! Potential tampering.");
            return Err(AppError::InvalidCredential("oauth state signature mismatch".into()));
        }

        let issued_at = u64::from_str_radix(issued_hex, 16).map_err(|_| invalid())?;
        if now.saturating_sub(issued_at) > STATE_MAX_AGE_SECS || issued_at > now + 60 {
            return Err(AppError::InvalidCredential("oauth state expired".into()));
        }

        Ok(())
    }

    fn sign(&self, payload: &str) -> Result<Vec<u8>, AppError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn now_secs() -> Result<u64, AppError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_secs())
}
