// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Calendar-Sync: sign in with an OIDC provider and manage calendar events
//!
//! This crate provides the backend API that authenticates users, keeps their
//! OAuth credentials fresh, and creates and lists events on their primary
//! calendar.

pub mod config;
pub mod db;
pub mod error;
pub mod locks;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Datastore;
use services::{
    CalendarClient, CalendarSyncService, IdentityVerifier, OAuthStateSigner, SessionSigner,
    TokenIssuer,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub datastore: Datastore,
    pub identity_verifier: Arc<IdentityVerifier>,
    pub token_issuer: Arc<TokenIssuer>,
    pub session_signer: SessionSigner,
    pub oauth_state: OAuthStateSigner,
    pub calendar_sync: CalendarSyncService,
}

impl AppState {
    /// Wire every service from `config`, using `identity_verifier` for ID tokens.
    pub fn new(
        config: Config,
        datastore: Datastore,
        identity_verifier: Arc<IdentityVerifier>,
    ) -> anyhow::Result<Self> {
        let token_issuer = Arc::new(TokenIssuer::new(&config, identity_verifier.clone())?);
        let calendar_sync = CalendarSyncService::new(
            CalendarClient::new(&config)?,
            token_issuer.clone(),
            datastore.clone(),
        );

        Ok(Self {
            session_signer: SessionSigner::new(&config),
            oauth_state: OAuthStateSigner::new(&config),
            config,
            datastore,
            identity_verifier,
            token_issuer,
            calendar_sync,
        })
    }
}
