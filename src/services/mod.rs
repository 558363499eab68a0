// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod calendar;
pub mod oauth_state;
pub mod oidc;
pub mod session;
pub mod token_issuer;

pub use calendar::{CalendarClient, CalendarSyncService};
pub use oauth_state::OAuthStateSigner;
pub use oidc::IdentityVerifier;
pub use session::SessionSigner;
pub use token_issuer::TokenIssuer;
