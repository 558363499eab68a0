// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod identity;
pub mod meeting;

pub use identity::{Credential, Identity, IdentityClaims, IdentityRecord};
pub use meeting::{
    CreateEventOutcome, EventListing, EventSpec, EventView, EventWindow, Meeting,
};
