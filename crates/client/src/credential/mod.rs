// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential lifecycle: session model, expiry inspection, durable storage,
//! and the refresh coordinator.
//!
//! A session is the triple of access credential, refresh credential and user
//! record. It is written and cleared as a unit; a refresh replaces only the
//! credentials (and the user when the server returns one).

pub mod inspect;
pub mod refresh;
pub mod store;
pub mod wire;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Renew at this fraction of the refresh credential's remaining lifetime.
pub const RENEWAL_FRACTION: f64 = 0.75;
/// Never arm the renewal timer sooner than this.
pub const RENEWAL_FLOOR_SECS: u64 = 60;
/// The renewal timer only refreshes inside this window before refresh expiry.
pub const PROACTIVE_WINDOW_MINS: u64 = 5;
/// Access credential freshness required when the app regains focus.
pub const FOCUS_WINDOW_MINS: u64 = 2;
/// Access credential freshness required before sending a request.
pub const REQUEST_WINDOW_MINS: u64 = 1;

/// User record as returned by the backend.
///
/// Fields the client does not interpret are kept verbatim in `extra` so a
/// stored record round-trips without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, rename = "fullName", skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, rename = "profilePicture", skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: None,
            email: None,
            full_name: None,
            profile_picture: None,
            extra: Map::new(),
        }
    }

    /// Best display name: username, then full name, then id.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().or(self.full_name.as_deref()).unwrap_or(&self.id)
    }
}

/// The persisted credential triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

/// Source of "now" in epoch seconds.
pub trait Clock: Send + Sync + 'static {
    fn now_secs(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }
}
