// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notifications to the UI layer: credential change events and the
//! session-expired navigation hook.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Emitted on the credential broadcast channel whenever the session changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CredentialEvent {
    /// A session was established by login or signup.
    SignedIn { user_id: String },
    /// Credentials were renewed. `expires_at` is the new access expiry.
    Refreshed { expires_at: i64 },
    /// The stored user record changed.
    UserUpdated { user_id: String },
    /// The user logged out.
    SignedOut,
    /// The session was torn down after an unrecoverable refresh failure.
    SessionExpired {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        return_to: Option<String>,
    },
}

pub const LOGIN_PATH: &str = "/login";

/// What the user is told when their session ends involuntarily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionNotice {
    pub title: &'static str,
    pub message: &'static str,
    pub login_path: &'static str,
    /// Where the user was, restored after the next login.
    pub return_to: Option<String>,
}

impl SessionNotice {
    pub fn expired(return_to: Option<String>) -> Self {
        Self {
            title: "Session Expired",
            message: "Your session has expired. Please log in again.",
            login_path: LOGIN_PATH,
            return_to,
        }
    }

    /// Login location carrying the return path, e.g. `/login?redirect=/p/42`.
    pub fn login_location(&self) -> String {
        match self.return_to.as_deref() {
            Some(path) if path != self.login_path => {
                format!("{}?redirect={}", self.login_path, encode_path(path))
            }
            _ => self.login_path.to_owned(),
        }
    }
}

fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for b in path.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Navigation side effects requested by the credential layer.
pub trait Navigator: Send + Sync {
    /// The location the user is currently on, if known.
    fn current_path(&self) -> Option<String> {
        None
    }

    /// Show `notice` and move the user to the login surface.
    fn session_expired(&self, notice: &SessionNotice);
}

/// Navigator for headless use: logs the notice and remembers the last location.
#[derive(Debug, Default)]
pub struct LogNavigator {
    location: Mutex<Option<String>>,
}

impl LogNavigator {
    pub fn set_location(&self, path: impl Into<String>) {
        *self.location.lock() = Some(path.into());
    }
}

impl Navigator for LogNavigator {
    fn current_path(&self) -> Option<String> {
        self.location.lock().clone()
    }

    fn session_expired(&self, notice: &SessionNotice) {
        tracing::warn!(redirect = %notice.login_location(), "{}: {}", notice.title, notice.message);
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
