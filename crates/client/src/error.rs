// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use crate::transport::{ApiResponse, TransportError};

/// Failures of the credential refresh lifecycle.
///
/// Cloneable so a single refresh outcome can be handed to every caller that
/// joined it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No refresh credential is stored, or it has already expired.
    NoRefreshToken,
    /// The refresh endpoint answered with an authorization-class status.
    RefreshRejected { status: u16 },
    /// Network, timeout or server failure while refreshing. The session is kept.
    RefreshTransport(String),
    /// A request that was already replayed once still got 401.
    RequestRetryExhausted,
}

impl AuthError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoRefreshToken => "NO_REFRESH_TOKEN",
            Self::RefreshRejected { .. } => "REFRESH_REJECTED",
            Self::RefreshTransport(_) => "REFRESH_TRANSPORT",
            Self::RequestRetryExhausted => "REQUEST_RETRY_EXHAUSTED",
        }
    }

    /// Fatal failures end the session; the rest leave it for a later retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NoRefreshToken | Self::RefreshRejected { .. })
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::NoRefreshToken | Self::RequestRetryExhausted => 401,
            Self::RefreshRejected { status } => *status,
            Self::RefreshTransport(_) => 503,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRefreshToken => f.write_str("no refresh token available or expired"),
            Self::RefreshRejected { status } => write!(f, "refresh rejected ({status})"),
            Self::RefreshTransport(detail) => write!(f, "refresh failed: {detail}"),
            Self::RequestRetryExhausted => f.write_str("request still unauthorized after retry"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Error surfaced to feature code issuing API calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The call failed for credential reasons.
    Auth(AuthError),
    /// The server answered with a non-success status.
    Status { status: u16, message: String },
    /// The request never produced a response.
    Transport(String),
    /// The response body did not have the expected shape.
    Decode(String),
    /// Login/signup succeeded but the response lacked user or credentials.
    IncompleteSession,
    /// The session could not be persisted locally.
    Storage(String),
}

impl ApiError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth(e) => e.as_str(),
            Self::Status { .. } => "STATUS",
            Self::Transport(_) => "TRANSPORT",
            Self::Decode(_) => "DECODE",
            Self::IncompleteSession => "INCOMPLETE_SESSION",
            Self::Storage(_) => "STORAGE",
        }
    }

    /// HTTP status associated with the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth(e) => Some(e.http_status()),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Build a `Status` error from a failed response, preferring the server's
    /// `message` field.
    pub fn from_response(resp: &ApiResponse) -> Self {
        let message = resp
            .message()
            .unwrap_or_else(|| format!("request failed with status {}", resp.status));
        Self::Status { status: resp.status, message }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(e) => write!(f, "{e}"),
            Self::Status { status, message } => write!(f, "{message} ({status})"),
            Self::Transport(detail) => write!(f, "transport error: {detail}"),
            Self::Decode(detail) => write!(f, "unexpected response: {detail}"),
            Self::IncompleteSession => {
                f.write_str("user, accessToken, or refreshToken not provided in response")
            }
            Self::Storage(detail) => write!(f, "failed to persist session: {detail}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl From<TransportError> for ApiError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
