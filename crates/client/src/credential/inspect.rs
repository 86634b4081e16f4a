// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expiry inspection of signed credentials.
//!
//! Only the payload segment is decoded; signatures are never checked. Every
//! decode failure is treated as an expired credential.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};

/// Why a credential payload could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not a three-segment token.
    Malformed,
    Base64(String),
    Json(String),
    /// Payload decoded but is not a JSON object.
    NotAnObject,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => f.write_str("credential has no payload segment"),
            Self::Base64(e) => write!(f, "payload is not base64url: {e}"),
            Self::Json(e) => write!(f, "payload is not JSON: {e}"),
            Self::NotAnObject => f.write_str("payload is not a JSON object"),
        }
    }
}

/// Freshness of a credential relative to a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Valid,
    ExpiringSoon,
    Expired,
}

/// Decode the claims object of a `header.payload.signature` credential.
pub fn decode_claims(cred: &str) -> Result<Map<String, Value>, DecodeError> {
    let mut segments = cred.split('.');
    let payload = match (segments.next(), segments.next()) {
        (Some(_), Some(payload)) if !payload.is_empty() => payload,
        _ => return Err(DecodeError::Malformed),
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    match serde_json::from_slice(&bytes).map_err(|e| DecodeError::Json(e.to_string()))? {
        Value::Object(claims) => Ok(claims),
        _ => Err(DecodeError::NotAnObject),
    }
}

/// The `exp` claim, or `None` when absent or unreadable.
fn exp_claim(cred: Option<&str>) -> Option<i64> {
    let claims = match decode_claims(cred?) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(err = %e, "unreadable credential treated as expired");
            return None;
        }
    };
    let exp = claims.get("exp")?;
    exp.as_i64().or_else(|| exp.as_f64().map(|secs| secs as i64))
}

/// Expiry in epoch seconds, `0` when it cannot be read.
pub fn expiry_time(cred: Option<&str>) -> i64 {
    exp_claim(cred).unwrap_or(0)
}

pub fn is_expired(cred: Option<&str>, now: u64) -> bool {
    classify(cred, 0, now) == CredentialStatus::Expired
}

/// True when expired or expiring within `threshold_mins`.
pub fn is_expiring_soon(cred: Option<&str>, threshold_mins: u64, now: u64) -> bool {
    classify(cred, threshold_mins, now) != CredentialStatus::Valid
}

pub fn classify(cred: Option<&str>, threshold_mins: u64, now: u64) -> CredentialStatus {
    let Some(exp) = exp_claim(cred) else {
        return CredentialStatus::Expired;
    };
    let remaining = exp.saturating_sub(now as i64);
    if remaining < 0 {
        CredentialStatus::Expired
    } else if remaining < (threshold_mins * 60) as i64 {
        CredentialStatus::ExpiringSoon
    } else {
        CredentialStatus::Valid
    }
}

#[cfg(test)]
#[path = "inspect_tests.rs"]
mod tests;
