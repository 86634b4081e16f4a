// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outgoing API calls: request/response shapes, the transport seam, and the
//! pre-flight / post-flight credential gates.

pub mod gate;
pub mod http;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

/// Endpoints that establish credentials and therefore skip both gates.
pub const AUTH_ENDPOINTS: &[&str] = &["auth/refresh-token", "auth/login", "auth/signup"];

pub const LOGIN_PATH: &str = "auth/login";
pub const SIGNUP_PATH: &str = "auth/signup";
pub const REFRESH_PATH: &str = "auth/refresh-token";
pub const LOGOUT_PATH: &str = "auth/logout";
pub const FORGOT_PASSWORD_PATH: &str = "auth/forgot-password";
pub const RESET_PASSWORD_PATH: &str = "auth/reset-password";

/// Whether `path` targets one of the credential-establishing endpoints.
pub fn is_auth_endpoint(path: &str) -> bool {
    AUTH_ENDPOINTS.iter().any(|endpoint| path.contains(endpoint))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// A single API call, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    /// Access credential sent as `Authorization: Bearer`.
    pub bearer: Option<String>,
    /// Set once the request has been replayed after a 401.
    pub retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, bearer: None, retried: false }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn is_auth_endpoint(&self) -> bool {
        is_auth_endpoint(&self.path)
    }
}

/// A response with its decoded JSON body (`Null` when empty).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The server's human-readable `message` field, if present.
    pub fn message(&self) -> Option<String> {
        self.body.get("message").and_then(Value::as_str).map(str::to_owned)
    }
}

/// Failure to obtain any response at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout,
    Connect(String),
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("request timed out"),
            Self::Connect(detail) => write!(f, "connection failed: {detail}"),
            Self::Other(detail) => f.write_str(detail),
        }
    }
}

impl std::error::Error for TransportError {}

/// Sends API requests to the backend.
///
/// Object-safe for use as `Arc<dyn Transport>`, so tests can substitute a
/// scripted backend.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        req: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + Send + '_>>;
}
