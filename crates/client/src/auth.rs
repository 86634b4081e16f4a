// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-facing operations: login, signup, logout and the account flows
//! that precede a session.

use std::sync::Arc;

use serde_json::json;

use crate::client::ApiClient;
use crate::credential::inspect;
use crate::credential::refresh::{FocusCheck, RefreshCoordinator};
use crate::credential::wire::{AuthResponse, SignupForm};
use crate::credential::User;
use crate::error::ApiError;
use crate::transport::{
    ApiRequest, ApiResponse, Method, FORGOT_PASSWORD_PATH, LOGIN_PATH, LOGOUT_PATH,
    RESET_PASSWORD_PATH, SIGNUP_PATH,
};

pub struct AuthService {
    client: Arc<ApiClient>,
}

impl AuthService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        self.client.coordinator()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let req = ApiRequest::post(LOGIN_PATH, json!({ "email": email, "password": password }));
        let resp = self.client.send(req).await?;
        self.establish(resp)
    }

    pub async fn signup(&self, form: &SignupForm) -> Result<User, ApiError> {
        let body = serde_json::to_value(form).map_err(|e| ApiError::Decode(e.to_string()))?;
        let resp = self.client.send(ApiRequest::post(SIGNUP_PATH, body)).await?;
        self.establish(resp)
    }

    fn establish(&self, resp: ApiResponse) -> Result<User, ApiError> {
        let body: AuthResponse =
            serde_json::from_value(resp.body).map_err(|e| ApiError::Decode(e.to_string()))?;
        let session = body.into_session().ok_or(ApiError::IncompleteSession)?;
        self.coordinator()
            .establish(&session)
            .map_err(|e| ApiError::Storage(format!("{e:#}")))?;
        tracing::info!(user_id = %session.user.id, "signed in");
        Ok(session.user)
    }

    /// Sign out. The server is told on a best-effort basis; the local session
    /// is cleared and renewal stopped whatever it answers. A server failure
    /// is still returned after the cleanup.
    ///
    /// A stale access credential is renewed before the server call, so the
    /// rotated refresh credential is the one revoked.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = if self.coordinator().session().is_some() {
            let req = ApiRequest::new(Method::Post, LOGOUT_PATH);
            let req = self.client.request_gate().prepare(req).await;
            match self.coordinator().store().refresh_token() {
                Some(refresh_token) => {
                    let req = req.with_body(json!({ "refreshToken": refresh_token }));
                    self.client.send_prepared(req).await.map(drop)
                }
                // The pre-flight refresh was rejected and already ended the session.
                None => Ok(()),
            }
        } else {
            tracing::warn!("no tokens found for logout");
            Ok(())
        };

        self.coordinator().end_session();
        match &result {
            Ok(()) => tracing::info!("signed out"),
            Err(e) => tracing::warn!(err = %e, "server logout failed, signed out locally"),
        }
        result
    }

    /// Restore a stored session at startup. Returns whether one is usable.
    ///
    /// Must run inside a tokio runtime: a stale access credential is renewed
    /// in the background and the renewal timer is armed.
    pub fn initialize(&self) -> bool {
        match self.coordinator().on_visibility_regain() {
            FocusCheck::SignedOut | FocusCheck::SessionExpired => false,
            FocusCheck::Refreshing | FocusCheck::Fresh => {
                self.coordinator().start();
                true
            }
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.coordinator().store().user()
    }

    /// A session is stored and its refresh credential has not expired.
    pub fn is_authenticated(&self) -> bool {
        let now = self.coordinator().now_secs();
        self.coordinator()
            .session()
            .is_some_and(|s| !inspect::is_expired(Some(&s.refresh_token), now))
    }

    /// Replace the stored user record (after a profile edit).
    pub fn update_user(&self, user: &User) -> Result<(), ApiError> {
        self.coordinator().update_user(user).map_err(|e| ApiError::Storage(format!("{e:#}")))
    }

    /// Request a password reset email. Returns the server's message.
    pub async fn forgot_password(&self, email: &str) -> Result<String, ApiError> {
        let req = ApiRequest::post(FORGOT_PASSWORD_PATH, json!({ "email": email }));
        Ok(self.client.send(req).await?.message().unwrap_or_default())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<String, ApiError> {
        let req = ApiRequest::post(
            RESET_PASSWORD_PATH,
            json!({ "token": token, "newPassword": new_password }),
        );
        Ok(self.client.send(req).await?.message().unwrap_or_default())
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
