// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh coordinator: single-flight credential refresh, proactive renewal
//! timer, and re-validation when the app regains focus.
//!
//! At most one `auth/refresh-token` call is outstanding at a time. Callers
//! that ask for a refresh while one is running subscribe to the running
//! operation and receive its outcome. Every teardown bumps an epoch; a refresh
//! that completes under a stale epoch is discarded instead of resurrecting a
//! cleared session.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::credential::inspect;
use crate::credential::store::TokenStore;
use crate::credential::wire::RefreshResponse;
use crate::credential::{
    Clock, Session, User, FOCUS_WINDOW_MINS, PROACTIVE_WINDOW_MINS, RENEWAL_FLOOR_SECS,
    RENEWAL_FRACTION,
};
use crate::error::AuthError;
use crate::events::{CredentialEvent, Navigator, SessionNotice};
use crate::transport::{ApiRequest, Transport, REFRESH_PATH};

/// Credentials produced by a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

pub type RefreshOutcome = Result<RefreshedTokens, AuthError>;

/// Decision taken by [`RefreshCoordinator::on_visibility_regain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusCheck {
    /// No session is stored.
    SignedOut,
    /// The refresh credential had expired; the session was torn down.
    SessionExpired,
    /// A background refresh was started.
    Refreshing,
    /// Credentials are fresh enough; nothing to do.
    Fresh,
}

/// Collaborators the coordinator is built from.
pub struct CoordinatorParts {
    pub transport: Arc<dyn Transport>,
    pub store: Arc<dyn TokenStore>,
    pub clock: Arc<dyn Clock>,
    pub navigator: Arc<dyn Navigator>,
    pub events: broadcast::Sender<CredentialEvent>,
    /// Upper bound on a single refresh call.
    pub refresh_timeout: Duration,
}

/// The armed renewal timer.
struct ScheduledRenewal {
    id: u64,
    delay: Duration,
    cancel: CancellationToken,
}

#[derive(Default)]
struct RefreshState {
    /// Present while a refresh is running; subscribe to join it.
    inflight: Option<broadcast::Sender<RefreshOutcome>>,
    epoch: u64,
    renewal: Option<ScheduledRenewal>,
    next_timer_id: u64,
}

impl RefreshState {
    /// Drop the in-flight refresh and timer, invalidating anything still running.
    fn reset(&mut self) {
        if let Some(renewal) = self.renewal.take() {
            renewal.cancel.cancel();
        }
        self.inflight = None;
        self.epoch += 1;
    }
}

/// Delay before the next proactive renewal: 75% of the refresh credential's
/// remaining lifetime, never less than 60 seconds.
pub fn renewal_delay(refresh_expiry: i64, now: u64) -> Duration {
    let remaining = refresh_expiry.saturating_sub(now as i64) as f64;
    Duration::from_secs_f64((remaining * RENEWAL_FRACTION).max(RENEWAL_FLOOR_SECS as f64))
}

pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    navigator: Arc<dyn Navigator>,
    events: broadcast::Sender<CredentialEvent>,
    refresh_timeout: Duration,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(parts: CoordinatorParts) -> Arc<Self> {
        Arc::new(Self {
            transport: parts.transport,
            store: parts.store,
            clock: parts.clock,
            navigator: parts.navigator,
            events: parts.events,
            refresh_timeout: parts.refresh_timeout,
            state: Mutex::new(RefreshState::default()),
        })
    }

    pub fn session(&self) -> Option<Session> {
        self.store.read()
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn now_secs(&self) -> u64 {
        self.clock.now_secs()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: CredentialEvent) {
        let _ = self.events.send(event);
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.lock().inflight.is_some()
    }

    /// Delay of the currently armed renewal timer.
    pub fn next_renewal(&self) -> Option<Duration> {
        self.state.lock().renewal.as_ref().map(|r| r.delay)
    }

    /// Refresh the credentials, joining a refresh that is already running.
    pub async fn refresh(self: &Arc<Self>) -> RefreshOutcome {
        let mut rx = {
            let mut state = self.state.lock();
            let joined = state.inflight.as_ref().map(broadcast::Sender::subscribe);
            match joined {
                Some(rx) => {
                    tracing::debug!("joining in-flight refresh");
                    rx
                }
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    state.inflight = Some(tx.clone());
                    let epoch = state.epoch;
                    let this = Arc::clone(self);
                    tokio::spawn(async move {
                        let outcome = this.perform_refresh(epoch).await;
                        {
                            let mut state = this.state.lock();
                            if state.epoch == epoch {
                                state.inflight = None;
                            }
                        }
                        let _ = tx.send(outcome);
                    });
                    rx
                }
            }
        };
        // A closed channel means the refresh task died without an outcome.
        rx.recv().await.unwrap_or(Err(AuthError::NoRefreshToken))
    }

    async fn perform_refresh(self: &Arc<Self>, epoch: u64) -> RefreshOutcome {
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(err = %e, "session store unreadable, keeping session");
                let detail = format!("session store unreadable: {e:#}");
                return Err(AuthError::RefreshTransport(detail));
            }
        };
        let now = self.clock.now_secs();
        let refresh_token = stored
            .map(|s| s.refresh_token)
            .filter(|token| !inspect::is_expired(Some(token), now));
        let Some(refresh_token) = refresh_token else {
            tracing::warn!("no usable refresh token, ending session");
            self.terminate_session(Some(epoch), &AuthError::NoRefreshToken);
            return Err(AuthError::NoRefreshToken);
        };

        match self.call_refresh_endpoint(&refresh_token).await {
            Ok(resp) => self.apply_refresh(epoch, resp),
            Err(e) if e.is_fatal() => {
                tracing::warn!(err = %e, "refresh rejected, ending session");
                self.terminate_session(Some(epoch), &e);
                Err(e)
            }
            Err(e) => {
                tracing::warn!(err = %e, "refresh failed, keeping session");
                Err(e)
            }
        }
    }

    async fn call_refresh_endpoint(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshResponse, AuthError> {
        let req =
            ApiRequest::post(REFRESH_PATH, serde_json::json!({ "refreshToken": refresh_token }));
        let resp = match tokio::time::timeout(self.refresh_timeout, self.transport.send(req)).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(AuthError::RefreshTransport(e.to_string())),
            Err(_) => {
                return Err(AuthError::RefreshTransport(format!(
                    "timed out after {}ms",
                    self.refresh_timeout.as_millis()
                )))
            }
        };

        match resp.status {
            401 | 403 => Err(AuthError::RefreshRejected { status: resp.status }),
            _ if !resp.is_success() => {
                let detail = resp.message().unwrap_or_default();
                Err(AuthError::RefreshTransport(format!("status {}: {detail}", resp.status)))
            }
            _ => {
                let body: RefreshResponse = serde_json::from_value(resp.body).map_err(|e| {
                    AuthError::RefreshTransport(format!("malformed refresh response: {e}"))
                })?;
                if body.access_token.is_empty() {
                    return Err(AuthError::RefreshTransport(
                        "refresh response has no accessToken".to_owned(),
                    ));
                }
                Ok(body)
            }
        }
    }

    /// Persist a successful refresh unless the session was torn down meanwhile.
    fn apply_refresh(self: &Arc<Self>, epoch: u64, resp: RefreshResponse) -> RefreshOutcome {
        let tokens = {
            let state = self.state.lock();
            if state.epoch != epoch {
                tracing::debug!("discarding refresh result for a cleared session");
                return Err(AuthError::NoRefreshToken);
            }
            // Rotation is optional: keep the old refresh token when none is issued.
            let rotated = resp.refresh_token.as_deref().filter(|t| !t.is_empty());
            let updated =
                self.store.update_credentials(&resp.access_token, rotated, resp.user.as_ref());
            match updated {
                Ok(Some(session)) => RefreshedTokens {
                    access_token: session.access_token,
                    refresh_token: session.refresh_token,
                },
                Ok(None) => {
                    tracing::debug!("discarding refresh result for a cleared session");
                    return Err(AuthError::NoRefreshToken);
                }
                Err(e) => {
                    tracing::warn!(err = %e, "failed to persist refreshed session");
                    return Err(AuthError::RefreshTransport(format!(
                        "failed to persist refreshed session: {e:#}"
                    )));
                }
            }
        };

        let expires_at = inspect::expiry_time(Some(&tokens.access_token));
        tracing::info!(expires_at, "credentials refreshed");
        self.emit(CredentialEvent::Refreshed { expires_at });
        self.schedule_proactive_renewal();
        Ok(tokens)
    }

    /// Arm the renewal timer from the stored refresh credential, replacing any
    /// armed timer. Returns the delay, or `None` when no session is stored.
    pub fn schedule_proactive_renewal(self: &Arc<Self>) -> Option<Duration> {
        let refresh_token = self.store.refresh_token()?;
        let delay =
            renewal_delay(inspect::expiry_time(Some(&refresh_token)), self.clock.now_secs());
        let cancel = CancellationToken::new();
        let id = {
            let mut state = self.state.lock();
            if let Some(prev) = state.renewal.take() {
                prev.cancel.cancel();
            }
            state.next_timer_id += 1;
            let id = state.next_timer_id;
            state.renewal = Some(ScheduledRenewal { id, delay, cancel: cancel.clone() });
            id
        };
        tracing::info!(delay_secs = delay.as_secs(), "next credential renewal scheduled");

        let coordinator = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(coordinator) = coordinator.upgrade() {
                        coordinator.on_renewal_timer(id).await;
                    }
                }
            }
        });
        Some(delay)
    }

    async fn on_renewal_timer(self: &Arc<Self>, id: u64) {
        let epoch = {
            let mut state = self.state.lock();
            // Superseded by a newer timer.
            if state.renewal.as_ref().map(|r| r.id) != Some(id) {
                return;
            }
            state.renewal = None;
            state.epoch
        };

        let refresh_token = match self.store.load() {
            Ok(stored) => stored.map(|s| s.refresh_token),
            Err(e) => {
                tracing::warn!(err = %e, "session store unreadable, renewal skipped");
                return;
            }
        };
        let now = self.clock.now_secs();
        if inspect::is_expired(refresh_token.as_deref(), now) {
            tracing::warn!("refresh token expired before renewal");
            self.terminate_session(Some(epoch), &AuthError::NoRefreshToken);
            return;
        }

        if inspect::is_expiring_soon(refresh_token.as_deref(), PROACTIVE_WINDOW_MINS, now) {
            tracing::info!("refresh token expiring soon, renewing");
            // Success re-arms the timer itself.
            if self.refresh().await.is_ok() {
                return;
            }
        } else {
            tracing::debug!("renewal timer fired early");
        }
        // Fired early or failed transiently. A fatal failure has already
        // cleared the session, in which case nothing is armed.
        self.schedule_proactive_renewal();
    }

    /// Re-validate credentials after the app becomes visible again.
    pub fn on_visibility_regain(self: &Arc<Self>) -> FocusCheck {
        let Some(session) = self.store.read() else {
            return FocusCheck::SignedOut;
        };
        let now = self.clock.now_secs();

        if inspect::is_expired(Some(&session.refresh_token), now) {
            tracing::info!("refresh token expired while away");
            self.terminate_session(None, &AuthError::NoRefreshToken);
            return FocusCheck::SessionExpired;
        }

        if inspect::is_expiring_soon(Some(&session.access_token), FOCUS_WINDOW_MINS, now) {
            tracing::debug!("refreshing credentials on focus");
            let this = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = this.refresh().await {
                    tracing::warn!(err = %e, "focus refresh failed");
                }
            });
            return FocusCheck::Refreshing;
        }
        FocusCheck::Fresh
    }

    /// Resume a session restored from the store at process start.
    pub fn start(self: &Arc<Self>) -> Option<Duration> {
        let delay = self.schedule_proactive_renewal();
        if delay.is_none() {
            tracing::debug!("no stored session to resume");
        }
        delay
    }

    /// Install a freshly established session and arm renewal.
    pub fn establish(self: &Arc<Self>, session: &Session) -> anyhow::Result<()> {
        {
            let mut state = self.state.lock();
            state.reset();
            self.store.write(session)?;
        }
        self.emit(CredentialEvent::SignedIn { user_id: session.user.id.clone() });
        self.schedule_proactive_renewal();
        Ok(())
    }

    /// Voluntary sign-out: tear down and clear the store without the
    /// session-expired side effects.
    pub fn end_session(&self) {
        {
            let mut state = self.state.lock();
            state.reset();
            if let Err(e) = self.store.clear() {
                tracing::warn!(err = %e, "failed to clear session");
            }
        }
        self.emit(CredentialEvent::SignedOut);
    }

    /// Replace the stored user record, serialized with refresh results.
    pub fn update_user(&self, user: &User) -> anyhow::Result<()> {
        {
            let _state = self.state.lock();
            self.store.write_user(user)?;
        }
        self.emit(CredentialEvent::UserUpdated { user_id: user.id.clone() });
        Ok(())
    }

    /// Cancel the renewal timer and forget the in-flight refresh.
    pub fn destroy(&self) {
        self.state.lock().reset();
    }

    /// Tear the session down after an unrecoverable failure.
    ///
    /// With `Some(epoch)`, does nothing if the session has been replaced since.
    /// The navigator fires once per live session; a store that was already
    /// empty produces no notice.
    fn terminate_session(&self, epoch: Option<u64>, reason: &AuthError) {
        let had_session = {
            let mut state = self.state.lock();
            if epoch.is_some_and(|e| e != state.epoch) {
                return;
            }
            state.reset();
            let had_session = self.store.read().is_some();
            if let Err(e) = self.store.clear() {
                tracing::warn!(err = %e, "failed to clear session");
            }
            had_session
        };
        if !had_session {
            tracing::debug!(reason = %reason, "session already cleared");
            return;
        }

        let notice = SessionNotice::expired(self.navigator.current_path());
        tracing::info!(reason = %reason, "session expired");
        self.emit(CredentialEvent::SessionExpired { return_to: notice.return_to.clone() });
        self.navigator.session_expired(&notice);
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
