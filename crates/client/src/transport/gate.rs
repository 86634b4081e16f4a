// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential gates wrapped around every API call.
//!
//! [`RequestGate`] runs before a request is sent and makes sure a usable
//! access credential is attached. [`ResponseGate`] runs after a 401 and
//! performs one coordinated refresh-and-replay, parking concurrent failures
//! in a FIFO queue behind it.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::credential::inspect;
use crate::credential::refresh::{RefreshCoordinator, RefreshOutcome};
use crate::credential::REQUEST_WINDOW_MINS;
use crate::error::{ApiError, AuthError};
use crate::transport::{ApiRequest, ApiResponse, Transport};

pub struct RequestGate {
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestGate {
    pub fn new(coordinator: Arc<RefreshCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Attach the access credential, refreshing it first when it is missing,
    /// expired, or about to expire. A failed refresh sends the request bare.
    pub async fn prepare(&self, mut req: ApiRequest) -> ApiRequest {
        if req.is_auth_endpoint() {
            return req;
        }

        let access = self.coordinator.store().access_token();
        let now = self.coordinator.now_secs();
        if !inspect::is_expiring_soon(access.as_deref(), REQUEST_WINDOW_MINS, now) {
            req.bearer = access;
            return req;
        }

        tracing::debug!(path = %req.path, "access token stale, refreshing before send");
        match self.coordinator.refresh().await {
            Ok(tokens) => req.bearer = Some(tokens.access_token),
            Err(e) => {
                tracing::debug!(path = %req.path, err = %e, "sending without credentials");
                req.bearer = None;
            }
        }
        req
    }
}

#[derive(Default)]
struct RetryQueue {
    /// A gate-led refresh is running.
    retrying: bool,
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

pub struct ResponseGate {
    coordinator: Arc<RefreshCoordinator>,
    transport: Arc<dyn Transport>,
    queue: Mutex<RetryQueue>,
}

impl ResponseGate {
    pub fn new(coordinator: Arc<RefreshCoordinator>, transport: Arc<dyn Transport>) -> Self {
        Self { coordinator, transport, queue: Mutex::new(RetryQueue::default()) }
    }

    /// Requests currently parked behind a gate-led refresh.
    pub fn pending_retries(&self) -> usize {
        self.queue.lock().waiters.len()
    }

    /// Handle the response to `req`.
    ///
    /// Anything other than a first 401 on a protected endpoint is returned
    /// unchanged. A first 401 refreshes (sharing the refresh with every
    /// concurrent 401) and replays the request once with the new credential.
    pub async fn recover(
        &self,
        req: ApiRequest,
        resp: ApiResponse,
    ) -> Result<ApiResponse, ApiError> {
        if resp.status != 401 || req.is_auth_endpoint() {
            return Ok(resp);
        }
        if req.retried {
            return Err(AuthError::RequestRetryExhausted.into());
        }

        let tokens = self.shared_refresh().await?;
        let mut replay = req;
        replay.retried = true;
        replay.bearer = Some(tokens.access_token);
        tracing::debug!(path = %replay.path, "replaying request with refreshed credentials");

        let resp = self.transport.send(replay).await?;
        if resp.status == 401 {
            return Err(AuthError::RequestRetryExhausted.into());
        }
        Ok(resp)
    }

    async fn shared_refresh(&self) -> RefreshOutcome {
        let waiter = {
            let mut queue = self.queue.lock();
            if queue.retrying {
                let (tx, rx) = oneshot::channel();
                queue.waiters.push_back(tx);
                Some(rx)
            } else {
                queue.retrying = true;
                None
            }
        };

        if let Some(rx) = waiter {
            tracing::debug!("queued behind in-progress refresh");
            return match rx.await {
                Ok(outcome) => outcome,
                // The initiating request was dropped mid-refresh.
                Err(_) => self.coordinator.refresh().await,
            };
        }

        let initiator = Initiator { queue: &self.queue, released: false };
        let outcome = self.coordinator.refresh().await;
        initiator.release(&outcome);
        outcome
    }
}

/// Held by the request that started a gate-led refresh.
///
/// Dropping it without [`Initiator::release`] (the request future was
/// cancelled) reopens the gate and closes every waiter's channel.
struct Initiator<'a> {
    queue: &'a Mutex<RetryQueue>,
    released: bool,
}

impl Initiator<'_> {
    /// Hand `outcome` to every waiter, oldest first.
    fn release(mut self, outcome: &RefreshOutcome) {
        let waiters = {
            let mut queue = self.queue.lock();
            queue.retrying = false;
            std::mem::take(&mut queue.waiters)
        };
        self.released = true;
        if !waiters.is_empty() {
            tracing::debug!(count = waiters.len(), ok = outcome.is_ok(), "releasing queued requests");
        }
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for Initiator<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let mut queue = self.queue.lock();
        queue.retrying = false;
        queue.waiters.clear();
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
