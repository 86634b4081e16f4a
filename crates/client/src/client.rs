// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The configured API client every feature call goes through.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::ClientConfig;
use crate::credential::refresh::{CoordinatorParts, RefreshCoordinator};
use crate::credential::store::FileTokenStore;
use crate::credential::SystemClock;
use crate::error::ApiError;
use crate::events::Navigator;
use crate::transport::gate::{RequestGate, ResponseGate};
use crate::transport::http::HttpTransport;
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};

/// Capacity of the credential event channel.
const EVENT_CAPACITY: usize = 64;

/// Sends requests through the request gate, the transport and, on 401, the
/// response gate.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    coordinator: Arc<RefreshCoordinator>,
    request_gate: RequestGate,
    response_gate: ResponseGate,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            request_gate: RequestGate::new(Arc::clone(&coordinator)),
            response_gate: ResponseGate::new(Arc::clone(&coordinator), Arc::clone(&transport)),
            transport,
            coordinator,
        }
    }

    /// Production wiring: reqwest transport, session file under the state
    /// directory, wall clock.
    pub fn from_config(config: &ClientConfig, navigator: Arc<dyn Navigator>) -> Self {
        let transport: Arc<dyn Transport> =
            Arc::new(HttpTransport::new(&config.api_url, config.request_timeout()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state_dir = config.state_dir();
        tracing::debug!(api_url = %config.api_url, state_dir = %state_dir.display(), "client configured");
        let coordinator = RefreshCoordinator::new(CoordinatorParts {
            transport: Arc::clone(&transport),
            store: Arc::new(FileTokenStore::new(&state_dir)),
            clock: Arc::new(SystemClock),
            navigator,
            events,
            refresh_timeout: config.refresh_timeout(),
        });
        Self::new(transport, coordinator)
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub(crate) fn request_gate(&self) -> &RequestGate {
        &self.request_gate
    }

    pub fn pending_retries(&self) -> usize {
        self.response_gate.pending_retries()
    }

    /// Send `req`. Non-2xx responses become [`ApiError::Status`].
    pub async fn send(&self, req: ApiRequest) -> Result<ApiResponse, ApiError> {
        let req = self.request_gate.prepare(req).await;
        self.send_prepared(req).await
    }

    /// Send a request that has already been through the request gate.
    pub(crate) async fn send_prepared(&self, req: ApiRequest) -> Result<ApiResponse, ApiError> {
        let resp = self.transport.send(req.clone()).await?;
        let resp = self.response_gate.recover(req, resp).await?;
        if resp.is_success() {
            Ok(resp)
        } else {
            tracing::debug!(status = resp.status, "request failed");
            Err(ApiError::from_response(&resp))
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call_json(ApiRequest::get(path)).await
    }

    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call_json(ApiRequest::new(Method::Post, path).with_body(encode(body)?)).await
    }

    pub async fn put_json<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call_json(ApiRequest::new(Method::Put, path).with_body(encode(body)?)).await
    }

    pub async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call_json(ApiRequest::delete(path)).await
    }

    async fn call_json<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ApiError> {
        let resp = self.send(req).await?;
        serde_json::from_value(resp.body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
