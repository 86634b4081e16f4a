// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! pixgram: session client for the pixgram photo-sharing API.
//!
//! Keeps a short-lived access credential and a longer-lived refresh credential
//! valid across concurrent requests, background renewal, focus changes and
//! server rejections. Every API call goes through [`client::ApiClient`], which
//! wraps the transport in the request and response gates; the
//! [`credential::refresh::RefreshCoordinator`] guarantees a single refresh call
//! in flight at any time.

pub mod auth;
pub mod client;
pub mod command;
pub mod config;
pub mod credential;
pub mod error;
pub mod events;
pub mod transport;

#[cfg(test)]
mod test_support;
