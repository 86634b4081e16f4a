// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the pixgram API client.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Base URL of the pixgram API.
    #[arg(long, default_value = "http://localhost:3000/api/", env = "PIXGRAM_API_URL")]
    pub api_url: String,

    /// Directory holding the persisted session.
    #[arg(long, env = "PIXGRAM_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Upper bound on a single credential refresh call, in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "PIXGRAM_REFRESH_TIMEOUT_MS")]
    pub refresh_timeout_ms: u64,

    /// Upper bound on any other API call, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "PIXGRAM_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "PIXGRAM_LOG")]
    pub log_level: String,

    /// Log format (text or json).
    #[arg(long, default_value = "text", env = "PIXGRAM_LOG_FORMAT")]
    pub log_format: String,
}

impl ClientConfig {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            anyhow::bail!("--api-url must be an http:// or https:// URL, got {:?}", self.api_url);
        }
        if self.refresh_timeout_ms == 0 || self.request_timeout_ms == 0 {
            anyhow::bail!("timeouts must be greater than zero");
        }
        match self.log_format.as_str() {
            "text" | "json" => Ok(()),
            other => anyhow::bail!("invalid --log-format: {other} (expected text or json)"),
        }
    }

    /// Where the session file lives: `--state-dir`, else the XDG state
    /// directory, else `./.pixgram`.
    pub fn state_dir(&self) -> PathBuf {
        resolve_state_dir(
            self.state_dir.as_deref(),
            std::env::var_os("XDG_STATE_HOME"),
            std::env::var_os("HOME"),
        )
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn resolve_state_dir(
    explicit: Option<&Path>,
    xdg_state_home: Option<OsString>,
    home: Option<OsString>,
) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Some(xdg) = xdg_state_home.filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg).join("pixgram");
    }
    if let Some(home) = home.filter(|v| !v.is_empty()) {
        return PathBuf::from(home).join(".local/state/pixgram");
    }
    PathBuf::from(".pixgram")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
