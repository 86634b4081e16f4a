// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use super::{resolve_state_dir, ClientConfig};

#[derive(Parser)]
struct Harness {
    #[command(flatten)]
    config: ClientConfig,
}

fn parse(args: &[&str]) -> ClientConfig {
    Harness::parse_from(args).config
}

#[test]
fn defaults_are_correct() -> anyhow::Result<()> {
    let config = parse(&["pixgram"]);
    config.validate()?;
    assert_eq!(config.api_url, "http://localhost:3000/api/");
    assert_eq!(config.refresh_timeout(), Duration::from_secs(10));
    assert_eq!(config.request_timeout(), Duration::from_secs(30));
    assert_eq!(config.log_level, "info");
    assert_eq!(config.log_format, "text");
    Ok(())
}

#[test]
fn explicit_values_override_defaults() -> anyhow::Result<()> {
    let config = parse(&[
        "pixgram",
        "--api-url",
        "https://pixgram.example/api/",
        "--state-dir",
        "/tmp/px",
        "--refresh-timeout-ms",
        "2500",
        "--log-format",
        "json",
    ]);
    config.validate()?;
    assert_eq!(config.api_url, "https://pixgram.example/api/");
    assert_eq!(config.state_dir(), PathBuf::from("/tmp/px"));
    assert_eq!(config.refresh_timeout(), Duration::from_millis(2500));
    assert_eq!(config.log_format, "json");
    Ok(())
}

#[yare::parameterized(
    bad_scheme     = { &["pixgram", "--api-url", "ftp://host/api"], "http:// or https://" },
    bare_host      = { &["pixgram", "--api-url", "localhost:3000"], "http:// or https://" },
    zero_refresh   = { &["pixgram", "--refresh-timeout-ms", "0"], "greater than zero" },
    zero_request   = { &["pixgram", "--request-timeout-ms", "0"], "greater than zero" },
    bad_log_format = { &["pixgram", "--log-format", "xml"], "invalid --log-format" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let err = parse(args).validate().err().map(|e| e.to_string()).unwrap_or_default();
    assert!(err.contains(expected_substr), "expected {expected_substr:?}, got {err:?}");
}

#[yare::parameterized(
    explicit_wins = { Some("/srv/px"), Some("/xdg"), Some("/home/jane"), "/srv/px" },
    xdg           = { None, Some("/xdg"), Some("/home/jane"), "/xdg/pixgram" },
    empty_xdg     = { None, Some(""), Some("/home/jane"), "/home/jane/.local/state/pixgram" },
    home          = { None, None, Some("/home/jane"), "/home/jane/.local/state/pixgram" },
    nothing       = { None, None, None, ".pixgram" },
)]
fn state_dir_resolution(
    explicit: Option<&str>,
    xdg: Option<&str>,
    home: Option<&str>,
    expected: &str,
) {
    let resolved =
        resolve_state_dir(explicit.map(Path::new), xdg.map(OsString::from), home.map(OsString::from));
    assert_eq!(resolved, PathBuf::from(expected));
}
