// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test fixtures: scripted backend, fake clock, recording navigator.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};

use crate::auth::AuthService;
use crate::client::ApiClient;
use crate::credential::refresh::{CoordinatorParts, RefreshCoordinator};
use crate::credential::store::{MemoryTokenStore, TokenStore};
use crate::credential::{Clock, Session, User};
use crate::events::{CredentialEvent, Navigator, SessionNotice};
use crate::transport::{
    ApiRequest, ApiResponse, Transport, TransportError, FORGOT_PASSWORD_PATH, LOGIN_PATH,
    LOGOUT_PATH, REFRESH_PATH, RESET_PASSWORD_PATH, SIGNUP_PATH,
};

/// Fixed "now" used across tests (2023-11-14T22:13:20Z).
pub const NOW: u64 = 1_700_000_000;

/// Lifetime of access tokens the fake backend issues.
pub const ISSUED_ACCESS_SECS: i64 = 900;
/// Lifetime of refresh tokens the fake backend issues.
pub const ISSUED_REFRESH_SECS: i64 = 7 * 86_400;

pub const PASSWORD: &str = "correct horse";

pub fn mint_token_with_claims(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

pub fn mint_token(exp: i64) -> String {
    mint_token_with_claims(&json!({ "sub": "u-1", "exp": exp }))
}

/// Token with a `jti` so tokens sharing an expiry stay distinguishable.
pub fn mint_tagged(exp: i64, tag: &str) -> String {
    mint_token_with_claims(&json!({ "sub": "u-1", "exp": exp, "jti": tag }))
}

pub fn sample_user() -> User {
    let mut user = User::new("u-1");
    user.username = Some("jane".to_owned());
    user.email = Some("jane@example.com".to_owned());
    user
}

pub fn sample_session(access: &str, refresh: &str) -> Session {
    Session {
        access_token: access.to_owned(),
        refresh_token: refresh.to_owned(),
        user: sample_user(),
    }
}

/// Clock whose time only moves when told to.
#[derive(Debug)]
pub struct FakeClock {
    now: AtomicU64,
}

impl FakeClock {
    pub fn new(now: u64) -> Arc<Self> {
        Arc::new(Self { now: AtomicU64::new(now) })
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct RecordingNavigator {
    pub path: Mutex<Option<String>>,
    pub notices: Mutex<Vec<SessionNotice>>,
}

impl RecordingNavigator {
    pub fn count(&self) -> usize {
        self.notices.lock().len()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> Option<String> {
        self.path.lock().clone()
    }

    fn session_expired(&self, notice: &SessionNotice) {
        self.notices.lock().push(notice.clone());
    }
}

/// How the fake backend answers `auth/refresh-token`.
#[derive(Debug, Clone)]
pub enum RefreshReply {
    /// Issue a new access token, optionally rotating the refresh token and
    /// returning an updated user.
    Issue { rotate: bool, user: Option<User> },
    Status(u16),
    Fail(TransportError),
    /// Never answer.
    Hang,
}

/// Scripted backend.
///
/// Protected routes accept exactly one access token at a time; a successful
/// refresh swaps in the newly issued one.
pub struct FakeBackend {
    clock: Arc<FakeClock>,
    requests: Mutex<Vec<ApiRequest>>,
    refresh_calls: AtomicUsize,
    issued: AtomicUsize,
    reply: Mutex<RefreshReply>,
    accepted: Mutex<Option<String>>,
    logout_status: AtomicU16,
    /// Protected routes reject every credential.
    revoked: AtomicBool,
    /// Refresh calls wait until this is `true`.
    refresh_open: watch::Sender<bool>,
}

impl FakeBackend {
    pub fn new(clock: Arc<FakeClock>) -> Arc<Self> {
        let (refresh_open, _) = watch::channel(true);
        Arc::new(Self {
            clock,
            requests: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
            issued: AtomicUsize::new(0),
            reply: Mutex::new(RefreshReply::Issue { rotate: true, user: None }),
            accepted: Mutex::new(None),
            logout_status: AtomicU16::new(200),
            revoked: AtomicBool::new(false),
            refresh_open,
        })
    }

    pub fn accept(&self, token: &str) {
        *self.accepted.lock() = Some(token.to_owned());
    }

    pub fn accepted(&self) -> Option<String> {
        self.accepted.lock().clone()
    }

    pub fn set_refresh_reply(&self, reply: RefreshReply) {
        *self.reply.lock() = reply;
    }

    pub fn set_logout_status(&self, status: u16) {
        self.logout_status.store(status, Ordering::SeqCst);
    }

    pub fn revoke_all(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    pub fn hold_refresh(&self) {
        self.refresh_open.send_replace(false);
    }

    pub fn release_refresh(&self) {
        self.refresh_open.send_replace(true);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests.lock().iter().filter(|r| r.path == path).cloned().collect()
    }

    fn issue_session(&self, user: &User) -> Value {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.clock.now_secs() as i64;
        let access = mint_tagged(now + ISSUED_ACCESS_SECS, &format!("access-{n}"));
        let refresh = mint_tagged(now + ISSUED_REFRESH_SECS, &format!("refresh-{n}"));
        self.accept(&access);
        json!({ "user": user, "accessToken": access, "refreshToken": refresh })
    }

    fn authorizes(&self, req: &ApiRequest) -> bool {
        let accepted = self.accepted.lock().clone();
        !self.revoked.load(Ordering::SeqCst) && req.bearer.is_some() && req.bearer == accepted
    }

    async fn handle(&self, req: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().push(req.clone());
        let body = req.body.clone().unwrap_or(Value::Null);
        match req.path.as_str() {
            REFRESH_PATH => self.handle_refresh().await,
            LOGIN_PATH => {
                if body["password"] == PASSWORD {
                    Ok(ApiResponse { status: 200, body: self.issue_session(&sample_user()) })
                } else {
                    Ok(reply(401, json!({ "message": "Invalid credentials" })))
                }
            }
            SIGNUP_PATH => {
                let mut user = User::new("u-new");
                user.username = body["username"].as_str().map(str::to_owned);
                user.email = body["email"].as_str().map(str::to_owned);
                if body["username"] == "incomplete" {
                    return Ok(reply(201, json!({ "user": user })));
                }
                Ok(ApiResponse { status: 201, body: self.issue_session(&user) })
            }
            LOGOUT_PATH => {
                if !self.authorizes(&req) {
                    return Ok(reply(401, json!({ "message": "jwt expired" })));
                }
                let status = self.logout_status.load(Ordering::SeqCst);
                Ok(reply(status, json!({ "message": "Logged out" })))
            }
            FORGOT_PASSWORD_PATH => Ok(reply(200, json!({ "message": "Reset link sent" }))),
            RESET_PASSWORD_PATH => Ok(reply(200, json!({ "message": "Password updated" }))),
            path => {
                if self.authorizes(&req) {
                    // `status/<code>` answers with that status.
                    if let Some(code) = path.strip_prefix("status/").and_then(|c| c.parse().ok()) {
                        return Ok(reply(code, json!({ "message": format!("status {code}") })));
                    }
                    Ok(reply(200, json!({ "ok": true, "path": path, "body": body })))
                } else {
                    Ok(reply(401, json!({ "message": "jwt expired" })))
                }
            }
        }
    }

    async fn handle_refresh(&self) -> Result<ApiResponse, TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let mut open = self.refresh_open.subscribe();
        let _ = open.wait_for(|open| *open).await;

        let scripted = self.reply.lock().clone();
        match scripted {
            RefreshReply::Issue { rotate, user } => {
                let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                let now = self.clock.now_secs() as i64;
                let access = mint_tagged(now + ISSUED_ACCESS_SECS, &format!("access-{n}"));
                self.accept(&access);
                let mut body = json!({ "accessToken": access });
                if rotate {
                    body["refreshToken"] =
                        json!(mint_tagged(now + ISSUED_REFRESH_SECS, &format!("refresh-{n}")));
                }
                if let Some(user) = user {
                    body["user"] = json!(user);
                }
                Ok(reply(200, body))
            }
            RefreshReply::Status(status) => Ok(reply(status, json!({ "message": "refresh denied" }))),
            RefreshReply::Fail(e) => Err(e),
            RefreshReply::Hang => std::future::pending().await,
        }
    }
}

fn reply(status: u16, body: Value) -> ApiResponse {
    ApiResponse { status, body }
}

impl Transport for FakeBackend {
    fn send(
        &self,
        req: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + Send + '_>> {
        Box::pin(self.handle(req))
    }
}

/// Coordinator wired to fakes.
pub struct Harness {
    pub clock: Arc<FakeClock>,
    pub backend: Arc<FakeBackend>,
    pub store: Arc<MemoryTokenStore>,
    pub navigator: Arc<RecordingNavigator>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub events: broadcast::Receiver<CredentialEvent>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = FakeClock::new(NOW);
        let backend = FakeBackend::new(Arc::clone(&clock));
        let store = Arc::new(MemoryTokenStore::default());
        let navigator = Arc::new(RecordingNavigator::default());
        let (events_tx, events) = broadcast::channel(64);
        let coordinator = RefreshCoordinator::new(CoordinatorParts {
            transport: Arc::clone(&backend) as Arc<dyn Transport>,
            store: Arc::clone(&store) as Arc<dyn TokenStore>,
            clock: Arc::clone(&clock) as Arc<dyn Clock>,
            navigator: Arc::clone(&navigator) as Arc<dyn Navigator>,
            events: events_tx,
            refresh_timeout: Duration::from_secs(10),
        });
        Self { clock, backend, store, navigator, coordinator, events }
    }

    /// A second coordinator sharing this harness's fakes but backed by `store`.
    pub fn coordinator_over(&self, store: Arc<dyn TokenStore>) -> Arc<RefreshCoordinator> {
        let (events, _) = broadcast::channel(64);
        RefreshCoordinator::new(CoordinatorParts {
            transport: Arc::clone(&self.backend) as Arc<dyn Transport>,
            store,
            clock: Arc::clone(&self.clock) as Arc<dyn Clock>,
            navigator: Arc::clone(&self.navigator) as Arc<dyn Navigator>,
            events,
            refresh_timeout: Duration::from_secs(10),
        })
    }

    /// Harness with a stored session whose credentials expire at the given
    /// offsets from [`NOW`]. The backend accepts the stored access token.
    pub fn with_session(access_in: i64, refresh_in: i64) -> Self {
        let harness = Self::new();
        let session = sample_session(
            &mint_tagged(NOW as i64 + access_in, "access-0"),
            &mint_tagged(NOW as i64 + refresh_in, "refresh-0"),
        );
        harness.backend.accept(&session.access_token);
        let _ = harness.store.write(&session);
        harness
    }

    pub fn client(&self) -> ApiClient {
        ApiClient::new(
            Arc::clone(&self.backend) as Arc<dyn Transport>,
            Arc::clone(&self.coordinator),
        )
    }

    pub fn auth(&self) -> AuthService {
        AuthService::new(Arc::new(self.client()))
    }

    pub fn stored(&self) -> Option<Session> {
        self.store.read()
    }

    /// Events received so far.
    pub fn drain_events(&mut self) -> Vec<CredentialEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

/// Poll `cond` until it holds or a few seconds pass.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("condition not reached in time"))
}
