#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tower::ServiceExt;

use marquee::config::Config;
use marquee::identity::{CredentialStore, Fingerprint, PermissionStore, Permissions, TokenScope, UserIdentity};
use marquee::mailer::{Mailer, Template};
use marquee::server::{routes, AppState};
use marquee::storage::{SharedStore, StoreError, User};

pub fn peer(last: u8) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, last)), 40_000 + last as u16)
}

pub fn config(limiter_enabled: bool) -> Config {
    let mut cfg = Config::default();
    cfg.limiter.enabled = limiter_enabled;
    cfg.trusted_origins = vec!["https://trusted.example".to_string()];
    cfg
}

pub fn app(cfg: Config) -> (Router, AppState, Arc<RecordingMailer>) {
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::new(cfg, SharedStore::new(), mailer.clone());
    (routes(state.clone()), state, mailer)
}

pub struct TestRequest {
    method: Method,
    uri: String,
    peer: Option<SocketAddr>,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

pub fn request(method: Method, uri: &str) -> TestRequest {
    TestRequest { method, uri: uri.to_string(), peer: Some(peer(1)), headers: Vec::new(), body: None }
}

impl TestRequest {
    pub fn from_peer(mut self, addr: SocketAddr) -> Self { self.peer = Some(addr); self }
    pub fn without_peer(mut self) -> Self { self.peer = None; self }
    pub fn bearer(self, token: &str) -> Self { self.header("authorization", &format!("Bearer {}", token)) }
    pub fn header(mut self, name: &str, value: &str) -> Self { self.headers.push((name.to_string(), value.to_string())); self }
    pub fn json(mut self, body: Value) -> Self { self.body = Some(body.to_string()); self }
    pub fn raw_body(mut self, body: &str) -> Self { self.body = Some(body.to_string()); self }

    pub fn build(self) -> Request<Body> {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        for (k, v) in &self.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        if self.body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let mut req = builder.body(self.body.map(Body::from).unwrap_or_else(Body::empty)).unwrap();
        if let Some(addr) = self.peer {
            req.extensions_mut().insert(ConnectInfo(addr));
        }
        req
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

impl TestResponse {
    pub fn error_message(&self) -> &str { self.body["error"].as_str().unwrap_or_default() }

    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.headers.get_all(name).iter().filter_map(|v| v.to_str().ok()).map(str::to_string).collect()
    }
}

pub async fn send(router: &Router, req: TestRequest) -> TestResponse {
    let response = router.clone().oneshot(req.build()).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let is_json = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).is_some_and(|v| v.starts_with("application/json"));
    let body = if bytes.is_empty() || !is_json { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    TestResponse { status, headers, body, text }
}

/// Inserts a user directly, optionally activated and with permissions, and returns
/// the user with a fresh authentication token plaintext.
pub fn seed_user(store: &SharedStore, email: &str, activated: bool, permissions: &[&str]) -> (User, String) {
    let mut user = User::new("Test User", email);
    user.activated = activated;
    store.insert_user(&mut user).unwrap();
    store.add_permissions_for_user(user.id, permissions).unwrap();
    let token = store.new_token(user.id, Duration::hours(24), TokenScope::Authentication).unwrap();
    (user, token.plaintext)
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, Value)>>,
    pub failures_left: AtomicUsize,
    pub attempts: AtomicUsize,
}

impl RecordingMailer {
    pub fn failing(times: usize) -> Self {
        Self { failures_left: AtomicUsize::new(times), ..Self::default() }
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, recipient: &str, template: Template, data: &Value) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            anyhow::bail!("smtp unavailable");
        }
        assert_eq!(template, Template::UserWelcome);
        self.sent.lock().push((recipient.to_string(), data.clone()));
        Ok(())
    }
}

/// Credential store wrapper that counts lookups and can be switched to fail.
pub struct CountingCredentials {
    pub inner: SharedStore,
    pub lookups: AtomicUsize,
    pub broken: bool,
}

impl CountingCredentials {
    pub fn new(inner: SharedStore, broken: bool) -> Self { Self { inner, lookups: AtomicUsize::new(0), broken } }
    pub fn lookups(&self) -> usize { self.lookups.load(Ordering::SeqCst) }
}

impl CredentialStore for CountingCredentials {
    fn resolve(&self, scope: TokenScope, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Result<UserIdentity, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(StoreError::Unavailable("credential database unreachable".into()));
        }
        self.inner.resolve(scope, fingerprint, now)
    }
}

pub struct CountingPermissions {
    pub inner: SharedStore,
    pub lookups: AtomicUsize,
}

impl CountingPermissions {
    pub fn new(inner: SharedStore) -> Self { Self { inner, lookups: AtomicUsize::new(0) } }
    pub fn lookups(&self) -> usize { self.lookups.load(Ordering::SeqCst) }
}

impl PermissionStore for CountingPermissions {
    fn permissions_of(&self, user_id: i64) -> Result<Permissions, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.permissions_of(user_id)
    }
}
