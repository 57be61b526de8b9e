//! Per-client rate limiting.
//!
//! Every client address gets its own token bucket, created lazily on the first
//! request and stamped with a last-seen time on every request. A background
//! sweeper owned by the registry drops buckets that have been idle longer than
//! the configured threshold, so memory stays bounded under traffic from many
//! distinct clients.
//!
//! The whole registry sits behind one mutex: bucket creation, token consumption,
//! last-seen updates and sweep deletion are all serialized through it.

use std::collections::HashMap;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::{Arc, Weak};
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::tprintln;

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// When false, every request is admitted and no buckets are tracked.
    #[serde(default = "RateLimitConfig::default_enabled")]
    pub enabled: bool,
    /// Steady refill rate in requests per second.
    #[serde(default = "RateLimitConfig::default_rps")]
    pub rps: f64,
    /// Bucket capacity.
    #[serde(default = "RateLimitConfig::default_burst")]
    pub burst: u32,
    #[serde(default = "RateLimitConfig::default_sweep_interval")]
    pub sweep_interval: Duration,
    #[serde(default = "RateLimitConfig::default_idle_timeout")]
    pub idle_timeout: Duration,
}

impl RateLimitConfig {
    fn default_enabled() -> bool { true }
    fn default_rps() -> f64 { 2.0 }
    fn default_burst() -> u32 { 4 }
    fn default_sweep_interval() -> Duration { Duration::from_secs(60) }
    fn default_idle_timeout() -> Duration { Duration::from_secs(180) }

    fn quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.burst.max(1)).unwrap_or(NonZeroU32::MIN);
        let period = if self.rps > 0.0 { Duration::from_secs_f64(1.0 / self.rps) } else { Duration::ZERO };
        Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            rps: Self::default_rps(),
            burst: Self::default_burst(),
            sweep_interval: Self::default_sweep_interval(),
            idle_timeout: Self::default_idle_timeout(),
        }
    }
}

type ClientBucket = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

struct ClientEntry {
    bucket: ClientBucket,
    last_seen: Instant,
}

/// Registry of per-client buckets. Construct with [`ClientRateLimiter::new`], start the
/// sweeper with [`ClientRateLimiter::start_sweeper`], stop it with [`ClientRateLimiter::shutdown`].
pub struct ClientRateLimiter {
    config: RateLimitConfig,
    quota: Quota,
    clients: Mutex<HashMap<IpAddr, ClientEntry>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ClientRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRateLimiter")
            .field("config", &self.config)
            .field("clients", &self.client_count())
            .finish()
    }
}

impl ClientRateLimiter {
    pub fn new(config: RateLimitConfig) -> Arc<Self> {
        let quota = config.quota();
        Arc::new(Self { config, quota, clients: Mutex::new(HashMap::new()), sweeper: Mutex::new(None) })
    }

    pub fn config(&self) -> &RateLimitConfig { &self.config }

    /// Admit or reject one request from `client`. Creates the bucket if absent and
    /// refreshes last-seen either way.
    pub fn admit(&self, client: IpAddr) -> bool {
        if !self.config.enabled { return true; }
        let now = Instant::now();
        let mut clients = self.clients.lock();
        let entry = clients.entry(client).or_insert_with(|| {
            debug!(target: "ratelimit", %client, "new client bucket");
            ClientEntry { bucket: RateLimiter::direct(self.quota), last_seen: now }
        });
        entry.last_seen = now;
        entry.bucket.check().is_ok()
    }

    /// Remove every bucket idle for longer than the threshold as of `now`.
    pub fn sweep_idle(&self, now: Instant) -> usize {
        let idle = self.config.idle_timeout;
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= idle);
        let removed = before - clients.len();
        if removed > 0 { tprintln!("ratelimit.sweep removed={} remaining={}", removed, clients.len()); }
        removed
    }

    pub fn client_count(&self) -> usize { self.clients.lock().len() }

    /// Spawn the periodic sweeper. Idempotent; a no-op when limiting is disabled.
    /// The task holds only a weak reference so dropping the registry ends it.
    pub fn start_sweeper(self: &Arc<Self>) {
        if !self.config.enabled { return; }
        let mut slot = self.sweeper.lock();
        if slot.is_some() { return; }
        let period = self.config.sweep_interval;
        let weak: Weak<Self> = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(limiter) = weak.upgrade() else { break; };
                let removed = limiter.sweep_idle(Instant::now());
                if removed > 0 { debug!(target: "ratelimit", removed, "idle client buckets evicted"); }
            }
        }));
        info!(target: "ratelimit", interval_secs = period.as_secs(), idle_secs = self.config.idle_timeout.as_secs(), "rate limiter sweeper started");
    }

    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
            info!(target: "ratelimit", "rate limiter sweeper stopped");
        }
    }
}

impl Drop for ClientRateLimiter {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() { handle.abort(); }
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod rate_limit_tests;
