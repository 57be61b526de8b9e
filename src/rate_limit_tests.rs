use super::*;
use std::net::Ipv4Addr;

fn ip(last: u8) -> IpAddr { IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)) }

fn config(rps: f64, burst: u32) -> RateLimitConfig {
    RateLimitConfig { enabled: true, rps, burst, ..RateLimitConfig::default() }
}

#[test]
fn burst_is_admitted_then_rejected() {
    let limiter = ClientRateLimiter::new(config(2.0, 4));
    for i in 0..4 {
        assert!(limiter.admit(ip(1)), "request {} should be admitted", i + 1);
    }
    assert!(!limiter.admit(ip(1)), "request 5 should be rejected");
}

#[test]
fn clients_have_independent_buckets() {
    let limiter = ClientRateLimiter::new(config(1.0, 1));
    assert!(limiter.admit(ip(1)));
    assert!(!limiter.admit(ip(1)));
    assert!(limiter.admit(ip(2)));
    assert_eq!(limiter.client_count(), 2);
}

#[test]
fn disabled_limiter_admits_everything_without_bookkeeping() {
    let limiter = ClientRateLimiter::new(RateLimitConfig { enabled: false, burst: 1, ..RateLimitConfig::default() });
    for _ in 0..100 {
        assert!(limiter.admit(ip(1)));
    }
    assert_eq!(limiter.client_count(), 0);
}

#[test]
fn sweep_removes_only_idle_buckets() {
    let limiter = ClientRateLimiter::new(config(2.0, 4));
    limiter.admit(ip(1));
    limiter.admit(ip(2));
    let now = Instant::now();
    assert_eq!(limiter.sweep_idle(now), 0);
    assert_eq!(limiter.sweep_idle(now + Duration::from_secs(181)), 2);
    assert_eq!(limiter.client_count(), 0);
}

#[test]
fn swept_client_starts_with_full_burst() {
    let limiter = ClientRateLimiter::new(config(0.5, 2));
    assert!(limiter.admit(ip(9)));
    assert!(limiter.admit(ip(9)));
    assert!(!limiter.admit(ip(9)));
    limiter.sweep_idle(Instant::now() + Duration::from_secs(240));
    assert!(limiter.admit(ip(9)));
    assert!(limiter.admit(ip(9)));
}

#[test]
fn concurrent_first_requests_share_one_bucket() {
    let limiter = ClientRateLimiter::new(config(0.1, 8));
    let admitted = std::sync::atomic::AtomicUsize::new(0);
    std::thread::scope(|s| {
        for _ in 0..16 {
            s.spawn(|| {
                if limiter.admit(ip(3)) { admitted.fetch_add(1, std::sync::atomic::Ordering::SeqCst); }
            });
        }
    });
    assert_eq!(limiter.client_count(), 1);
    assert_eq!(admitted.load(std::sync::atomic::Ordering::SeqCst), 8);
}

#[tokio::test(start_paused = true)]
async fn background_sweeper_evicts_idle_clients() {
    let limiter = ClientRateLimiter::new(config(2.0, 4));
    limiter.start_sweeper();
    limiter.admit(ip(4));
    assert_eq!(limiter.client_count(), 1);

    // sweeps at 60s, 120s, 180s keep the entry; the 240s sweep drops it
    tokio::time::sleep(Duration::from_secs(170)).await;
    assert_eq!(limiter.client_count(), 1);
    tokio::time::sleep(Duration::from_secs(75)).await;
    assert_eq!(limiter.client_count(), 0);

    limiter.shutdown();
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let limiter = ClientRateLimiter::new(config(2.0, 4));
    limiter.start_sweeper();
    limiter.start_sweeper();
    limiter.shutdown();
    limiter.shutdown();
}
