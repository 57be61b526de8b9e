//! Request metrics, recorded through the `metrics` facade into a Prometheus
//! recorder owned by each `AppState`.
//!
//! `GET /metrics` renders the Prometheus text exposition; `GET /debug/vars`
//! serves the same samples as a JSON object alongside a few process facts.

use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, with_local_recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use serde_json::{json, Map, Value};
use tokio::time::Instant;

use super::AppState;
use crate::config::VERSION;

pub const REQUESTS_RECEIVED: &str = "marquee_http_requests_received_total";
pub const RESPONSES_SENT: &str = "marquee_http_responses_sent_total";
pub const REQUEST_DURATION: &str = "marquee_http_request_duration_seconds";
pub const RATE_LIMIT_HITS: &str = "marquee_rate_limit_hits_total";
pub const LIMITER_CLIENTS: &str = "marquee_rate_limiter_clients";

const UNMATCHED_ENDPOINT: &str = "unmatched";

/// Recorder plus its render handle. Kept per server state rather than
/// installed globally, so several routers in one process never share counts.
pub struct Metrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Default for Metrics {
    fn default() -> Self { Self::new() }
}

impl Metrics {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let metrics = Self { recorder, handle };
        metrics.record(|| {
            describe_counter!(REQUESTS_RECEIVED, "Requests that entered the pipeline");
            describe_counter!(RESPONSES_SENT, "Responses written, by status code");
            describe_histogram!(REQUEST_DURATION, "Time spent producing a response in seconds");
            describe_counter!(RATE_LIMIT_HITS, "Requests rejected by the per-client rate limiter");
            describe_gauge!(LIMITER_CLIENTS, "Clients currently tracked by the rate limiter");
        });
        metrics
    }

    fn record<T>(&self, f: impl FnOnce() -> T) -> T { with_local_recorder(&self.recorder, f) }

    pub fn request_received(&self) {
        self.record(|| counter!(REQUESTS_RECEIVED).increment(1));
    }

    pub fn response_sent(&self, status: StatusCode, seconds: f64) {
        self.record(|| {
            counter!(RESPONSES_SENT, "status" => status.as_u16().to_string()).increment(1);
            histogram!(REQUEST_DURATION, "status_class" => status_class(status)).record(seconds);
        });
    }

    pub fn rate_limit_hit(&self, endpoint: &str) {
        self.record(|| counter!(RATE_LIMIT_HITS, "endpoint" => endpoint.to_string()).increment(1));
    }

    pub fn set_limiter_clients(&self, clients: usize) {
        self.record(|| gauge!(LIMITER_CLIENTS).set(clients as f64));
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn render(&self) -> String { self.handle.render() }

    /// Samples keyed by series (`name{label="value"}`), comment lines skipped.
    pub fn samples(&self) -> Map<String, Value> { parse_exposition(&self.render()) }
}

fn parse_exposition(text: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((series, raw)) = line.rsplit_once(' ') else { continue };
        let Ok(f) = raw.parse::<f64>() else { continue };
        let value = if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 { json!(f as u64) } else { json!(f) };
        out.insert(series.to_string(), value);
    }
    out
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "unknown",
    }
}

pub(crate) fn endpoint_label(req: &Request) -> String {
    req.extensions().get::<MatchedPath>().map_or_else(|| UNMATCHED_ENDPOINT.to_string(), |p| p.as_str().to_string())
}

pub async fn track(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    state.metrics.request_received();
    let response = next.run(req).await;
    state.metrics.response_sent(response.status(), start.elapsed().as_secs_f64());
    state.metrics.set_limiter_clients(state.limiter.client_count());
    response
}

pub async fn serve_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.set_limiter_clients(state.limiter.client_count());
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], state.metrics.render())
}

pub async fn debug_vars(State(state): State<AppState>) -> Json<Value> {
    state.metrics.set_limiter_clients(state.limiter.client_count());
    let mut vars = state.metrics.samples();
    vars.insert("version".into(), json!(VERSION));
    vars.insert("background_tasks".into(), json!(state.background.pending()));
    vars.insert("timestamp".into(), json!(chrono::Utc::now().timestamp()));
    Json(Value::Object(vars))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series<'a>(text: &'a str, name: &str) -> Vec<&'a str> {
        text.lines().filter(|l| l.starts_with(name)).collect()
    }

    #[test]
    fn responses_are_counted_by_status() {
        let m = Metrics::new();
        m.request_received();
        m.request_received();
        m.response_sent(StatusCode::OK, 0.01);
        m.response_sent(StatusCode::NOT_FOUND, 0.02);
        m.response_sent(StatusCode::NOT_FOUND, 0.03);

        let samples = m.samples();
        assert_eq!(samples[REQUESTS_RECEIVED], 2);
        assert_eq!(samples[&format!("{}{{status=\"200\"}}", RESPONSES_SENT)], 1);
        assert_eq!(samples[&format!("{}{{status=\"404\"}}", RESPONSES_SENT)], 2);
        assert!(!series(&m.render(), REQUEST_DURATION).is_empty());
    }

    #[test]
    fn limiter_gauge_and_rate_limit_hits() {
        let m = Metrics::new();
        m.set_limiter_clients(3);
        m.set_limiter_clients(2);
        m.rate_limit_hit("/v1/healthcheck");
        let samples = m.samples();
        assert_eq!(samples[LIMITER_CLIENTS], 2);
        assert_eq!(samples[&format!("{}{{endpoint=\"/v1/healthcheck\"}}", RATE_LIMIT_HITS)], 1);
    }

    #[test]
    fn recorders_are_isolated() {
        let a = Metrics::new();
        let b = Metrics::new();
        a.request_received();
        assert_eq!(a.samples()[REQUESTS_RECEIVED], 1);
        assert!(b.samples().get(REQUESTS_RECEIVED).is_none());
    }

    #[test]
    fn exposition_parsing_skips_comments() {
        let text = "# HELP x_total things\n# TYPE x_total counter\nx_total{a=\"b c\"} 4\ny 0.25\nz 3.0\n\n";
        let parsed = parse_exposition(text);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed["z"], 3);
        assert_eq!(parsed["x_total{a=\"b c\"}"], 4);
        assert_eq!(parsed["y"], 0.25);
    }

    #[test]
    fn status_classes() {
        assert_eq!(status_class(StatusCode::CREATED), "2xx");
        assert_eq!(status_class(StatusCode::TOO_MANY_REQUESTS), "4xx");
        assert_eq!(status_class(StatusCode::INTERNAL_SERVER_ERROR), "5xx");
    }
}
