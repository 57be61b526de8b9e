//!
//! marquee configuration
//! ---------------------
//! Runtime settings for the API server. Every setting has a default, can be set
//! through a `MARQUEE_*` environment variable, and can be overridden again by a
//! command-line flag.

use std::time::Duration;

use anyhow::{bail, Result};

use crate::rate_limit::RateLimitConfig;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const USAGE: &str = "marquee API server\n\nUSAGE:\n  marquee [OPTIONS]\n\nOPTIONS:\n  --port N                    HTTP port (env: MARQUEE_PORT, default 4000)\n  --env NAME                  development|staging|production (env: MARQUEE_ENV, default development)\n  --limiter-rps F             Refill rate per client, requests/second (env: MARQUEE_LIMITER_RPS, default 2)\n  --limiter-burst N           Bucket capacity per client (env: MARQUEE_LIMITER_BURST, default 4)\n  --limiter-enabled BOOL      Enable per-client rate limiting (env: MARQUEE_LIMITER_ENABLED, default true)\n  --cors-trusted-origins S    Space separated trusted origins (env: MARQUEE_CORS_TRUSTED_ORIGINS)\n  --smtp-sender S             Sender address for outgoing mail (env: MARQUEE_SMTP_SENDER)\n  --shutdown-timeout-secs N   Grace period for background work on shutdown (env: MARQUEE_SHUTDOWN_TIMEOUT_SECS, default 20)\n  --help                      Print this help\n";

const ENVIRONMENTS: &[&str] = &["development", "staging", "production"];

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub env: String,
    pub limiter: RateLimitConfig,
    pub trusted_origins: Vec<String>,
    pub smtp_sender: String,
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            env: "development".into(),
            limiter: RateLimitConfig::default(),
            trusted_origins: Vec::new(),
            smtp_sender: "Marquee <no-reply@marquee.local>".into(),
            shutdown_timeout: Duration::from_secs(20),
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            return args.get(i + 1).map(String::as_str);
        }
        if let Some(v) = args[i].strip_prefix(flag).and_then(|rest| rest.strip_prefix('=')) {
            return Some(v);
        }
        i += 1;
    }
    None
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

impl Config {
    /// Reads the process environment and arguments.
    pub fn from_args(args: &[String]) -> Result<Self> {
        Self::from_sources(args, |name| std::env::var(name).ok())
    }

    /// CLI flags win over environment values, which win over defaults.
    pub fn from_sources<F>(args: &[String], env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();
        let pick = |flag: &str, var: &str| -> Option<String> {
            arg_value(args, flag).map(str::to_string).or_else(|| env(var))
        };

        if let Some(v) = pick("--port", "MARQUEE_PORT") {
            cfg.port = match v.parse::<u16>() { Ok(p) => p, Err(_) => bail!("invalid port: {}", v) };
        }
        if let Some(v) = pick("--env", "MARQUEE_ENV") {
            if !ENVIRONMENTS.contains(&v.as_str()) { bail!("invalid environment: {} (expected development|staging|production)", v); }
            cfg.env = v;
        }
        if let Some(v) = pick("--limiter-rps", "MARQUEE_LIMITER_RPS") {
            cfg.limiter.rps = match v.parse::<f64>() { Ok(r) if r > 0.0 && r.is_finite() => r, _ => bail!("invalid limiter rps: {}", v) };
        }
        if let Some(v) = pick("--limiter-burst", "MARQUEE_LIMITER_BURST") {
            cfg.limiter.burst = match v.parse::<u32>() { Ok(b) if b > 0 => b, _ => bail!("invalid limiter burst: {}", v) };
        }
        if let Some(v) = pick("--limiter-enabled", "MARQUEE_LIMITER_ENABLED") {
            cfg.limiter.enabled = match parse_bool(&v) { Some(b) => b, None => bail!("invalid limiter-enabled value: {}", v) };
        }
        if let Some(v) = pick("--cors-trusted-origins", "MARQUEE_CORS_TRUSTED_ORIGINS") {
            cfg.trusted_origins = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = pick("--smtp-sender", "MARQUEE_SMTP_SENDER") {
            cfg.smtp_sender = v;
        }
        if let Some(v) = pick("--shutdown-timeout-secs", "MARQUEE_SHUTDOWN_TIMEOUT_SECS") {
            cfg.shutdown_timeout = match v.parse::<u64>() { Ok(s) => Duration::from_secs(s), Err(_) => bail!("invalid shutdown timeout: {}", v) };
        }
        Ok(cfg)
    }
}
