use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Outcome of one admission check, carrying the quota numbers surfaced in
/// `X-RateLimit-*` headers on both admission and rejection.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub admitted: bool,
    pub limit: u32,
    pub remaining: u32,
}

/// Rolling-window rate limiter keyed by principal.
///
/// The dashmap entry lock makes the check-and-increment atomic per identity;
/// counters for different identities never interact.
#[derive(Debug, Clone)]
pub struct ApiRateLimiter {
    window: Duration,
    default_limit: u32,
    buckets: Arc<DashMap<String, Vec<Instant>>>,
}

impl ApiRateLimiter {
    pub fn new(window: Duration, default_limit: u32) -> Self {
        Self {
            window,
            default_limit,
            buckets: Arc::new(DashMap::new()),
        }
    }

    /// Admit or reject one request for `key`. A principal's own budget
    /// overrides the gateway default.
    pub fn allow(&self, key: &str, limit_override: Option<u32>) -> RateDecision {
        let limit = limit_override.unwrap_or(self.default_limit);
        let now = Instant::now();
        let window = self.window;

        let mut entry = self.buckets.entry(key.to_string()).or_default();
        entry.retain(|instant| now.duration_since(*instant) < window);

        if entry.len() as u32 >= limit {
            return RateDecision {
                admitted: false,
                limit,
                remaining: 0,
            };
        }

        entry.push(now);
        RateDecision {
            admitted: true,
            limit,
            remaining: limit.saturating_sub(entry.len() as u32),
        }
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }
}
