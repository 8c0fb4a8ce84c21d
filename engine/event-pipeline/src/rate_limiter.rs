//! Per-client admission control
//!
//! Each client key owns a token bucket of `max_requests` tokens that is
//! refilled to full capacity once per window (interval refill, not
//! continuous). Buckets are created atomically on first sight and evicted
//! after a configurable idle period.

use crate::config::RateLimitConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
    last_seen: Instant,
}

impl Bucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self { tokens: capacity, last_refill: now, last_seen: now }
    }

    fn refill(&mut self, capacity: u32, window: Duration, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed >= window {
            // Advance by whole periods so the schedule does not drift
            let periods = (elapsed.as_nanos() / window.as_nanos().max(1)) as u32;
            self.last_refill += window * periods;
            self.tokens = capacity;
        }
    }
}

/// Snapshot of a client's bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub remaining: u32,
    pub capacity: u32,
    pub window_secs: u64,
}

/// Token-bucket rate limiter keyed by client address
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<String, Mutex<Bucket>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimitConfig) -> Self {
        Self { buckets: DashMap::new(), config }
    }

    /// Consume one token for `key` if one is available
    pub fn is_allowed(&self, key: &str) -> bool {
        self.is_allowed_at(key, Instant::now())
    }

    /// Same as [`is_allowed`](Self::is_allowed) against an explicit clock
    pub fn is_allowed_at(&self, key: &str, now: Instant) -> bool {
        let capacity = self.config.max_requests;
        let window = self.config.window();

        let entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(Bucket::full(capacity, now)));
        let mut bucket = entry.lock();

        bucket.refill(capacity, window, now);
        bucket.last_seen = now;

        if bucket.tokens == 0 {
            debug!("Rate limit exhausted for client {}", key);
            return false;
        }
        bucket.tokens -= 1;
        true
    }

    /// Current bucket state for a client, without consuming a token
    pub fn status(&self, key: &str) -> RateLimitStatus {
        let capacity = self.config.max_requests;
        let remaining = self
            .buckets
            .get(key)
            .map(|entry| {
                let mut bucket = entry.lock();
                bucket.refill(capacity, self.config.window(), Instant::now());
                bucket.tokens
            })
            .unwrap_or(capacity);

        RateLimitStatus { remaining, capacity, window_secs: self.config.window_secs }
    }

    /// Drop buckets idle for at least the configured TTL. Returns the number removed.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let ttl = self.config.idle_ttl();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.lock().last_seen) < ttl);
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            debug!("Evicted {} idle rate limit buckets", removed);
        }
        removed
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}
