// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Token bucket rate limiter shared by every route.
//!
//! A single bucket gates the whole process (10 req/s, burst 10 by default).
//! The lock is only held for the refill and consume arithmetic.

use crate::config::RateLimitConfig;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Outcome of taking a token.
#[derive(Debug, Clone)]
pub enum RateLimitResult {
    /// Token taken
    Allowed {
        /// Whole tokens left after this request
        remaining: u32,
    },
    /// Bucket empty
    Limited {
        /// Wait before the next token exists
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    /// Tokens added per second
    per_sec: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    fn new(config: &RateLimitConfig) -> Self {
        let capacity = f64::from(config.burst);
        Self {
            tokens: capacity,
            capacity,
            per_sec: config.rate_per_sec,
            refilled_at: Instant::now(),
        }
    }

    /// Credit the time since the last refill, capped at capacity.
    fn refill(&mut self, now: Instant) {
        let secs = now.saturating_duration_since(self.refilled_at).as_secs_f64();
        self.tokens = self.capacity.min(self.tokens + secs * self.per_sec);
        self.refilled_at = now;
    }

    fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn whole_tokens(&self) -> u32 {
        self.tokens as u32
    }

    fn next_token_in(&self) -> Duration {
        let missing = (1.0 - self.tokens).max(0.0);
        Duration::from_secs_f64(missing / self.per_sec)
    }
}

/// Process-wide rate limiter.
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(&config)),
        }
    }

    /// Take one token if available.
    pub async fn check(&self) -> RateLimitResult {
        self.check_at(Instant::now()).await
    }

    async fn check_at(&self, now: Instant) -> RateLimitResult {
        let mut bucket = self.bucket.lock().await;

        if bucket.try_take(now) {
            RateLimitResult::Allowed {
                remaining: bucket.whole_tokens(),
            }
        } else {
            let retry_after = bucket.next_token_in();
            debug!(?retry_after, "Rate limit exceeded");
            RateLimitResult::Limited { retry_after }
        }
    }
}
