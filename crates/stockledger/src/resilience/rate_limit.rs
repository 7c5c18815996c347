//! Token-bucket rate limiting for the engine surface.
//!
//! The bucket refills at `rate` tokens per second with a maximum burst
//! capacity of `burst`. When the bucket is empty, requests are rejected with
//! [`InventoryError::RateLimited`] carrying a `retry_after` hint, before any
//! lock or storage work happens.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::error::{InventoryError, InventoryResult};

/// Configuration for a token-bucket rate limiter.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Sustained rate in tokens per second.
    rate: u64,
    /// Maximum burst size (bucket capacity).
    burst: u64,
}

impl RateLimitConfig {
    /// Creates a new rate limit configuration.
    ///
    /// # Panics
    ///
    /// Panics if `rate` or `burst` is zero.
    #[must_use]
    pub fn new(rate: u64, burst: u64) -> Self {
        assert!(rate >= 1, "rate must be at least 1");
        assert!(burst >= 1, "burst must be at least 1");
        Self { rate, burst }
    }

    /// Returns the sustained rate in tokens per second.
    #[must_use]
    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Returns the maximum burst capacity.
    #[must_use]
    pub fn burst(&self) -> u64 {
        self.burst
    }
}

impl Default for RateLimitConfig {
    /// 100 requests per second sustained, bursts of 200.
    fn default() -> Self {
        Self { rate: 100, burst: 200 }
    }
}

/// Internal state for the token bucket.
#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    config: RateLimitConfig,
}

impl BucketState {
    fn new(config: RateLimitConfig) -> Self {
        Self { tokens: config.burst as f64, last_refill: Instant::now(), config }
    }

    /// Attempts to consume one token, refilling first. Returns `Ok(())` on
    /// success or `Err(retry_after)` if the bucket is empty.
    fn try_acquire(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        let refill = elapsed.as_secs_f64() * self.config.rate as f64;
        self.tokens = (self.tokens + refill).min(self.config.burst as f64);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            // Time until one token is available
            let deficit = 1.0 - self.tokens;
            let wait_secs = deficit / self.config.rate as f64;
            Err(Duration::from_secs_f64(wait_secs))
        }
    }
}

/// A rate limiter using the token bucket algorithm.
///
/// Thread-safe via internal `parking_lot::Mutex`.
pub struct TokenBucketLimiter {
    bucket: Mutex<BucketState>,
    allowed: AtomicU64,
    rejected: AtomicU64,
}

impl std::fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("config", &self.bucket.lock().config)
            .finish_non_exhaustive()
    }
}

/// Snapshot of rate limiter counters.
#[derive(Debug, Clone, Default)]
pub struct RateLimitMetricsSnapshot {
    /// Total requests that were allowed through.
    pub allowed: u64,
    /// Total requests that were rejected.
    pub rejected: u64,
}

impl TokenBucketLimiter {
    /// Creates a new limiter with the given configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            bucket: Mutex::new(BucketState::new(config)),
            allowed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Checks the rate limit, returning `Ok(())` if allowed or
    /// [`InventoryError::RateLimited`] if rejected.
    pub fn check(&self) -> InventoryResult<()> {
        let outcome = self.bucket.lock().try_acquire();
        match outcome {
            Ok(()) => {
                self.allowed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
            Err(retry_after) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(InventoryError::RateLimited { retry_after })
            },
        }
    }

    /// Returns a snapshot of the limiter counters.
    #[must_use]
    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            allowed: self.allowed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn config_creation() {
        let config = RateLimitConfig::new(100, 20);
        assert_eq!(config.rate(), 100);
        assert_eq!(config.burst(), 20);
    }

    #[test]
    #[should_panic(expected = "rate must be at least 1")]
    fn config_rejects_zero_rate() {
        let _ = RateLimitConfig::new(0, 10);
    }

    #[test]
    #[should_panic(expected = "burst must be at least 1")]
    fn config_rejects_zero_burst() {
        let _ = RateLimitConfig::new(10, 0);
    }

    #[test]
    fn bucket_allows_within_burst() {
        let mut bucket = BucketState::new(RateLimitConfig::new(10, 5));
        for _ in 0..5 {
            assert!(bucket.try_acquire().is_ok());
        }
        assert!(bucket.try_acquire().is_err());
    }

    #[test]
    fn bucket_refills_over_time() {
        let mut bucket = BucketState::new(RateLimitConfig::new(1000, 1));

        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_err());

        // Simulate time passing by backdating last_refill
        bucket.last_refill -= Duration::from_millis(2);
        assert!(bucket.try_acquire().is_ok());
    }

    #[test]
    fn limiter_rejects_with_positive_retry_after() {
        let limiter = TokenBucketLimiter::new(RateLimitConfig::new(10, 1));
        assert!(limiter.check().is_ok());

        match limiter.check() {
            Err(InventoryError::RateLimited { retry_after }) => {
                assert!(retry_after.as_nanos() > 0);
            },
            other => panic!("expected RateLimited, got: {other:?}"),
        }
    }

    #[test]
    fn counters_track_allowed_and_rejected() {
        let limiter = TokenBucketLimiter::new(RateLimitConfig::new(1000, 2));
        let _ = limiter.check();
        let _ = limiter.check();
        let _ = limiter.check();

        let snap = limiter.metrics_snapshot();
        assert_eq!(snap.allowed, 2);
        assert_eq!(snap.rejected, 1);
    }
}
