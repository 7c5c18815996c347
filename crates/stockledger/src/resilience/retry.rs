//! Retry with exponential backoff for transient failures.
//!
//! [`with_retry`] wraps an async operation and re-issues it on transient
//! errors (lock contention, store unavailability). Non-transient errors are
//! returned immediately without retry: replaying an insufficient-stock sale
//! or a duplicate event cannot change the answer.
//!
//! # Backoff Strategy
//!
//! - Base delay doubles with each attempt: `initial_backoff * 2^attempt`
//! - Delay is capped at `max_backoff`
//! - Random jitter of 0–50% of the computed delay is added to prevent
//!   thundering-herd effects across concurrent callers

use std::{future::Future, time::Duration};

use rand::Rng;

use crate::{
    config::ConfigError,
    error::{InventoryError, InventoryResult},
};

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default initial backoff delay.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Default backoff cap.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Retries after the initial attempt. Zero disables retrying.
    pub(crate) max_retries: u32,
    /// Delay before the first retry.
    pub(crate) initial_backoff: Duration,
    /// Upper bound on any single backoff delay.
    pub(crate) max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

#[bon::bon]
impl RetryConfig {
    /// Creates a validated retry configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `initial_backoff` is zero or `max_backoff`
    /// is below `initial_backoff`.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_RETRIES)] max_retries: u32,
        #[builder(default = DEFAULT_INITIAL_BACKOFF)] initial_backoff: Duration,
        #[builder(default = DEFAULT_MAX_BACKOFF)] max_backoff: Duration,
    ) -> Result<Self, ConfigError> {
        if initial_backoff.is_zero() {
            return Err(ConfigError::MustBePositive {
                field: "initial_backoff",
                value: "0s".into(),
            });
        }
        if max_backoff < initial_backoff {
            return Err(ConfigError::BelowMinimum {
                field: "max_backoff",
                min: format!("{}ms (initial_backoff)", initial_backoff.as_millis()),
                value: format!("{}ms", max_backoff.as_millis()),
            });
        }
        Ok(Self { max_retries, initial_backoff, max_backoff })
    }

    /// Returns the retry count after the initial attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the delay before the first retry.
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the backoff cap.
    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }
}

/// Executes `operation` with automatic retry on transient errors.
///
/// Returns the result of the first successful call, or the last error if
/// all retry attempts are exhausted. Only errors where
/// [`InventoryError::is_transient`] returns `true` are retried; all other
/// errors are propagated immediately.
#[tracing::instrument(skip(config, operation), fields(max_retries = config.max_retries))]
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> InventoryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = InventoryResult<T>>,
{
    let mut last_error: Option<InventoryError> = None;

    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "operation succeeded after retry",
                    );
                }
                return Ok(value);
            },
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = compute_backoff(config, attempt);
                tracing::debug!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient error, retrying after backoff",
                );
                tokio::time::sleep(delay).await;
                last_error = Some(err);
            },
            Err(err) => {
                // Non-transient error on any attempt, or transient on last attempt
                return Err(err);
            },
        }
    }

    // All retries exhausted — return the last transient error
    Err(last_error
        .unwrap_or_else(|| InventoryError::internal("retry loop completed without result or error")))
}

/// Computes the backoff duration for the given attempt number.
///
/// `min(initial_backoff * 2^attempt, max_backoff) + random(0..50% of delay)`
fn compute_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.initial_backoff.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = base.min(config.max_backoff);

    let jitter_range = capped.as_millis() as u64 / 2;
    if jitter_range > 0 {
        let jitter = rand::rng().random_range(0..=jitter_range);
        capped + Duration::from_millis(jitter)
    } else {
        capped
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn compute_backoff_is_exponential() {
        let config = RetryConfig::builder()
            .max_retries(5)
            .initial_backoff(Duration::from_millis(100))
            .max_backoff(Duration::from_secs(10))
            .build()
            .unwrap();

        let d0 = compute_backoff(&config, 0);
        assert!(d0 >= Duration::from_millis(100));
        assert!(d0 <= Duration::from_millis(150)); // 100 + up to 50% jitter

        let d1 = compute_backoff(&config, 1);
        assert!(d1 >= Duration::from_millis(200));
        assert!(d1 <= Duration::from_millis(300));

        let d2 = compute_backoff(&config, 2);
        assert!(d2 >= Duration::from_millis(400));
        assert!(d2 <= Duration::from_millis(600));
    }

    #[test]
    fn compute_backoff_capped_at_max() {
        let config = RetryConfig::builder()
            .max_retries(10)
            .initial_backoff(Duration::from_secs(1))
            .max_backoff(Duration::from_secs(5))
            .build()
            .unwrap();

        // Attempt 5: base = 32s, capped at 5s
        let d = compute_backoff(&config, 5);
        assert!(d >= Duration::from_secs(5));
        assert!(d <= Duration::from_millis(7500)); // 5s + up to 50% jitter
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let config = RetryConfig::default();
        let call_count = AtomicU32::new(0);

        let result = with_retry(&config, "test_op", || {
            call_count.fetch_add(1, Ordering::Relaxed);
            async { Ok::<_, InventoryError>(42) }
        })
        .await;

        assert_eq!(result.ok(), Some(42));
        assert_eq!(call_count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let config = RetryConfig::builder()
            .max_retries(3)
            .initial_backoff(Duration::from_millis(1))
            .max_backoff(Duration::from_millis(10))
            .build()
            .unwrap();
        let call_count = AtomicU32::new(0);

        let result = with_retry(&config, "test_op", || {
            let attempt = call_count.fetch_add(1, Ordering::Relaxed);
            async move {
                if attempt < 2 { Err(InventoryError::store_unavailable("flap")) } else { Ok(42) }
            }
        })
        .await;

        assert_eq!(result.ok(), Some(42));
        assert_eq!(call_count.load(Ordering::Relaxed), 3); // 2 failures + 1 success
    }

    #[tokio::test]
    async fn business_outcome_not_retried() {
        let config = RetryConfig::builder()
            .max_retries(3)
            .initial_backoff(Duration::from_millis(1))
            .build()
            .unwrap();
        let call_count = AtomicU32::new(0);

        let result: InventoryResult<u64> = with_retry(&config, "test_op", || {
            call_count.fetch_add(1, Ordering::Relaxed);
            async { Err(InventoryError::insufficient_stock(1, 5)) }
        })
        .await;

        assert!(matches!(result, Err(InventoryError::InsufficientStock { .. })));
        assert_eq!(call_count.load(Ordering::Relaxed), 1); // No retries
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let config = RetryConfig::builder()
            .max_retries(2)
            .initial_backoff(Duration::from_millis(1))
            .max_backoff(Duration::from_millis(5))
            .build()
            .unwrap();
        let call_count = AtomicU32::new(0);

        let result: InventoryResult<u64> = with_retry(&config, "test_op", || {
            call_count.fetch_add(1, Ordering::Relaxed);
            async { Err(InventoryError::Contention) }
        })
        .await;

        assert!(matches!(result, Err(InventoryError::Contention)));
        assert_eq!(call_count.load(Ordering::Relaxed), 3); // 1 initial + 2 retries
    }

    #[tokio::test]
    async fn zero_max_retries_disables_retrying() {
        let config = RetryConfig::builder()
            .max_retries(0)
            .initial_backoff(Duration::from_millis(1))
            .build()
            .unwrap();
        let call_count = AtomicU32::new(0);

        let result: InventoryResult<u64> = with_retry(&config, "test_op", || {
            call_count.fetch_add(1, Ordering::Relaxed);
            async { Err(InventoryError::store_unavailable("down")) }
        })
        .await;

        assert!(matches!(result, Err(InventoryError::StoreUnavailable { .. })));
        assert_eq!(call_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn degenerate_config_rejected() {
        assert!(RetryConfig::builder().initial_backoff(Duration::ZERO).build().is_err());
        assert!(
            RetryConfig::builder()
                .initial_backoff(Duration::from_secs(1))
                .max_backoff(Duration::from_millis(10))
                .build()
                .is_err()
        );
    }
}
