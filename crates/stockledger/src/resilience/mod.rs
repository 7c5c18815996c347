//! Resilience decorators for the inventory engine.
//!
//! [`ResilientEngine`] wraps an [`InventoryEngine`] with four explicit,
//! independently configurable guards applied in a fixed order:
//!
//! 1. **Rate limit** — token bucket; rejects excess request volume with
//!    [`InventoryError::RateLimited`](crate::InventoryError::RateLimited)
//!    before anything else runs.
//! 2. **Bulkhead** — bounded concurrency; rejects with
//!    [`InventoryError::Overloaded`](crate::InventoryError::Overloaded)
//!    when too many operations are in flight.
//! 3. **Circuit breaker** — sliding-window failure ratio; fails fast with
//!    [`InventoryError::CircuitOpen`](crate::InventoryError::CircuitOpen)
//!    while the store is presumed down.
//! 4. **Retry** — exponential backoff with jitter, transient errors only,
//!    inside the breaker so one admitted request records one breaker
//!    outcome no matter how many attempts it took.
//!
//! Business rejections (insufficient stock, duplicate event, validation)
//! pass through every layer untouched and count as breaker successes: the
//! ledger answered, so the outcome is evidence of health.

mod breaker;
mod bulkhead;
mod rate_limit;
mod retry;

use std::sync::Arc;

pub use breaker::{
    BreakerConfig, CircuitBreaker, CircuitBreakerMetrics, CircuitState, DEFAULT_COOLDOWN,
    DEFAULT_FAILURE_RATIO, DEFAULT_MIN_CALLS, DEFAULT_SUCCESS_THRESHOLD, DEFAULT_WINDOW,
};
pub use bulkhead::{Bulkhead, BulkheadConfig, DEFAULT_MAX_CONCURRENT};
pub use rate_limit::{RateLimitConfig, RateLimitMetricsSnapshot, TokenBucketLimiter};
pub use retry::{
    DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_RETRIES, RetryConfig, with_retry,
};

use crate::{
    cache::InventoryCache,
    engine::InventoryEngine,
    error::{InventoryError, InventoryResult},
    events::EventLog,
    store::LedgerStore,
    types::{BatchOperation, BatchReport, MutationReceipt, RestockRequest, SaleRequest, StockLevel},
};

/// Aggregate configuration for all four resilience guards.
#[derive(Debug, Clone, Default)]
pub struct ResilienceConfig {
    /// Token-bucket rate limit.
    pub rate_limit: RateLimitConfig,
    /// In-flight concurrency cap.
    pub bulkhead: BulkheadConfig,
    /// Circuit breaker thresholds.
    pub breaker: BreakerConfig,
    /// Retry and backoff policy.
    pub retry: RetryConfig,
}

/// An [`InventoryEngine`] guarded by rate limit, bulkhead, circuit breaker,
/// and retry.
///
/// Exposes the same operation surface as the inner engine. Audit queries go
/// through [`engine`](ResilientEngine::engine) directly; they are read-only
/// and not worth a token.
///
/// # Cloning
///
/// Cheaply cloneable; all clones share the same guards and engine state.
pub struct ResilientEngine<S, E, C> {
    engine: InventoryEngine<S, E, C>,
    limiter: Arc<TokenBucketLimiter>,
    bulkhead: Bulkhead,
    breaker: CircuitBreaker,
    retry: RetryConfig,
}

impl<S, E, C> Clone for ResilientEngine<S, E, C> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            limiter: Arc::clone(&self.limiter),
            bulkhead: self.bulkhead.clone(),
            breaker: self.breaker.clone(),
            retry: self.retry,
        }
    }
}

impl<S, E, C> ResilientEngine<S, E, C>
where
    S: LedgerStore,
    E: EventLog,
    C: InventoryCache,
{
    /// Wraps an engine with the given guard configuration.
    pub fn new(engine: InventoryEngine<S, E, C>, config: ResilienceConfig) -> Self {
        Self {
            engine,
            limiter: Arc::new(TokenBucketLimiter::new(config.rate_limit)),
            bulkhead: Bulkhead::new(config.bulkhead),
            breaker: CircuitBreaker::new(config.breaker),
            retry: config.retry,
        }
    }

    /// The wrapped engine, for audit queries and direct access.
    pub fn engine(&self) -> &InventoryEngine<S, E, C> {
        &self.engine
    }

    /// The circuit breaker, for state inspection.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// The rate limiter, for counter inspection.
    pub fn limiter(&self) -> &TokenBucketLimiter {
        &self.limiter
    }

    /// The bulkhead, for permit inspection.
    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }

    /// Guarded [`InventoryEngine::get`].
    pub async fn get(&self, store_id: &str, product_id: &str) -> InventoryResult<StockLevel> {
        let engine = self.engine.clone();
        let store_id = store_id.to_owned();
        let product_id = product_id.to_owned();
        self.execute("get", move || {
            let engine = engine.clone();
            let store_id = store_id.clone();
            let product_id = product_id.clone();
            async move { engine.get(&store_id, &product_id).await }
        })
        .await
    }

    /// Guarded [`InventoryEngine::sell`].
    pub async fn sell(&self, request: &SaleRequest) -> InventoryResult<MutationReceipt> {
        let engine = self.engine.clone();
        let request = request.clone();
        self.execute("sell", move || {
            let engine = engine.clone();
            let request = request.clone();
            async move { engine.sell(&request).await }
        })
        .await
    }

    /// Guarded [`InventoryEngine::restock`].
    pub async fn restock(&self, request: &RestockRequest) -> InventoryResult<MutationReceipt> {
        let engine = self.engine.clone();
        let request = request.clone();
        self.execute("restock", move || {
            let engine = engine.clone();
            let request = request.clone();
            async move { engine.restock(&request).await }
        })
        .await
    }

    /// Guarded [`InventoryEngine::batch_sync`].
    ///
    /// The batch consumes one rate-limit token and one bulkhead permit as a
    /// whole; its elements are not retried individually here because the
    /// report already captures per-element outcomes.
    pub async fn batch_sync(
        &self,
        store_id: &str,
        operations: &[BatchOperation],
    ) -> InventoryResult<BatchReport> {
        let engine = self.engine.clone();
        let store_id = store_id.to_owned();
        let operations = operations.to_vec();
        self.execute("batch_sync", move || {
            let engine = engine.clone();
            let store_id = store_id.clone();
            let operations = operations.clone();
            async move { engine.batch_sync(&store_id, &operations).await }
        })
        .await
    }

    /// Runs one operation through the guard stack.
    async fn execute<T, F, Fut>(&self, operation_name: &str, operation: F) -> InventoryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = InventoryResult<T>>,
    {
        self.limiter.check()?;
        let _permit = self.bulkhead.try_acquire()?;
        if !self.breaker.allow_request() {
            return Err(InventoryError::CircuitOpen);
        }

        let result = with_retry(&self.retry, operation_name, operation).await;
        match &result {
            Err(error) if error.is_transient() => self.breaker.record_failure(),
            _ => self.breaker.record_success(),
        }
        result
    }
}
