//! Bounded-concurrency admission (bulkhead).
//!
//! Caps the number of operations in flight at once. Admission is
//! non-blocking: when every permit is taken, the call is rejected with
//! [`InventoryError::Overloaded`] immediately rather than queued, so an
//! overloaded ledger sheds load instead of building an unbounded backlog.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::{
    config::ConfigError,
    error::{InventoryError, InventoryResult},
};

/// Default number of operations allowed in flight.
pub const DEFAULT_MAX_CONCURRENT: usize = 64;

/// Configuration for the bulkhead.
#[derive(Debug, Clone, Copy)]
pub struct BulkheadConfig {
    max_concurrent: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self { max_concurrent: DEFAULT_MAX_CONCURRENT }
    }
}

#[bon::bon]
impl BulkheadConfig {
    /// Creates a validated bulkhead configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `max_concurrent` is zero.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_CONCURRENT)] max_concurrent: usize,
    ) -> Result<Self, ConfigError> {
        if max_concurrent == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "max_concurrent",
                min: "1".into(),
                value: "0".into(),
            });
        }
        Ok(Self { max_concurrent })
    }

    /// Returns the in-flight operation cap.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

/// Semaphore-backed concurrency limiter.
///
/// # Cloning
///
/// Cheaply cloneable; all clones share the same permit pool.
#[derive(Debug, Clone)]
pub struct Bulkhead {
    permits: Arc<Semaphore>,
}

impl Bulkhead {
    /// Creates a bulkhead with the given configuration.
    #[must_use]
    pub fn new(config: BulkheadConfig) -> Self {
        Self { permits: Arc::new(Semaphore::new(config.max_concurrent)) }
    }

    /// Claims one in-flight permit without waiting.
    ///
    /// The permit is released when the returned guard drops.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Overloaded`] when no permit is available.
    pub fn try_acquire(&self) -> InventoryResult<OwnedSemaphorePermit> {
        match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => Ok(permit),
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => {
                Err(InventoryError::Overloaded)
            },
        }
    }

    /// Number of permits currently available.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for Bulkhead {
    fn default() -> Self {
        Self::new(BulkheadConfig::default())
    }
}
