//! Inventory error taxonomy and result alias.
//!
//! Every component maps its failures into [`InventoryError`]. The taxonomy
//! separates three classes of outcome:
//!
//! - **Business rejections** — [`InventoryError::InsufficientStock`],
//!   [`InventoryError::DuplicateEvent`], [`InventoryError::Validation`],
//!   [`InventoryError::NotFound`]. Normal outcomes reported synchronously;
//!   never retried and never counted against the circuit breaker.
//! - **Transient infrastructure failures** — [`InventoryError::Contention`]
//!   (row-lock wait timed out) and [`InventoryError::StoreUnavailable`].
//!   Eligible for retry with backoff and counted toward the breaker.
//! - **Admission rejections** — [`InventoryError::RateLimited`],
//!   [`InventoryError::Overloaded`], [`InventoryError::CircuitOpen`].
//!   Produced by the resilience decorators before the engine is reached.
//!
//! Cache faults never appear here from engine operations: the engine absorbs
//! them internally and degrades to a cache miss.

use std::{sync::Arc, time::Duration};

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for inventory operations.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Errors produced by inventory ledger operations.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases without a
/// semver-breaking change. Downstream match expressions must include a
/// wildcard arm.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InventoryError {
    /// Malformed input, rejected before touching storage.
    #[error("Validation failed: {message}")]
    Validation {
        /// What was wrong with the input.
        message: String,
    },

    /// No stock record exists for the requested `(store, product)` pair.
    ///
    /// Only the read path reports this; write paths materialize a
    /// zero-quantity record on first touch instead.
    #[error("Product not found in inventory: {store_id}:{product_id}")]
    NotFound {
        /// Store identifier.
        store_id: String,
        /// Product identifier.
        product_id: String,
    },

    /// The event id was already recorded; no mutation was performed.
    ///
    /// A non-retryable no-op from the caller's perspective: the original
    /// request already took effect.
    #[error("Event already processed: {event_id}")]
    DuplicateEvent {
        /// The idempotency key that was already recorded.
        event_id: String,
    },

    /// A sale requested more stock than the locked, just-read quantity.
    ///
    /// A FAILED ledger event is still recorded for audit completeness.
    #[error("Insufficient stock. Available: {available}, Requested: {requested}")]
    InsufficientStock {
        /// Quantity observed under the row lock.
        available: u64,
        /// Quantity the sale requested.
        requested: u64,
    },

    /// Row-lock acquisition exceeded the configured wait bound.
    ///
    /// Retryable by the caller with backoff.
    #[error("Row lock wait timed out")]
    Contention,

    /// The durable store failed.
    ///
    /// Surfaced as a hard failure on writes — silently proceeding would risk
    /// losing the audit trail or the lock guarantee.
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the storage fault.
        message: String,
        /// The underlying error, when available.
        #[source]
        source: Option<BoxError>,
    },

    /// The request-rate limiter rejected the call.
    #[error("Rate limit exceeded, retry after {}ms", retry_after.as_millis())]
    RateLimited {
        /// How long until a token is expected to be available.
        retry_after: Duration,
    },

    /// The bounded-concurrency admission limit is exhausted.
    #[error("Concurrency limit exhausted")]
    Overloaded,

    /// The circuit breaker is open; the call was short-circuited.
    #[error("Circuit breaker open")]
    CircuitOpen,

    /// Invariant violation inside the ledger core.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal failure.
        message: String,
    },
}

impl InventoryError {
    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(store_id: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self::NotFound { store_id: store_id.into(), product_id: product_id.into() }
    }

    /// Creates a new `DuplicateEvent` error.
    #[must_use]
    pub fn duplicate_event(event_id: impl Into<String>) -> Self {
        Self::DuplicateEvent { event_id: event_id.into() }
    }

    /// Creates a new `InsufficientStock` error.
    #[must_use]
    pub fn insufficient_stock(available: u64, requested: u64) -> Self {
        Self::InsufficientStock { available, requested }
    }

    /// Creates a new `StoreUnavailable` error with the given message.
    #[must_use]
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable { message: message.into(), source: None }
    }

    /// Creates a new `StoreUnavailable` error with a message and source.
    #[must_use]
    pub fn store_unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::StoreUnavailable { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Returns `true` for infrastructure failures worth retrying.
    ///
    /// Transient errors are retried by the retry decorator and counted as
    /// failures by the circuit breaker. Business rejections and admission
    /// rejections are not transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Contention | Self::StoreUnavailable { .. })
    }

    /// Returns `true` for normal business outcomes.
    ///
    /// These map to non-5xx-equivalent responses at the service edge:
    /// the request was understood and definitively answered.
    #[must_use]
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::NotFound { .. }
                | Self::DuplicateEvent { .. }
                | Self::InsufficientStock { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(InventoryError::Contention.is_transient());
        assert!(InventoryError::store_unavailable("down").is_transient());

        assert!(!InventoryError::insufficient_stock(1, 2).is_transient());
        assert!(!InventoryError::duplicate_event("e").is_transient());
        assert!(!InventoryError::validation("bad").is_transient());
        assert!(!InventoryError::Overloaded.is_transient());
        assert!(!InventoryError::CircuitOpen.is_transient());
        assert!(!InventoryError::RateLimited { retry_after: Duration::from_millis(5) }
            .is_transient());
    }

    #[test]
    fn business_outcome_classification() {
        assert!(InventoryError::insufficient_stock(1, 2).is_business_outcome());
        assert!(InventoryError::duplicate_event("e").is_business_outcome());
        assert!(InventoryError::not_found("S1", "P1").is_business_outcome());
        assert!(InventoryError::validation("bad").is_business_outcome());

        assert!(!InventoryError::Contention.is_business_outcome());
        assert!(!InventoryError::CircuitOpen.is_business_outcome());
    }

    #[test]
    fn insufficient_stock_display_names_both_quantities() {
        let err = InventoryError::insufficient_stock(10, 30);
        let display = err.to_string();
        assert!(display.contains("Available: 10"), "display: {display}");
        assert!(display.contains("Requested: 30"), "display: {display}");
    }

    #[test]
    fn store_unavailable_preserves_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = InventoryError::store_unavailable_with_source("connect failed", io);
        assert!(std::error::Error::source(&err).is_some());
    }
}
