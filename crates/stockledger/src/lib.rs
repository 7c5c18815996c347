//! Concurrency-safe inventory ledger with audit trail, read-through cache,
//! and explicit resilience guards.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 ResilientEngine                  │
//! │  rate limit → bulkhead → circuit breaker → retry │
//! └───────────────────────┬──────────────────────────┘
//!                         │
//!                ┌────────▼────────┐
//!                │ InventoryEngine │
//!                └┬───────┬───────┬┘
//!        ┌────────▼──┐ ┌──▼─────┐ ┌▼──────────────┐
//!        │LedgerStore│ │EventLog│ │InventoryCache │
//!        │ row locks │ │ audit  │ │ TTL, absorbed │
//!        └───────────┘ └────────┘ └───────────────┘
//! ```
//!
//! The [`InventoryEngine`] coordinates three components behind traits:
//!
//! - [`LedgerStore`] — durable per-`(store, product)` quantities with
//!   row-level exclusive locking and bounded lock waits
//! - [`EventLog`] — append-only audit trail whose unique event ids double
//!   as idempotency keys
//! - [`InventoryCache`] — best-effort TTL cache for reads; every cache
//!   fault is absorbed and degraded to a miss
//!
//! [`ResilientEngine`] adds four explicit guards in front of the engine:
//! token-bucket rate limiting, a bounded-concurrency bulkhead, a
//! failure-ratio circuit breaker, and retry with exponential backoff for
//! transient errors.
//!
//! # Example
//!
//! ```
//! use stockledger::{
//!     InventoryEngine, MemoryEventLog, MemoryLedgerStore, MokaInventoryCache, RestockRequest,
//!     SaleRequest,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let engine = InventoryEngine::new(
//!     MemoryLedgerStore::new(),
//!     MemoryEventLog::new(),
//!     MokaInventoryCache::default(),
//! );
//!
//! engine
//!     .restock(&RestockRequest {
//!         store_id: "STORE_001".into(),
//!         product_id: "PROD_0001".into(),
//!         quantity: 100,
//!         event_id: "delivery-42".into(),
//!     })
//!     .await
//!     .unwrap();
//!
//! let receipt = engine
//!     .sell(&SaleRequest {
//!         store_id: "STORE_001".into(),
//!         product_id: "PROD_0001".into(),
//!         quantity: 30,
//!         event_id: "order-7".into(),
//!     })
//!     .await
//!     .unwrap();
//! assert_eq!(receipt.quantity, 70);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod resilience;
pub mod store;
#[cfg(feature = "testutil")]
pub mod testutil;
pub mod types;

pub use cache::{CacheConfig, CachedLevel, InventoryCache, MokaInventoryCache};
pub use config::ConfigError;
pub use engine::InventoryEngine;
pub use error::{BoxError, InventoryError, InventoryResult};
pub use events::{EventLog, MemoryEventLog};
pub use resilience::{
    BreakerConfig, Bulkhead, BulkheadConfig, CircuitBreaker, CircuitState, RateLimitConfig,
    ResilienceConfig, ResilientEngine, RetryConfig, TokenBucketLimiter,
};
pub use store::{LedgerStore, MemoryLedgerStore, RowLock, StoreConfig};
pub use types::{
    BatchKind, BatchOperation, BatchReport, EventStatus, EventType, LedgerEvent, MutationReceipt,
    RestockRequest, SaleRequest, StockKey, StockLevel, StockRecord,
};
