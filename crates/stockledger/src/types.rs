//! Domain types shared across the inventory ledger.
//!
//! This module defines the data model used by every component: the
//! [`StockKey`] composite identity, the durable [`StockRecord`] counter, the
//! immutable [`LedgerEvent`] audit entry, and the request/response structs
//! consumed and produced by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Composite identity of one stock counter: a `(store, product)` pair.
///
/// `StockKey` is the unit of mutual exclusion — row locks, cache entries,
/// and audit relationships are all scoped to it. Two keys that differ in
/// either component never contend.
///
/// # Examples
///
/// ```
/// use stockledger::StockKey;
///
/// let key = StockKey::new("STORE_001", "PROD_0001");
/// assert_eq!(key.store_id, "STORE_001");
/// assert_eq!(key.to_string(), "STORE_001:PROD_0001");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    /// Store identifier.
    pub store_id: String,
    /// Product identifier.
    pub product_id: String,
}

impl StockKey {
    /// Creates a key from store and product identifiers.
    pub fn new(store_id: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self { store_id: store_id.into(), product_id: product_id.into() }
    }
}

impl std::fmt::Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.store_id, self.product_id)
    }
}

/// The durable quantity counter for one `(store, product)` pair.
///
/// Records are created lazily at quantity 0 on the first mutation that
/// touches a never-seen key; there is no explicit "create product" step.
/// The quantity is unsigned, so a negative committed quantity is
/// unrepresentable. `version` increments on every committed upsert and
/// serves as a monotonic lock token for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    /// The `(store, product)` identity of this counter.
    pub key: StockKey,
    /// Current on-hand quantity. Never negative.
    pub quantity: u64,
    /// When this record was first materialized.
    pub created_at: DateTime<Utc>,
    /// When this record was last committed.
    pub last_updated: DateTime<Utc>,
    /// Monotonic commit counter, starting at 1 for the first upsert.
    pub version: u64,
}

impl StockRecord {
    /// Synthesizes a zero-quantity record for a key that has never been
    /// written (first-touch semantics).
    pub fn fresh(key: StockKey) -> Self {
        let now = Utc::now();
        Self { key, quantity: 0, created_at: now, last_updated: now, version: 0 }
    }
}

/// The kind of mutation an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Stock removed by a sale.
    Sale,
    /// Stock added by a restock.
    Restock,
    /// Stock adjusted by a batch synchronization element.
    Sync,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sale => write!(f, "SALE"),
            Self::Restock => write!(f, "RESTOCK"),
            Self::Sync => write!(f, "SYNC"),
        }
    }
}

/// Outcome of an attempted mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    /// The mutation committed.
    Success,
    /// The mutation was rejected (e.g. insufficient stock).
    Failed,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Immutable audit entry for one attempted mutation.
///
/// Every attempted sell/restock — success or failure — produces exactly one
/// event with the quantity before and after the attempt and the signed delta
/// that was requested (negative for sales). Events are append-only and are
/// never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Externally supplied idempotency key, unique across the log.
    pub event_id: String,
    /// The kind of mutation.
    pub event_type: EventType,
    /// Store identifier.
    pub store_id: String,
    /// Product identifier.
    pub product_id: String,
    /// Quantity observed under the row lock, before the mutation.
    pub quantity_before: u64,
    /// Quantity after the attempt. Equals `quantity_before` for failures.
    pub quantity_after: u64,
    /// Signed requested delta; negative for sales.
    pub quantity_delta: i64,
    /// Whether the mutation committed.
    pub status: EventStatus,
    /// When the attempt was recorded.
    pub timestamp: DateTime<Utc>,
    /// Failure reason, present only for [`EventStatus::Failed`].
    pub error_message: Option<String>,
}

impl LedgerEvent {
    /// Creates a SUCCESS event for a committed mutation.
    pub fn success(
        event_id: impl Into<String>,
        event_type: EventType,
        key: &StockKey,
        quantity_before: u64,
        quantity_after: u64,
        quantity_delta: i64,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type,
            store_id: key.store_id.clone(),
            product_id: key.product_id.clone(),
            quantity_before,
            quantity_after,
            quantity_delta,
            status: EventStatus::Success,
            timestamp: Utc::now(),
            error_message: None,
        }
    }

    /// Creates a FAILED event for a rejected mutation.
    ///
    /// The after-quantity equals the before-quantity: a rejected mutation is
    /// never partially applied.
    pub fn failed(
        event_id: impl Into<String>,
        event_type: EventType,
        key: &StockKey,
        quantity_before: u64,
        quantity_delta: i64,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type,
            store_id: key.store_id.clone(),
            product_id: key.product_id.clone(),
            quantity_before,
            quantity_after: quantity_before,
            quantity_delta,
            status: EventStatus::Failed,
            timestamp: Utc::now(),
            error_message: Some(error_message.into()),
        }
    }
}

/// Request to remove stock.
///
/// `event_id` is the caller-supplied idempotency key: replaying a sale with
/// the same id after a successful application is reported as a duplicate and
/// applies no further mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRequest {
    /// Store identifier.
    pub store_id: String,
    /// Product identifier.
    pub product_id: String,
    /// Units to remove. Must be at least 1.
    pub quantity: u64,
    /// Caller-supplied idempotency key.
    pub event_id: String,
}

/// Request to add stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockRequest {
    /// Store identifier.
    pub store_id: String,
    /// Product identifier.
    pub product_id: String,
    /// Units to add. Must be at least 1.
    pub quantity: u64,
    /// Caller-supplied idempotency key.
    pub event_id: String,
}

/// Result of a read query: the current quantity plus provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    /// Store identifier.
    pub store_id: String,
    /// Product identifier.
    pub product_id: String,
    /// Quantity at the time of the read.
    pub quantity: u64,
    /// When the underlying record was last committed.
    pub last_updated: DateTime<Utc>,
    /// `true` when served from the cache without a store access.
    pub cached: bool,
}

/// Result of a committed sell/restock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationReceipt {
    /// Store identifier.
    pub store_id: String,
    /// Product identifier.
    pub product_id: String,
    /// Quantity after the mutation.
    pub quantity: u64,
    /// Quantity observed under the row lock, before the mutation.
    pub quantity_before: u64,
    /// The event id recorded in the audit log for this mutation.
    pub event_id: String,
    /// When the mutation committed.
    pub last_updated: DateTime<Utc>,
}

/// The kind of one batch-sync element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchKind {
    /// Apply the element as a sale of `|delta|` units.
    Sale,
    /// Apply the element as a restock of `delta` units.
    Restock,
}

/// One element of a batch synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOperation {
    /// Product identifier within the batch's store.
    pub product_id: String,
    /// Signed quantity delta. Sales use the absolute value.
    pub delta: i64,
    /// Whether to apply the element as a sale or restock.
    pub kind: BatchKind,
}

/// Per-element outcome summary of a batch synchronization.
///
/// Elements are processed independently; one element's failure does not
/// abort or roll back the others. The batch as a whole is reported as
/// failed if any element failed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchReport {
    /// Number of elements that committed.
    pub success_count: usize,
    /// Number of elements that failed.
    pub failure_count: usize,
    /// One message per failed element, in batch order.
    pub errors: Vec<String>,
}

impl BatchReport {
    /// Returns `true` when every element committed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failure_count == 0
    }
}
