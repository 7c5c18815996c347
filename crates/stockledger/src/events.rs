//! Append-only event log with idempotency enforcement.
//!
//! The [`EventLog`] records every attempted mutation — successes and
//! failures alike — so the audit trail is complete. The event id doubles as
//! the idempotency key: [`append`](EventLog::append) rejects a second entry
//! with the same id, and that rejection is a valid, detectable outcome
//! (reported as [`InventoryError::DuplicateEvent`]) rather than corruption.
//!
//! The log requires no locking beyond uniqueness enforcement on the event
//! id; it is append-only and entries are never mutated or deleted.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{
    error::{InventoryError, InventoryResult},
    types::{EventStatus, LedgerEvent},
};

/// Append-only, idempotent-by-key record of attempted mutations.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Idempotency probe: has this event id already been recorded?
    async fn exists(&self, event_id: &str) -> InventoryResult<bool>;

    /// Appends one event.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::DuplicateEvent`] — the event id is already recorded. Concurrent
    ///   identical retries race here; exactly one wins.
    /// - [`InventoryError::StoreUnavailable`] — the backing log failed.
    async fn append(&self, event: LedgerEvent) -> InventoryResult<()>;

    /// Events for one product, newest first.
    async fn for_product(&self, product_id: &str) -> InventoryResult<Vec<LedgerEvent>>;

    /// Events for one store, newest first.
    async fn for_store(&self, store_id: &str) -> InventoryResult<Vec<LedgerEvent>>;

    /// Events within a time range (inclusive), newest first.
    async fn between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> InventoryResult<Vec<LedgerEvent>>;

    /// Events with the given status, oldest first (replay order).
    async fn with_status(&self, status: EventStatus) -> InventoryResult<Vec<LedgerEvent>>;
}

/// In-memory [`EventLog`] backed by an append-only vector.
///
/// Entries are kept in append order; an id index enforces uniqueness under
/// the same write lock as the append, so the probe-and-insert is atomic.
///
/// # Cloning
///
/// Cheaply cloneable; all clones share the same log.
#[derive(Clone, Default)]
pub struct MemoryEventLog {
    inner: std::sync::Arc<RwLock<LogInner>>,
}

#[derive(Default)]
struct LogInner {
    entries: Vec<LedgerEvent>,
    ids: HashSet<String>,
}

impl MemoryEventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn exists(&self, event_id: &str) -> InventoryResult<bool> {
        Ok(self.inner.read().ids.contains(event_id))
    }

    async fn append(&self, event: LedgerEvent) -> InventoryResult<()> {
        let mut inner = self.inner.write();
        if !inner.ids.insert(event.event_id.clone()) {
            return Err(InventoryError::duplicate_event(event.event_id));
        }
        inner.entries.push(event);
        Ok(())
    }

    async fn for_product(&self, product_id: &str) -> InventoryResult<Vec<LedgerEvent>> {
        let inner = self.inner.read();
        let mut events: Vec<LedgerEvent> =
            inner.entries.iter().filter(|e| e.product_id == product_id).cloned().collect();
        events.reverse();
        Ok(events)
    }

    async fn for_store(&self, store_id: &str) -> InventoryResult<Vec<LedgerEvent>> {
        let inner = self.inner.read();
        let mut events: Vec<LedgerEvent> =
            inner.entries.iter().filter(|e| e.store_id == store_id).cloned().collect();
        events.reverse();
        Ok(events)
    }

    async fn between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> InventoryResult<Vec<LedgerEvent>> {
        let inner = self.inner.read();
        let mut events: Vec<LedgerEvent> = inner
            .entries
            .iter()
            .filter(|e| e.timestamp >= from && e.timestamp <= to)
            .cloned()
            .collect();
        events.reverse();
        Ok(events)
    }

    async fn with_status(&self, status: EventStatus) -> InventoryResult<Vec<LedgerEvent>> {
        let inner = self.inner.read();
        Ok(inner.entries.iter().filter(|e| e.status == status).cloned().collect())
    }
}
