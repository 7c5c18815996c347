//! Inventory engine: orchestration of store, event log, and cache.
//!
//! [`InventoryEngine`] owns the write sequence that keeps the three
//! components consistent. Every mutation follows the same shape:
//!
//! 1. validate the request
//! 2. probe the event log for a replayed idempotency key (sales only; other
//!    paths rely on the append-time uniqueness check alone)
//! 3. acquire the exclusive row lock and read the quantity under it
//! 4. enforce sufficiency for removals, recording a FAILED event on rejection
//! 5. append the SUCCESS event — the append is the atomic idempotency claim,
//!    so a racing identical retry loses here and never reaches the upsert
//! 6. upsert the new quantity within the same unit of work
//! 7. release the row and invalidate the cache entry
//!
//! Invalidation runs strictly after the commit. The inverse order would let
//! a concurrent reader re-fill the cache with the pre-commit quantity and
//! serve it for a full TTL.
//!
//! Cache faults on any path are absorbed: logged at `warn` and treated as a
//! miss (reads) or a no-op (invalidation). The TTL bounds the staleness a
//! lost invalidation can cause.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    cache::{CachedLevel, InventoryCache},
    error::{InventoryError, InventoryResult},
    events::EventLog,
    store::LedgerStore,
    types::{
        BatchKind, BatchOperation, BatchReport, EventStatus, EventType, LedgerEvent,
        MutationReceipt, RestockRequest, SaleRequest, StockKey, StockLevel, StockRecord,
    },
};

/// Concurrency-safe inventory ledger over a store, an event log, and a cache.
///
/// # Cloning
///
/// Cheaply cloneable; all clones share the same components. This is what the
/// resilience decorators rely on to re-issue an operation on retry.
pub struct InventoryEngine<S, E, C> {
    store: Arc<S>,
    log: Arc<E>,
    cache: Arc<C>,
}

impl<S, E, C> Clone for InventoryEngine<S, E, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            log: Arc::clone(&self.log),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<S, E, C> InventoryEngine<S, E, C>
where
    S: LedgerStore,
    E: EventLog,
    C: InventoryCache,
{
    /// Assembles an engine from its three components.
    pub fn new(store: S, log: E, cache: C) -> Self {
        Self { store: Arc::new(store), log: Arc::new(log), cache: Arc::new(cache) }
    }

    /// The underlying event log, for direct audit access.
    pub fn event_log(&self) -> &E {
        &self.log
    }

    // ── Reads ──

    /// Returns the current stock level for a `(store, product)` pair.
    ///
    /// Read-through: a cache hit skips the store entirely and is flagged
    /// `cached=true`; a miss reads the store and back-fills the cache.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] — empty identifier.
    /// - [`InventoryError::NotFound`] — the pair has never been written.
    /// - [`InventoryError::StoreUnavailable`] — store read failed on a cache miss.
    pub async fn get(&self, store_id: &str, product_id: &str) -> InventoryResult<StockLevel> {
        non_empty(store_id, "store_id")?;
        non_empty(product_id, "product_id")?;
        let key = StockKey::new(store_id, product_id);

        if let Some(level) = self.cached_level(&key).await {
            debug!(%key, quantity = level.quantity, "stock level served from cache");
            return Ok(StockLevel {
                store_id: key.store_id,
                product_id: key.product_id,
                quantity: level.quantity,
                last_updated: level.last_updated,
                cached: true,
            });
        }

        let record = self
            .store
            .read_plain(&key)
            .await?
            .ok_or_else(|| InventoryError::not_found(store_id, product_id))?;

        self.fill_cache(
            &key,
            CachedLevel { quantity: record.quantity, last_updated: record.last_updated },
        )
        .await;

        debug!(%key, quantity = record.quantity, "stock level served from store");
        Ok(StockLevel {
            store_id: key.store_id,
            product_id: key.product_id,
            quantity: record.quantity,
            last_updated: record.last_updated,
            cached: false,
        })
    }

    // ── Writes ──

    /// Removes stock for a sale.
    ///
    /// Idempotent on `event_id`: replaying an already-applied sale is
    /// rejected as [`InventoryError::DuplicateEvent`] without mutating
    /// anything. An insufficient-stock rejection records a FAILED audit
    /// event and leaves the quantity untouched.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] — empty identifier or zero quantity.
    /// - [`InventoryError::DuplicateEvent`] — the event id was already recorded.
    /// - [`InventoryError::InsufficientStock`] — fewer units on hand than requested.
    /// - [`InventoryError::Contention`] — the row lock wait timed out.
    /// - [`InventoryError::StoreUnavailable`] — store or log failure.
    pub async fn sell(&self, request: &SaleRequest) -> InventoryResult<MutationReceipt> {
        validate_mutation(&request.store_id, &request.product_id, request.quantity, &request.event_id)?;
        let key = StockKey::new(&request.store_id, &request.product_id);

        // Fast-path replay detection before taking the row lock. The append
        // inside the lock remains the authoritative uniqueness check.
        if self.log.exists(&request.event_id).await? {
            debug!(%key, event_id = %request.event_id, "sale replay detected");
            return Err(InventoryError::duplicate_event(&request.event_id));
        }

        let requested = request.quantity;
        let receipt = self
            .commit(&key, EventType::Sale, -i64_from(requested), &request.event_id)
            .await?;
        info!(
            %key,
            quantity = requested,
            remaining = receipt.quantity,
            event_id = %request.event_id,
            "sale committed"
        );
        Ok(receipt)
    }

    /// Adds stock from a restock delivery.
    ///
    /// First-touch friendly: restocking a never-seen `(store, product)` pair
    /// materializes its record at the delivered quantity.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] — empty identifier or zero quantity.
    /// - [`InventoryError::DuplicateEvent`] — the event id was already recorded.
    /// - [`InventoryError::Contention`] — the row lock wait timed out.
    /// - [`InventoryError::StoreUnavailable`] — store or log failure.
    pub async fn restock(&self, request: &RestockRequest) -> InventoryResult<MutationReceipt> {
        validate_mutation(&request.store_id, &request.product_id, request.quantity, &request.event_id)?;
        let key = StockKey::new(&request.store_id, &request.product_id);

        let receipt =
            self.commit(&key, EventType::Restock, i64_from(request.quantity), &request.event_id).await?;
        info!(
            %key,
            quantity = request.quantity,
            on_hand = receipt.quantity,
            event_id = %request.event_id,
            "restock committed"
        );
        Ok(receipt)
    }

    /// Applies a batch of stock adjustments for one store.
    ///
    /// Elements are processed independently and in order; one element's
    /// failure does not abort or roll back the others. The per-element
    /// outcomes are summarized in the returned [`BatchReport`] — an empty
    /// batch is itself reported as one failure. Each element records a SYNC
    /// audit event under a generated id.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] — empty store identifier. Per-element
    ///   problems are reported in the report, not as an `Err`.
    pub async fn batch_sync(
        &self,
        store_id: &str,
        operations: &[BatchOperation],
    ) -> InventoryResult<BatchReport> {
        non_empty(store_id, "store_id")?;

        let mut report = BatchReport::default();
        if operations.is_empty() {
            report.failure_count = 1;
            report.errors.push("batch contained no operations".into());
            return Ok(report);
        }

        for operation in operations {
            match self.apply_batch_element(store_id, operation).await {
                Ok(()) => report.success_count += 1,
                Err(error) => {
                    report.failure_count += 1;
                    report.errors.push(format!("{}: {error}", operation.product_id));
                },
            }
        }

        info!(
            store_id,
            succeeded = report.success_count,
            failed = report.failure_count,
            "batch sync finished"
        );
        Ok(report)
    }

    async fn apply_batch_element(
        &self,
        store_id: &str,
        operation: &BatchOperation,
    ) -> InventoryResult<()> {
        non_empty(&operation.product_id, "product_id")?;
        let key = StockKey::new(store_id, &operation.product_id);
        let event_id = format!("sync-{}", Uuid::new_v4());

        let delta = match operation.kind {
            BatchKind::Sale => {
                let units = operation.delta.unsigned_abs();
                if units == 0 {
                    return Err(InventoryError::validation("delta must not be zero"));
                }
                // i64::MIN negates out of range.
                if units > i64::MAX as u64 {
                    return Err(InventoryError::validation("delta exceeds the signed delta range"));
                }
                -i64_from(units)
            },
            BatchKind::Restock => {
                if operation.delta <= 0 {
                    return Err(InventoryError::validation("restock delta must be positive"));
                }
                operation.delta
            },
        };

        self.commit(&key, EventType::Sync, delta, &event_id).await?;
        Ok(())
    }

    // ── Audit queries ──

    /// Audit events for one product across all stores, newest first.
    pub async fn events_for_product(&self, product_id: &str) -> InventoryResult<Vec<LedgerEvent>> {
        non_empty(product_id, "product_id")?;
        self.log.for_product(product_id).await
    }

    /// Audit events for one store across all products, newest first.
    pub async fn events_for_store(&self, store_id: &str) -> InventoryResult<Vec<LedgerEvent>> {
        non_empty(store_id, "store_id")?;
        self.log.for_store(store_id).await
    }

    /// Audit events within an inclusive time range, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Validation`] if `from` is after `to`.
    pub async fn events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> InventoryResult<Vec<LedgerEvent>> {
        if from > to {
            return Err(InventoryError::validation("time range start is after its end"));
        }
        self.log.between(from, to).await
    }

    /// Audit events with the given status, oldest first.
    pub async fn events_with_status(
        &self,
        status: EventStatus,
    ) -> InventoryResult<Vec<LedgerEvent>> {
        self.log.with_status(status).await
    }

    // ── Write sequence core ──

    /// Applies one signed delta under the row lock, recording the audit
    /// event before the upsert so the event id acts as the atomic
    /// idempotency claim.
    async fn commit(
        &self,
        key: &StockKey,
        event_type: EventType,
        delta: i64,
        event_id: &str,
    ) -> InventoryResult<MutationReceipt> {
        let lock = self.store.read_for_update(key).await?;
        let current =
            lock.record().cloned().unwrap_or_else(|| StockRecord::fresh(key.clone()));
        let before = current.quantity;

        let after = if delta < 0 {
            let requested = delta.unsigned_abs();
            if requested > before {
                let failure = LedgerEvent::failed(
                    event_id,
                    event_type,
                    key,
                    before,
                    delta,
                    format!("Insufficient stock. Available: {before}, Requested: {requested}"),
                );
                if let Err(error) = self.log.append(failure).await {
                    warn!(%key, event_id, %error, "could not record rejected mutation");
                }
                return Err(InventoryError::insufficient_stock(before, requested));
            }
            before - requested
        } else {
            before.saturating_add(delta.unsigned_abs())
        };

        self.log
            .append(LedgerEvent::success(event_id, event_type, key, before, after, delta))
            .await?;

        let stored = self.store.upsert(&lock, StockRecord { quantity: after, ..current }).await?;
        drop(lock);

        self.invalidate(key).await;

        Ok(MutationReceipt {
            store_id: stored.key.store_id,
            product_id: stored.key.product_id,
            quantity: stored.quantity,
            quantity_before: before,
            event_id: event_id.to_owned(),
            last_updated: stored.last_updated,
        })
    }

    // ── Cache fault absorption ──

    async fn cached_level(&self, key: &StockKey) -> Option<CachedLevel> {
        match self.cache.get(key).await {
            Ok(level) => level,
            Err(error) => {
                warn!(%key, %error, "cache read failed, falling through to store");
                None
            },
        }
    }

    async fn fill_cache(&self, key: &StockKey, level: CachedLevel) {
        if let Err(error) = self.cache.set(key.clone(), level).await {
            warn!(%key, %error, "cache fill failed, entry skipped");
        }
    }

    async fn invalidate(&self, key: &StockKey) {
        if let Err(error) = self.cache.invalidate(key).await {
            warn!(%key, %error, "cache invalidation failed, stale entry expires by TTL");
        }
    }
}

fn non_empty(value: &str, field: &'static str) -> InventoryResult<()> {
    if value.trim().is_empty() {
        return Err(InventoryError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn validate_mutation(
    store_id: &str,
    product_id: &str,
    quantity: u64,
    event_id: &str,
) -> InventoryResult<()> {
    non_empty(store_id, "store_id")?;
    non_empty(product_id, "product_id")?;
    non_empty(event_id, "event_id")?;
    if quantity == 0 {
        return Err(InventoryError::validation("quantity must be at least 1"));
    }
    if quantity > i64::MAX as u64 {
        return Err(InventoryError::validation("quantity exceeds the signed delta range"));
    }
    Ok(())
}

fn i64_from(quantity: u64) -> i64 {
    i64::try_from(quantity).unwrap_or(i64::MAX)
}
