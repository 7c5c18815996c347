//! Ledger store trait and in-memory implementation.
//!
//! The [`LedgerStore`] is the durable table of per-`(store, product)`
//! quantities and the single source of truth for the non-negativity
//! invariant. Write paths go through [`read_for_update`](LedgerStore::read_for_update),
//! which hands back a [`RowLock`] — an exclusive, droppable unit-of-work
//! guard scoped to one key. The read path uses
//! [`read_plain`](LedgerStore::read_plain), which never blocks writers and
//! is never blocked by them.
//!
//! # Locking model
//!
//! Row-level exclusive locking is the sole correctness mechanism for
//! write/write races: two concurrent mutations of the same key serialize at
//! `read_for_update`; mutations of different keys proceed fully in parallel.
//! Lock acquisition has a bounded wait ([`StoreConfig::lock_timeout`]) after
//! which the operation fails with [`InventoryError::Contention`] rather than
//! hanging.
//!
//! # Implementing a store
//!
//! A durable backend (e.g. a SQL database with `SELECT ... FOR UPDATE`)
//! implements the same trait: acquire the row lock, wrap its lease in a
//! [`RowLock`], and map storage faults to
//! [`InventoryError::StoreUnavailable`]. See [`MemoryLedgerStore`] for the
//! reference implementation.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::{
    config::ConfigError,
    error::{InventoryError, InventoryResult},
    types::{StockKey, StockRecord},
};

/// Default bound on the row-lock wait.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for [`MemoryLedgerStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Maximum time to wait for a row lock before reporting contention.
    #[serde(with = "humantime_serde", default = "default_lock_timeout")]
    pub(crate) lock_timeout: Duration,
}

fn default_lock_timeout() -> Duration {
    DEFAULT_LOCK_TIMEOUT
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { lock_timeout: DEFAULT_LOCK_TIMEOUT }
    }
}

#[bon::bon]
impl StoreConfig {
    /// Creates a validated store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `lock_timeout` is zero.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_LOCK_TIMEOUT)] lock_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if lock_timeout.is_zero() {
            return Err(ConfigError::MustBePositive { field: "lock_timeout", value: "0s".into() });
        }
        Ok(Self { lock_timeout })
    }

    /// Returns the row-lock wait bound.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }
}

/// Exclusive unit-of-work guard for one stock row.
///
/// Produced by [`LedgerStore::read_for_update`]. Holding a `RowLock` blocks
/// every other `read_for_update` on the same key; dropping it ends the unit
/// of work and releases the row. The locked snapshot taken at acquisition
/// time is available through [`record`](RowLock::record) — `None` means the
/// row has never been written and the caller decides whether to materialize
/// a zero-quantity record.
pub struct RowLock {
    key: StockKey,
    record: Option<StockRecord>,
    /// Backend-specific lock lease, released on drop.
    _lease: Box<dyn std::any::Any + Send + Sync>,
}

impl RowLock {
    /// Wraps a backend lock lease into a row guard.
    ///
    /// Store implementations call this after acquiring their exclusive row
    /// lock; the lease is held until the guard is dropped.
    pub fn new(
        key: StockKey,
        record: Option<StockRecord>,
        lease: impl std::any::Any + Send + Sync,
    ) -> Self {
        Self { key, record, _lease: Box::new(lease) }
    }

    /// The key this guard locks.
    #[must_use]
    pub fn key(&self) -> &StockKey {
        &self.key
    }

    /// The snapshot read under the lock, or `None` for a never-written row.
    #[must_use]
    pub fn record(&self) -> Option<&StockRecord> {
        self.record.as_ref()
    }
}

impl std::fmt::Debug for RowLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowLock")
            .field("key", &self.key)
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

/// Durable table of per-key stock quantities with row-level locking.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Acquires the exclusive row lock for `key` and reads the row under it.
    ///
    /// Blocks other `read_for_update` callers on the same key until the
    /// returned [`RowLock`] is dropped; callers on different keys are never
    /// blocked.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Contention`] — the lock wait exceeded the configured bound.
    /// - [`InventoryError::StoreUnavailable`] — the backend failed.
    #[must_use = "dropping the returned RowLock releases the row"]
    async fn read_for_update(&self, key: &StockKey) -> InventoryResult<RowLock>;

    /// Unlocked read for the cache-miss fill path.
    ///
    /// May observe a value slightly stale relative to an in-flight writer,
    /// which is acceptable because this path never mutates.
    async fn read_plain(&self, key: &StockKey) -> InventoryResult<Option<StockRecord>>;

    /// Persists a record within the unit of work held by `lock`.
    ///
    /// The store bumps `version`, stamps `last_updated`, and preserves
    /// `created_at` for existing rows. Presenting the `RowLock` is the
    /// caller's proof that the locking protocol was followed; a lock for a
    /// different key is an internal error.
    async fn upsert(&self, lock: &RowLock, record: StockRecord) -> InventoryResult<StockRecord>;
}

/// In-memory [`LedgerStore`] using per-key async mutexes as row locks.
///
/// The reference implementation: rows live in a [`HashMap`] behind a
/// [`parking_lot::RwLock`]; each key gets a lazily-created
/// [`tokio::sync::Mutex`] whose owned guard serves as the row-lock lease.
///
/// # Cloning
///
/// `MemoryLedgerStore` is cheaply cloneable via [`Arc`]; all clones share
/// the same rows and row locks.
#[derive(Clone)]
pub struct MemoryLedgerStore {
    rows: Arc<RwLock<HashMap<StockKey, StockRecord>>>,
    row_locks: Arc<Mutex<HashMap<StockKey, Arc<tokio::sync::Mutex<()>>>>>,
    lock_timeout: Duration,
}

impl MemoryLedgerStore {
    /// Creates a store with the default lock timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a store with the given configuration.
    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            row_locks: Arc::new(Mutex::new(HashMap::new())),
            lock_timeout: config.lock_timeout,
        }
    }

    /// Returns the per-key lock mutex, creating it on first touch.
    fn lock_for(&self, key: &StockKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.row_locks.lock();
        Arc::clone(locks.entry(key.clone()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))))
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn read_for_update(&self, key: &StockKey) -> InventoryResult<RowLock> {
        let mutex = self.lock_for(key);
        let lease = tokio::time::timeout(self.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| InventoryError::Contention)?;

        // Snapshot under the row lock: no other writer can commit this key
        // until the returned guard drops.
        let record = self.rows.read().get(key).cloned();
        Ok(RowLock::new(key.clone(), record, lease))
    }

    async fn read_plain(&self, key: &StockKey) -> InventoryResult<Option<StockRecord>> {
        Ok(self.rows.read().get(key).cloned())
    }

    async fn upsert(&self, lock: &RowLock, record: StockRecord) -> InventoryResult<StockRecord> {
        if lock.key() != &record.key {
            return Err(InventoryError::internal(format!(
                "row lock for {} presented for upsert of {}",
                lock.key(),
                record.key,
            )));
        }

        let mut rows = self.rows.write();
        let now = Utc::now();
        let stored = match rows.get(&record.key) {
            Some(existing) => StockRecord {
                created_at: existing.created_at,
                last_updated: now,
                version: existing.version + 1,
                ..record
            },
            None => StockRecord { last_updated: now, version: 1, ..record },
        };
        rows.insert(stored.key.clone(), stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn key(product: &str) -> StockKey {
        StockKey::new("STORE_001", product)
    }

    #[tokio::test]
    async fn first_touch_reads_none() {
        let store = MemoryLedgerStore::new();
        let lock = store.read_for_update(&key("P1")).await.unwrap();
        assert!(lock.record().is_none());
    }

    #[tokio::test]
    async fn upsert_bumps_version_and_preserves_created_at() {
        let store = MemoryLedgerStore::new();
        let k = key("P1");

        let lock = store.read_for_update(&k).await.unwrap();
        let mut record = StockRecord::fresh(k.clone());
        record.quantity = 10;
        let first = store.upsert(&lock, record).await.unwrap();
        drop(lock);
        assert_eq!(first.version, 1);

        let lock = store.read_for_update(&k).await.unwrap();
        let mut record = lock.record().cloned().unwrap();
        record.quantity = 25;
        let second = store.upsert(&lock, record).await.unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.quantity, 25);
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn same_key_contention_times_out() {
        let config =
            StoreConfig::builder().lock_timeout(Duration::from_millis(50)).build().unwrap();
        let store = MemoryLedgerStore::with_config(config);
        let k = key("P1");

        let held = store.read_for_update(&k).await.unwrap();
        let result = store.read_for_update(&k).await;
        assert!(matches!(result, Err(InventoryError::Contention)));
        drop(held);

        // Released — acquisition succeeds again.
        assert!(store.read_for_update(&k).await.is_ok());
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let config =
            StoreConfig::builder().lock_timeout(Duration::from_millis(50)).build().unwrap();
        let store = MemoryLedgerStore::with_config(config);

        let _held = store.read_for_update(&key("P1")).await.unwrap();
        assert!(store.read_for_update(&key("P2")).await.is_ok());
    }

    #[tokio::test]
    async fn row_lock_unit_of_work_runs_inside_a_spawned_task() {
        // tokio::spawn demands a Send future; the guard is held across the
        // upsert await, so this exercises RowLock's thread-safety bounds.
        let store = MemoryLedgerStore::new();
        let k = key("P1");

        let handle = tokio::spawn({
            let store = store.clone();
            let k = k.clone();
            async move {
                let lock = store.read_for_update(&k).await.unwrap();
                let mut record = StockRecord::fresh(k);
                record.quantity = 3;
                store.upsert(&lock, record).await.unwrap()
            }
        });

        let stored = handle.await.unwrap();
        assert_eq!(stored.quantity, 3);
        assert_eq!(store.read_plain(&k).await.unwrap().unwrap().quantity, 3);
    }

    #[tokio::test]
    async fn read_plain_does_not_block_on_held_row_lock() {
        let store = MemoryLedgerStore::new();
        let k = key("P1");

        let lock = store.read_for_update(&k).await.unwrap();
        let mut record = StockRecord::fresh(k.clone());
        record.quantity = 7;
        store.upsert(&lock, record).await.unwrap();

        // Lock still held; plain read sees the committed value anyway.
        let plain = store.read_plain(&k).await.unwrap().unwrap();
        assert_eq!(plain.quantity, 7);
    }

    #[tokio::test]
    async fn upsert_with_foreign_lock_is_rejected() {
        let store = MemoryLedgerStore::new();
        let lock = store.read_for_update(&key("P1")).await.unwrap();

        let mut record = StockRecord::fresh(key("P2"));
        record.quantity = 1;
        let result = store.upsert(&lock, record).await;
        assert!(matches!(result, Err(InventoryError::Internal { .. })));
    }

    #[test]
    fn zero_lock_timeout_rejected() {
        let result = StoreConfig::builder().lock_timeout(Duration::ZERO).build();
        assert!(result.is_err());
    }
}
