//! Fault-injecting components for integration tests.
//!
//! Enabled by the `testutil` feature. These doubles implement the same
//! traits as the production components so they slot straight into an
//! [`InventoryEngine`](crate::InventoryEngine).

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;

use crate::{
    cache::{CachedLevel, InventoryCache},
    error::{InventoryError, InventoryResult},
    store::{LedgerStore, MemoryLedgerStore, RowLock},
    types::{StockKey, StockRecord},
};

/// A cache whose every operation fails.
///
/// Used to verify that the engine absorbs cache faults: reads fall through
/// to the store, writes skip the fill, and invalidation failures are
/// tolerated.
#[derive(Debug, Default, Clone)]
pub struct FlakyCache;

#[async_trait]
impl InventoryCache for FlakyCache {
    async fn get(&self, _key: &StockKey) -> InventoryResult<Option<CachedLevel>> {
        Err(InventoryError::internal("cache offline"))
    }

    async fn set(&self, _key: StockKey, _level: CachedLevel) -> InventoryResult<()> {
        Err(InventoryError::internal("cache offline"))
    }

    async fn invalidate(&self, _key: &StockKey) -> InventoryResult<()> {
        Err(InventoryError::internal("cache offline"))
    }
}

/// A [`MemoryLedgerStore`] wrapper with a toggleable outage.
///
/// While failing, every operation returns
/// [`InventoryError::StoreUnavailable`]; flipping the toggle restores the
/// untouched inner store. Used to exercise retry and circuit breaker paths.
#[derive(Clone)]
pub struct FailingStore {
    inner: MemoryLedgerStore,
    failing: Arc<AtomicBool>,
}

impl FailingStore {
    /// Creates a healthy store around a fresh [`MemoryLedgerStore`].
    #[must_use]
    pub fn new() -> Self {
        Self { inner: MemoryLedgerStore::new(), failing: Arc::new(AtomicBool::new(false)) }
    }

    /// Starts or stops the simulated outage.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> InventoryResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(InventoryError::store_unavailable("simulated outage"));
        }
        Ok(())
    }
}

impl Default for FailingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for FailingStore {
    async fn read_for_update(&self, key: &StockKey) -> InventoryResult<RowLock> {
        self.check()?;
        self.inner.read_for_update(key).await
    }

    async fn read_plain(&self, key: &StockKey) -> InventoryResult<Option<StockRecord>> {
        self.check()?;
        self.inner.read_plain(key).await
    }

    async fn upsert(&self, lock: &RowLock, record: StockRecord) -> InventoryResult<StockRecord> {
        self.check()?;
        self.inner.upsert(lock, record).await
    }
}
