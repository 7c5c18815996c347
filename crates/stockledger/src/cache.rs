//! Read-through cache for inventory levels.
//!
//! The cache is an optional accelerator, never a source of truth. Entries
//! expire after a fixed TTL and are invalidated after every committed write,
//! so a crash between commit and invalidation leaves at worst a
//! stale-but-expiring entry — an eventual-consistency window bounded by the
//! TTL.
//!
//! The engine treats every cache fault as a miss/no-op; a cache failure must
//! never fail a request. [`MokaInventoryCache`] itself is infallible, but
//! the trait is fallible so that degraded backends (a remote cache, a test
//! double) slot in behind the same absorption logic.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;

use crate::{config::ConfigError, error::InventoryResult, types::StockKey};

/// Default maximum number of cache entries.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Default entry TTL (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Minimum allowed TTL.
const MIN_TTL: Duration = Duration::from_secs(1);

/// Transient, TTL-bounded projection of one stock record's quantity.
///
/// Not authoritative; may be silently absent or stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedLevel {
    /// Quantity at the time the entry was populated.
    pub quantity: u64,
    /// `last_updated` of the record the entry was projected from.
    pub last_updated: DateTime<Utc>,
}

/// Configuration for the read-through cache.
///
/// # Validation
///
/// - `ttl` must be at least 1 second
/// - `max_entries` must be at least 1
///
/// Use [`CacheConfig::disabled()`] to turn caching off entirely; every read
/// then goes to the store and `cached=true` is never observed.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    ttl: Duration,
    max_entries: u64,
    enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL, max_entries: DEFAULT_MAX_ENTRIES, enabled: true }
    }
}

#[bon::bon]
impl CacheConfig {
    /// Creates a validated cache configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `ttl` is under 1 second or `max_entries`
    /// is zero.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_TTL)] ttl: Duration,
        #[builder(default = DEFAULT_MAX_ENTRIES)] max_entries: u64,
    ) -> Result<Self, ConfigError> {
        if ttl < MIN_TTL {
            return Err(ConfigError::BelowMinimum {
                field: "ttl",
                min: "1s".into(),
                value: format!("{}ms", ttl.as_millis()),
            });
        }
        if max_entries == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "max_entries",
                min: "1".into(),
                value: "0".into(),
            });
        }
        Ok(Self { ttl, max_entries, enabled: true })
    }

    /// Creates a disabled cache configuration (all operations no-ops).
    #[must_use]
    pub fn disabled() -> Self {
        Self { ttl: Duration::ZERO, max_entries: 0, enabled: false }
    }

    /// Returns the entry TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the maximum number of entries.
    #[must_use]
    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }

    /// Returns whether caching is enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

/// Key-value front for read queries.
///
/// All operations are best-effort from the engine's perspective: an `Err`
/// from any of them is absorbed, logged, and treated as a miss/no-op.
#[async_trait]
pub trait InventoryCache: Send + Sync {
    /// Looks up the cached level for a key.
    async fn get(&self, key: &StockKey) -> InventoryResult<Option<CachedLevel>>;

    /// Stores a level under the configured TTL.
    async fn set(&self, key: StockKey, level: CachedLevel) -> InventoryResult<()>;

    /// Removes the entry for a key, if present.
    async fn invalidate(&self, key: &StockKey) -> InventoryResult<()>;
}

/// TTL cache over [`moka`].
///
/// Expiry is TTL-only; no further eviction policy is required of this
/// component beyond the `max_entries` capacity bound.
pub struct MokaInventoryCache {
    cache: Option<Cache<StockKey, CachedLevel>>,
}

impl MokaInventoryCache {
    /// Creates a cache from the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let cache = config.enabled.then(|| {
            Cache::builder().max_capacity(config.max_entries).time_to_live(config.ttl).build()
        });
        Self { cache }
    }
}

impl Default for MokaInventoryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[async_trait]
impl InventoryCache for MokaInventoryCache {
    async fn get(&self, key: &StockKey) -> InventoryResult<Option<CachedLevel>> {
        match &self.cache {
            Some(cache) => Ok(cache.get(key).await),
            None => Ok(None),
        }
    }

    async fn set(&self, key: StockKey, level: CachedLevel) -> InventoryResult<()> {
        if let Some(cache) = &self.cache {
            cache.insert(key, level).await;
        }
        Ok(())
    }

    async fn invalidate(&self, key: &StockKey) -> InventoryResult<()> {
        if let Some(cache) = &self.cache {
            cache.invalidate(key).await;
        }
        Ok(())
    }
}
