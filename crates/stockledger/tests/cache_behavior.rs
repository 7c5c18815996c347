//! Cache transparency: a broken or disabled cache changes latency, never
//! answers.

#![allow(clippy::unwrap_used)]

use stockledger::{
    CacheConfig, InventoryEngine, InventoryError, MemoryEventLog, MemoryLedgerStore,
    MokaInventoryCache, RestockRequest, SaleRequest, testutil::FlakyCache,
};

fn restock(quantity: u64, event_id: &str) -> RestockRequest {
    RestockRequest {
        store_id: "STORE_001".into(),
        product_id: "PROD_0001".into(),
        quantity,
        event_id: event_id.into(),
    }
}

fn sale(quantity: u64, event_id: &str) -> SaleRequest {
    SaleRequest {
        store_id: "STORE_001".into(),
        product_id: "PROD_0001".into(),
        quantity,
        event_id: event_id.into(),
    }
}

#[tokio::test]
async fn engine_works_identically_with_a_failing_cache() {
    let engine =
        InventoryEngine::new(MemoryLedgerStore::new(), MemoryEventLog::new(), FlakyCache);

    engine.restock(&restock(100, "r-1")).await.unwrap();
    engine.sell(&sale(30, "s-1")).await.unwrap();

    // Every read falls through to the store; none report a cache hit.
    for _ in 0..3 {
        let level = engine.get("STORE_001", "PROD_0001").await.unwrap();
        assert_eq!(level.quantity, 70);
        assert!(!level.cached);
    }

    let missing = engine.get("STORE_001", "PROD_MISSING").await;
    assert!(matches!(missing, Err(InventoryError::NotFound { .. })));
}

#[tokio::test]
async fn disabled_cache_never_reports_hits() {
    let engine = InventoryEngine::new(
        MemoryLedgerStore::new(),
        MemoryEventLog::new(),
        MokaInventoryCache::new(CacheConfig::disabled()),
    );

    engine.restock(&restock(42, "r-1")).await.unwrap();
    for _ in 0..3 {
        let level = engine.get("STORE_001", "PROD_0001").await.unwrap();
        assert!(!level.cached);
        assert_eq!(level.quantity, 42);
    }
}

#[tokio::test]
async fn cached_reads_always_reflect_the_latest_commit() {
    let engine = InventoryEngine::new(
        MemoryLedgerStore::new(),
        MemoryEventLog::new(),
        MokaInventoryCache::default(),
    );

    engine.restock(&restock(100, "r-1")).await.unwrap();
    assert_eq!(engine.get("STORE_001", "PROD_0001").await.unwrap().quantity, 100);

    // Interleave writes with cache-warming reads; the observed quantity must
    // track the committed value at every step.
    for step in 0u64..5 {
        engine.sell(&sale(10, &format!("s-{step}"))).await.unwrap();
        let expected = 100 - (step + 1) * 10;
        assert_eq!(engine.get("STORE_001", "PROD_0001").await.unwrap().quantity, expected);
        // Warm the cache and read once more.
        assert_eq!(engine.get("STORE_001", "PROD_0001").await.unwrap().quantity, expected);
    }
}
