//! Concurrent decrements through the facade
//!
//! - 100 callers on a stock of 100 drain it to exactly 0
//! - More callers than stock never drive it negative
//! - No two read-modify-write cycles overlap on one record
//! - Independent managers on one backend exclude each other
//! - Sled-backed records end up consistent

use std::sync::Arc;
use std::time::Duration;

use d_lock::Error;
use d_lock::MemStockStore;
use d_lock::SledStockStore;
use d_lock::StockFacade;
use d_lock::StockRecord;
use d_lock::StockStore;
use tempfile::tempdir;

use crate::common::facade_on;
use crate::common::shared_backend;
use crate::common::OverlapProbeStore;
use crate::common::STOCK_ID;

async fn decrease_concurrently(
    facades: &[StockFacade],
    callers: usize,
) -> Vec<Result<StockRecord, Error>> {
    let mut tasks = Vec::with_capacity(callers);
    for i in 0..callers {
        let facade = facades[i % facades.len()].clone();
        tasks.push(tokio::spawn(async move { facade.decrease(STOCK_ID, 1).await }));
    }
    let mut outcomes = Vec::with_capacity(callers);
    for task in tasks {
        outcomes.push(task.await.expect("caller task panicked"));
    }
    outcomes
}

#[tokio::test(flavor = "multi_thread", worker_threads = 32)]
async fn test_hundred_callers_drain_hundred_units() {
    let store = Arc::new(OverlapProbeStore::seeded(StockRecord::new(STOCK_ID, 100)));
    let facade = facade_on(shared_backend(), store.clone());

    let outcomes = decrease_concurrently(&[facade.clone()], 100).await;

    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert_eq!(store.find_by_id(STOCK_ID).unwrap().unwrap().quantity(), 0);
    assert_eq!(store.writes(), 100);
    assert_eq!(store.max_concurrent_cycles(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 16)]
async fn test_more_callers_than_stock_never_go_negative() {
    let store = Arc::new(OverlapProbeStore::seeded(StockRecord::new(STOCK_ID, 40)));
    let facade = facade_on(shared_backend(), store.clone());

    let outcomes = decrease_concurrently(&[facade], 100).await;

    let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
    let insufficient = outcomes
        .iter()
        .filter(|o| matches!(o, Err(e) if e.is_insufficient_stock()))
        .count();
    assert_eq!(succeeded, 40);
    assert_eq!(insufficient, 60);
    assert_eq!(store.find_by_id(STOCK_ID).unwrap().unwrap().quantity(), 0);
    assert_eq!(store.writes(), 40);
    assert_eq!(store.max_concurrent_cycles(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 16)]
async fn test_independent_managers_share_one_backend() {
    let backend = shared_backend();
    let store = Arc::new(OverlapProbeStore::seeded(StockRecord::new(STOCK_ID, 60)));
    let facades: Vec<_> = (0..3).map(|_| facade_on(backend.clone(), store.clone())).collect();

    let outcomes = decrease_concurrently(&facades, 60).await;

    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert_eq!(store.find_by_id(STOCK_ID).unwrap().unwrap().quantity(), 0);
    assert_eq!(store.max_concurrent_cycles(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_lock_is_free_after_contention() {
    let store = Arc::new(MemStockStore::new());
    store.save(&StockRecord::new(STOCK_ID, 5)).unwrap();
    let facade = facade_on(shared_backend(), store);

    decrease_concurrently(&[facade.clone()], 10).await;

    let key = facade.resource_key(STOCK_ID);
    let guard = facade
        .lock_manager()
        .try_acquire(&key, Duration::from_secs(1))
        .await
        .unwrap();
    assert!(guard.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_other_stock_progresses_while_one_is_held() {
    let store = Arc::new(MemStockStore::new());
    store.save(&StockRecord::new(1, 10)).unwrap();
    store.save(&StockRecord::new(2, 10)).unwrap();
    let facade = facade_on(shared_backend(), store.clone());

    let _held = facade
        .lock_manager()
        .acquire(&facade.resource_key(1), Duration::from_secs(1), Duration::from_secs(10))
        .await
        .unwrap();

    for _ in 0..10 {
        tokio::time::timeout(Duration::from_secs(1), facade.decrease(2, 1))
            .await
            .expect("stock 2 blocked by the lock of stock 1")
            .unwrap();
    }
    assert_eq!(store.find_by_id(2).unwrap().unwrap().quantity(), 0);
    assert_eq!(store.find_by_id(1).unwrap().unwrap().quantity(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 16)]
async fn test_sled_backed_contention() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SledStockStore::open(dir.path().join("db")).unwrap());
    store.save(&StockRecord::new(STOCK_ID, 50)).unwrap();
    let facade = facade_on(shared_backend(), store.clone());

    let outcomes = decrease_concurrently(&[facade], 50).await;

    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert_eq!(store.find_by_id(STOCK_ID).unwrap().unwrap().quantity(), 0);
}
