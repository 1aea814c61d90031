//! Requires a Redis server. Run with
//! `REDIS_URL=redis://127.0.0.1:6379/ cargo test --features redis-backend -- --ignored`

use std::sync::Arc;
use std::time::Duration;

use d_lock::coordination::RedisCoordinator;
use d_lock::CoordinationBackend;
use d_lock::MemStockStore;
use d_lock::StockRecord;
use d_lock::StockStore;

use crate::common::facade_on;
use crate::common::STOCK_ID;
use crate::enable_logger;

async fn connect() -> Arc<dyn CoordinationBackend> {
    enable_logger();
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_string());
    Arc::new(RedisCoordinator::connect(&url, 16).await.expect("redis reachable"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "requires a running redis server"]
async fn test_redis_backed_contention() {
    let backend = connect().await;
    let store = Arc::new(MemStockStore::new());
    store.save(&StockRecord::new(STOCK_ID, 50)).unwrap();
    // Two managers stand in for two processes sharing the redis server.
    let facades = [facade_on(backend.clone(), store.clone()), facade_on(backend, store.clone())];

    let mut tasks = Vec::new();
    for i in 0..50 {
        let facade = facades[i % 2].clone();
        tasks.push(tokio::spawn(async move { facade.decrease(STOCK_ID, 1).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.find_by_id(STOCK_ID).unwrap().unwrap().quantity(), 0);
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn test_redis_release_wakes_subscriber() {
    let backend = connect().await;
    let key = format!("d-lock-test:{}", std::process::id());
    let channel = format!("{key}:release");

    assert!(backend.try_acquire(&key, "a", Duration::from_secs(5)).await.is_ok());
    let mut subscription = backend.subscribe(&channel).await.unwrap();

    assert!(!backend.release(&key, "b", &channel).await.unwrap());
    assert!(backend.release(&key, "a", &channel).await.unwrap());

    let message = tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .expect("release notification")
        .expect("subscription open");
    assert_eq!(message, "unlock");
    assert!(backend.holder(&key).await.unwrap().is_none());
}
