//! Lock manager lifecycle on the in-memory backend with its lease reaper

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use d_lock::coordination::build_backend;
use d_lock::CoordinationConfig;
use d_lock::Error;
use d_lock::LockConfig;
use d_lock::LockError;
use d_lock::LockManager;
use d_lock::MemCoordinator;
use tokio_util::sync::CancellationToken;

use crate::enable_logger;

const LEASE: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_reaper_reclaims_abandoned_lease() {
    enable_logger();
    let backend = MemCoordinator::new(&CoordinationConfig {
        max_cleanup_duration_ms: 50,
        ..Default::default()
    });
    let shutdown = CancellationToken::new();
    backend.start_reaper(Duration::from_millis(10), shutdown.child_token());
    let manager = LockManager::new(Arc::new(backend.clone()), &LockConfig::default());

    let guard = manager
        .acquire("abandoned", Duration::from_secs(1), Duration::from_millis(30))
        .await
        .unwrap();
    std::mem::forget(guard);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(backend.lease_count(), 0);
    assert!(!manager.is_locked("abandoned").await.unwrap());

    shutdown.cancel();
}

#[tokio::test]
async fn test_built_backend_serves_waiters_in_turn() {
    enable_logger();
    let shutdown = CancellationToken::new();
    let backend = build_backend(&CoordinationConfig::default(), &shutdown).await.unwrap();
    let manager = LockManager::new(backend, &LockConfig::default());

    let first = manager.acquire("k", Duration::from_secs(1), LEASE).await.unwrap();
    let waiter = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.acquire("k", Duration::from_secs(3), LEASE).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    let released_at = Instant::now();
    assert!(first.release().await.unwrap());
    let second = waiter.await.unwrap().unwrap();

    assert!(released_at.elapsed() < Duration::from_secs(1));
    assert!(second.release().await.unwrap());
    shutdown.cancel();
}

#[tokio::test]
async fn test_shutdown_cancels_pending_waits() {
    enable_logger();
    let shutdown = CancellationToken::new();
    let backend = build_backend(&CoordinationConfig::default(), &shutdown).await.unwrap();
    let manager = LockManager::new(backend, &LockConfig::default());
    let _held = manager.acquire("k", Duration::from_secs(1), LEASE).await.unwrap();

    let waiter = {
        let manager = manager.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            manager
                .acquire_with_cancel("k", Duration::from_secs(10), LEASE, &shutdown)
                .await
                .map(|_| ())
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.cancel();

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Lock(LockError::Cancelled { .. })));
}

#[tokio::test]
async fn test_timeout_error_names_key_and_wait() {
    enable_logger();
    let manager = LockManager::new(Arc::new(MemCoordinator::default()), &LockConfig::default());
    let _held = manager.acquire("stock:lock:9", Duration::from_secs(1), LEASE).await.unwrap();

    let err = manager
        .acquire("stock:lock:9", Duration::from_millis(30), LEASE)
        .await
        .unwrap_err();

    match err {
        Error::Lock(LockError::Timeout { resource_key, waited }) => {
            assert_eq!(resource_key, "stock:lock:9");
            assert!(waited >= Duration::from_millis(30));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
