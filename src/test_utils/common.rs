use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::coordination::MemCoordinator;
use crate::LockConfig;
use crate::LockManager;
use crate::MemStockStore;
use crate::Result;
use crate::StockFacade;
use crate::StockRecord;
use crate::StockStore;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    env_logger::init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// Lock settings short enough for tests to observe timeouts and expiry
pub fn test_lock_config() -> LockConfig {
    LockConfig {
        wait_timeout_ms: 5_000,
        lease_duration_ms: 2_000,
        ..Default::default()
    }
}

/// Store wrapper counting reads and writes
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemStockStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingStore {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl StockStore for CountingStore {
    fn find_by_id(
        &self,
        stock_id: u64,
    ) -> Result<Option<StockRecord>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_id(stock_id)
    }

    fn save(
        &self,
        record: &StockRecord,
    ) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.save(record)
    }

    fn delete_all(&self) -> Result<()> {
        self.inner.delete_all()
    }
}

/// Facade over a fresh in-memory backend and the given store
pub fn memory_facade(store: Arc<dyn StockStore>) -> (MemCoordinator, StockFacade) {
    enable_logger();
    let backend = MemCoordinator::default();
    let config = test_lock_config();
    let locks = LockManager::new(Arc::new(backend.clone()), &config);
    (backend, StockFacade::new(locks, store, config))
}
