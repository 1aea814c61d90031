use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use d_lock::CoordinationBackend;
use d_lock::LockConfig;
use d_lock::LockManager;
use d_lock::MemCoordinator;
use d_lock::MemStockStore;
use d_lock::Result;
use d_lock::StockFacade;
use d_lock::StockRecord;
use d_lock::StockStore;

use crate::enable_logger;

pub const STOCK_ID: u64 = 1;

pub fn lock_config() -> LockConfig {
    LockConfig {
        wait_timeout_ms: 10_000,
        lease_duration_ms: 2_000,
        ..Default::default()
    }
}

/// Store that flags overlapping read-modify-write cycles on a record
///
/// Meant for unit decrements: a cycle starts at `find_by_id` and ends at
/// `save`, or right away when the record is missing or empty. Reads sleep
/// briefly to widen any race window.
#[derive(Debug, Default)]
pub struct OverlapProbeStore {
    inner: MemStockStore,
    inside: AtomicUsize,
    max_inside: AtomicUsize,
    writes: AtomicUsize,
}

impl OverlapProbeStore {
    pub fn seeded(record: StockRecord) -> Self {
        let store = Self::default();
        store.inner.save(&record).expect("memory store save");
        store
    }

    pub fn max_concurrent_cycles(&self) -> usize {
        self.max_inside.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl StockStore for OverlapProbeStore {
    fn find_by_id(
        &self,
        stock_id: u64,
    ) -> Result<Option<StockRecord>> {
        let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inside.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_micros(200));
        let found = self.inner.find_by_id(stock_id);
        if !matches!(found, Ok(Some(ref r)) if r.quantity() > 0) {
            // No save follows a rejected cycle.
            self.inside.fetch_sub(1, Ordering::SeqCst);
        }
        found
    }

    fn save(
        &self,
        record: &StockRecord,
    ) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let saved = self.inner.save(record);
        self.inside.fetch_sub(1, Ordering::SeqCst);
        saved
    }

    fn delete_all(&self) -> Result<()> {
        self.inner.delete_all()
    }
}

pub fn shared_backend() -> Arc<dyn CoordinationBackend> {
    enable_logger();
    Arc::new(MemCoordinator::default())
}

pub fn facade_on(
    backend: Arc<dyn CoordinationBackend>,
    store: Arc<dyn StockStore>,
) -> StockFacade {
    let config = lock_config();
    StockFacade::new(LockManager::new(backend, &config), store, config)
}
