//! Stock records and their persistence
//!
//! A [`StockStore`] is a plain keyed store: it does not serialize concurrent
//! read-modify-write cycles. Callers that decrement stock go through
//! [`crate::StockFacade`], which holds the record's distributed lock around
//! the load, decrease and save.

mod mem_store;
mod record;
mod sled_store;

#[cfg(test)]
mod store_test;

pub use mem_store::*;
pub use record::*;
pub use sled_store::*;

use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tracing::info;

use crate::Result;
use crate::StorageBackendKind;
use crate::StorageConfig;

#[cfg_attr(test, automock)]
pub trait StockStore: Send + Sync + 'static {
    fn find_by_id(
        &self,
        stock_id: u64,
    ) -> Result<Option<StockRecord>>;

    /// Inserts or overwrites the record with the same id.
    fn save(
        &self,
        record: &StockRecord,
    ) -> Result<()>;

    fn delete_all(&self) -> Result<()>;
}

pub fn build_store(config: &StorageConfig) -> Result<Arc<dyn StockStore>> {
    match config.backend {
        StorageBackendKind::Memory => {
            info!("Using in-memory stock store");
            Ok(Arc::new(MemStockStore::new()))
        }
        StorageBackendKind::Sled => {
            let path = config.db_path.clone().unwrap_or_default();
            let store = SledStockStore::open(&path)?;
            info!(?path, "Using sled stock store");
            Ok(Arc::new(store))
        }
    }
}
