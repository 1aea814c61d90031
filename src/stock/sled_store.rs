use std::path::Path;

use tracing::debug;
use tracing::warn;

use super::StockRecord;
use super::StockStore;
use crate::constants::STOCK_TREE_NAMESPACE;
use crate::Result;

/// Stock records persisted in a sled tree
///
/// Keys are big-endian ids, values bincode-encoded records. Every save is
/// flushed before it returns so a decrement acknowledged to a caller survives
/// a crash.
#[derive(Clone)]
pub struct SledStockStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl std::fmt::Debug for SledStockStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledStockStore")
            .field("tree_len", &self.tree.len())
            .finish()
    }
}

impl SledStockStore {
    pub fn open(path: impl AsRef<Path> + std::fmt::Debug) -> Result<Self> {
        debug!("open sled stock store from path: {:?}", &path);

        let db = sled::Config::default()
            .path(path.as_ref())
            .use_compression(true)
            .compression_factor(1)
            .flush_every_ms(Some(10))
            .open()
            .map_err(|e| {
                warn!("Try to open DB at this location: {:?} and failed: {:?}", path, e);
                e
            })?;
        Self::with_db(db)
    }

    pub fn with_db(db: sled::Db) -> Result<Self> {
        let tree = db.open_tree(STOCK_TREE_NAMESPACE)?;
        Ok(Self { db, tree })
    }

    pub fn flush(&self) -> Result<usize> {
        Ok(self.db.flush()?)
    }
}

impl StockStore for SledStockStore {
    fn find_by_id(
        &self,
        stock_id: u64,
    ) -> Result<Option<StockRecord>> {
        match self.tree.get(stock_id.to_be_bytes())? {
            Some(ivec) => Ok(Some(bincode::deserialize::<StockRecord>(&ivec)?)),
            None => Ok(None),
        }
    }

    fn save(
        &self,
        record: &StockRecord,
    ) -> Result<()> {
        let value = bincode::serialize(record)?;
        self.tree.insert(record.id().to_be_bytes(), value)?;
        self.tree.flush()?;
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        self.tree.clear()?;
        self.tree.flush()?;
        Ok(())
    }
}
