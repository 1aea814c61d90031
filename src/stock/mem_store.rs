use dashmap::DashMap;

use super::StockRecord;
use super::StockStore;
use crate::Result;

/// Stock records in process memory
#[derive(Debug, Default)]
pub struct MemStockStore {
    records: DashMap<u64, StockRecord>,
}

impl MemStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl StockStore for MemStockStore {
    fn find_by_id(
        &self,
        stock_id: u64,
    ) -> Result<Option<StockRecord>> {
        Ok(self.records.get(&stock_id).map(|r| r.value().clone()))
    }

    fn save(
        &self,
        record: &StockRecord,
    ) -> Result<()> {
        self.records.insert(record.id(), record.clone());
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        self.records.clear();
        Ok(())
    }
}
