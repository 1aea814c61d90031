//! Locked stock decrement
//!
//! [`StockFacade::decrease`] is the only operation that mutates a stock
//! record. It holds the record's distributed lock around the whole
//! read-modify-write:
//!
//! ```text
//! decrease(id, amount)
//!   └─ with_lock("stock:lock:{id}")
//!        ├─ find_by_id(id)          None → StockError::NotFound
//!        ├─ record.decrease(amount) short → StockError::InsufficientStock (no write)
//!        └─ save(record)
//!      release (every exit path)
//! ```


use std::sync::Arc;

use tracing::debug;
use tracing::error;

use crate::metrics;
use crate::LockConfig;
use crate::LockManager;
use crate::Result;
use crate::StockError;
use crate::StockRecord;
use crate::StockStore;

#[derive(Clone)]
pub struct StockFacade {
    locks: LockManager,
    store: Arc<dyn StockStore>,
    config: LockConfig,
}

impl std::fmt::Debug for StockFacade {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("StockFacade")
            .field("locks", &self.locks)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StockFacade {
    pub fn new(
        locks: LockManager,
        store: Arc<dyn StockStore>,
        config: LockConfig,
    ) -> Self {
        Self { locks, store, config }
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    /// Lock name guarding `stock_id`
    pub fn resource_key(
        &self,
        stock_id: u64,
    ) -> String {
        format!("{}{}", self.config.key_prefix, stock_id)
    }

    /// Unlocked read of the current record
    pub fn find(
        &self,
        stock_id: u64,
    ) -> Result<Option<StockRecord>> {
        self.store.find_by_id(stock_id)
    }

    /// Removes `amount` units from stock `stock_id` under its distributed lock.
    ///
    /// Returns the record as persisted. Concurrent calls on the same id are
    /// serialized, calls on different ids do not block each other.
    ///
    /// # Errors
    /// - `StockError::InvalidAmount` for `amount == 0`, before any lock is taken
    /// - `StockError::NotFound` when no record exists
    /// - `StockError::InsufficientStock` when `amount` exceeds the quantity,
    ///   nothing is written
    /// - `LockError::Timeout` when the lock was not granted within the
    ///   configured wait, the record is untouched
    pub async fn decrease(
        &self,
        stock_id: u64,
        amount: u64,
    ) -> Result<StockRecord> {
        if amount == 0 {
            metrics::record_decrease("invalid");
            return Err(StockError::InvalidAmount(amount).into());
        }

        let resource_key = self.resource_key(stock_id);
        let store = self.store.clone();

        let outcome = self
            .locks
            .with_lock(
                &resource_key,
                self.config.wait_timeout(),
                self.config.lease_duration(),
                move || async move { decrease_locked(store.as_ref(), stock_id, amount) },
            )
            .await;

        metrics::record_decrease(outcome_label(&outcome));
        outcome
    }
}

fn decrease_locked(
    store: &dyn StockStore,
    stock_id: u64,
    amount: u64,
) -> Result<StockRecord> {
    let mut record = match store.find_by_id(stock_id) {
        Ok(Some(record)) => record,
        Ok(None) => return Err(StockError::NotFound(stock_id).into()),
        Err(e) => {
            error!(stock_id, "Failed to load stock record: {:?}", e);
            return Err(e);
        }
    };

    if let Err(e) = record.decrease(amount) {
        debug!(stock_id, amount, available = record.quantity(), "Decrease rejected");
        return Err(e.into());
    }

    if let Err(e) = store.save(&record) {
        error!(stock_id, "Failed to save stock record: {:?}", e);
        return Err(e);
    }

    debug!(stock_id, amount, quantity = record.quantity(), "Stock decreased");
    Ok(record)
}

fn outcome_label(outcome: &Result<StockRecord>) -> &'static str {
    match outcome {
        Ok(_) => "ok",
        Err(e) if e.is_insufficient_stock() => "insufficient",
        Err(e) if e.is_not_found() => "not_found",
        Err(e) if e.is_lock_timeout() => "timeout",
        Err(_) => "error",
    }
}
