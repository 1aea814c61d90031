use serde::Deserialize;
use serde::Serialize;

use crate::StockError;

/// Stock of one product
///
/// `quantity` is unsigned and [`StockRecord::decrease`] refuses to go below
/// zero, so a persisted record is never negative.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StockRecord {
    id: u64,
    quantity: u64,
}

impl StockRecord {
    pub fn new(
        id: u64,
        quantity: u64,
    ) -> Self {
        Self { id, quantity }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    /// Removes `amount` units.
    ///
    /// Leaves the record untouched on error.
    pub fn decrease(
        &mut self,
        amount: u64,
    ) -> std::result::Result<(), StockError> {
        if amount == 0 {
            return Err(StockError::InvalidAmount(amount));
        }
        match self.quantity.checked_sub(amount) {
            Some(left) => {
                self.quantity = left;
                Ok(())
            }
            None => Err(StockError::InsufficientStock {
                stock_id: self.id,
                available: self.quantity,
                requested: amount,
            }),
        }
    }
}
