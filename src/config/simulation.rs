//! Parameters of the contention run driven by the `d-lock` binary

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SimulationConfig {
    #[serde(default = "default_stock_id")]
    pub stock_id: u64,

    /// Quantity the record is seeded with before the run
    #[serde(default = "default_initial_quantity")]
    pub initial_quantity: u64,

    /// Number of concurrent `decrease` calls
    #[serde(default = "default_callers")]
    pub callers: usize,

    /// Amount each caller takes
    #[serde(default = "default_amount")]
    pub amount: u64,
}

fn default_stock_id() -> u64 {
    1
}

fn default_initial_quantity() -> u64 {
    100
}

fn default_callers() -> usize {
    100
}

fn default_amount() -> u64 {
    1
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            stock_id: default_stock_id(),
            initial_quantity: default_initial_quantity(),
            callers: default_callers(),
            amount: default_amount(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.callers == 0 || self.amount == 0 || self.initial_quantity == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "simulation callers, amount and initial_quantity must be positive, got {}/{}/{}",
                self.callers, self.amount, self.initial_quantity
            ))));
        }
        Ok(())
    }
}
