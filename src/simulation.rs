//! Contention run: many concurrent callers decrement one stock record

use std::fmt;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::Result;
use crate::SimulationConfig;
use crate::StockFacade;
use crate::StockRecord;
use crate::StockStore;

/// Outcome counts of a contention run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentionReport {
    pub succeeded: usize,
    pub insufficient: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub final_quantity: u64,
}

impl ContentionReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.insufficient + self.timed_out + self.cancelled + self.failed
    }
}

impl fmt::Display for ContentionReport {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "succeeded={} insufficient={} timed_out={} cancelled={} failed={} final_quantity={}",
            self.succeeded, self.insufficient, self.timed_out, self.cancelled, self.failed, self.final_quantity
        )
    }
}

/// Seeds the record, then runs `config.callers` concurrent decreases.
///
/// Callers still waiting when `cancel` fires are counted as cancelled.
pub async fn run_contention(
    facade: &StockFacade,
    store: &dyn StockStore,
    config: &SimulationConfig,
    cancel: &CancellationToken,
) -> Result<ContentionReport> {
    store.save(&StockRecord::new(config.stock_id, config.initial_quantity))?;
    info!(
        stock_id = config.stock_id,
        quantity = config.initial_quantity,
        callers = config.callers,
        "Starting contention run"
    );

    let mut callers = JoinSet::new();
    for _ in 0..config.callers {
        let facade = facade.clone();
        let cancel = cancel.clone();
        let (stock_id, amount) = (config.stock_id, config.amount);
        callers.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => None,
                outcome = facade.decrease(stock_id, amount) => Some(outcome),
            }
        });
    }

    let mut report = ContentionReport::default();
    while let Some(joined) = callers.join_next().await {
        match joined? {
            None => report.cancelled += 1,
            Some(Ok(_)) => report.succeeded += 1,
            Some(Err(e)) if e.is_insufficient_stock() => report.insufficient += 1,
            Some(Err(e)) if e.is_lock_timeout() => report.timed_out += 1,
            Some(Err(e)) => {
                warn!("Caller failed: {:?}", e);
                report.failed += 1;
            }
        }
    }

    report.final_quantity = store
        .find_by_id(config.stock_id)?
        .map(|record| record.quantity())
        .unwrap_or_default();

    info!(%report, "Contention run finished");
    Ok(report)
}
