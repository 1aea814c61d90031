//! Distributed lock over a publish/subscribe coordination service, used to
//! serialize read-modify-write decrements of stock records.
//!
//! ```text
//! StockFacade::decrease ──► LockManager::with_lock ──► CoordinationBackend
//!         │                                              (lease table + release channels)
//!         └──────────────► StockStore (inside the lock)
//! ```

mod config;
pub mod constants;
pub mod coordination;
mod errors;
mod facade;
mod lock;
mod metrics;
mod simulation;
mod stock;

pub use crate::config::*;
pub use coordination::CoordinationBackend;
pub use coordination::MemCoordinator;
pub use errors::*;
pub use facade::*;
pub use lock::*;
pub use metrics::gather_metrics;
pub use simulation::*;
pub use stock::*;


//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
