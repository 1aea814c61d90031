//! Distributed Lock Error Hierarchy
//!
//! Defines the error types surfaced by the lock manager, the coordination
//! backends and the locked decrement facade, categorized by layer.
//!
//! Only the typed outcomes below cross the facade boundary. Raw backend
//! failures are wrapped in [`SystemError`] before they reach a caller.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (storage, coordination backend, tasks)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Lock acquisition and release failures
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Business-rule rejections on stock records
    #[error(transparent)]
    Stock(#[from] StockError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// Stock store failures
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Coordination backend failures
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// Background task failures
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    /// The critical section panicked. The lock was released before this error surfaced.
    #[error("Critical section panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Serialization failures for persisted records
    #[error(transparent)]
    BincodeError(#[from] bincode::Error),

    /// Embedded database errors
    #[error(transparent)]
    SledError(#[from] sled::Error),

    /// Generic database errors raised by custom store implementations
    #[error("Embedded database error: {0}")]
    DbError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// Backend unreachable or refused the command
    #[error("Coordination backend unavailable: {0}")]
    Unavailable(String),

    /// The release channel subscription was closed by the backend
    #[error("Subscription to {channel} closed")]
    SubscriptionClosed { channel: String },

    /// Redis client errors
    #[cfg(feature = "redis-backend")]
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The wait for the lock exceeded the configured bound
    #[error("Timed out after {waited:?} waiting for lock {resource_key}")]
    Timeout {
        resource_key: String,
        waited: Duration,
    },

    /// The waiter was cancelled before the lock was granted
    #[error("Wait for lock {resource_key} cancelled")]
    Cancelled { resource_key: String },

    /// The handle no longer owns the lock (released or lease expired)
    #[error("Lock {resource_key} is not held by {holder}")]
    NotHeld {
        resource_key: String,
        holder: String,
    },

    /// Release could not reach the coordination backend
    #[error("Failed to release lock {resource_key}: {source}")]
    Release {
        resource_key: String,
        #[source]
        source: CoordinationError,
    },

    /// Empty or malformed resource key
    #[error("Invalid lock key: {0}")]
    InvalidKey(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StockError {
    /// Referenced stock id does not exist
    #[error("Stock {0} not found")]
    NotFound(u64),

    /// Not enough quantity left to satisfy the decrement
    #[error("Insufficient stock for {stock_id}: available {available}, requested {requested}")]
    InsufficientStock {
        stock_id: u64,
        available: u64,
        requested: u64,
    },

    /// Decrement amount must be positive
    #[error("Invalid decrement amount: {0}")]
    InvalidAmount(u64),
}

impl Error {
    /// True when the lock could not be obtained within the wait bound.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Error::Lock(LockError::Timeout { .. }))
    }

    pub fn is_insufficient_stock(&self) -> bool {
        matches!(self, Error::Stock(StockError::InsufficientStock { .. }))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Stock(StockError::NotFound(_)))
    }
}

// ===== System Error conversions =====

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<CoordinationError> for Error {
    fn from(e: CoordinationError) -> Self {
        Error::System(SystemError::Coordination(e))
    }
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::System(SystemError::Storage(StorageError::SledError(e)))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::System(SystemError::Storage(StorageError::BincodeError(e)))
    }
}

impl From<JoinError> for Error {
    fn from(e: JoinError) -> Self {
        Error::System(SystemError::TaskFailed(e))
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::System(SystemError::Coordination(CoordinationError::Redis(e)))
    }
}
