//! Lock timing and key naming configuration
//!
//! ```toml
//! [lock]
//! wait_timeout_ms = 10000
//! lease_duration_ms = 1000
//! key_prefix = "stock:lock:"
//! channel_prefix = "stock:lock:release:"
//! ```

use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_LOCK_KEY_PREFIX;
use crate::constants::DEFAULT_RELEASE_CHANNEL_PREFIX;
use crate::Error;
use crate::Result;

/// Bounds used by the decrement facade when it takes a stock lock
///
/// `lease_duration_ms` must exceed the expected critical section duration.
/// A holder that dies keeps the lock at most this long.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LockConfig {
    /// How long `acquire` may wait for the lock before failing with a timeout
    ///
    /// Range: 1-600000
    /// Default: 10000 (10 seconds)
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Lease after which the backend reclaims an unreleased lock
    ///
    /// Range: 10-3600000
    /// Default: 1000 (1 second)
    #[serde(default = "default_lease_duration_ms")]
    pub lease_duration_ms: u64,

    /// Prefix of the resource key, the stock id is appended
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Prefix of the release notification channel, the resource key is appended
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
}

fn default_wait_timeout_ms() -> u64 {
    10_000
}

fn default_lease_duration_ms() -> u64 {
    1_000
}

fn default_key_prefix() -> String {
    DEFAULT_LOCK_KEY_PREFIX.to_string()
}

fn default_channel_prefix() -> String {
    DEFAULT_RELEASE_CHANNEL_PREFIX.to_string()
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
            lease_duration_ms: default_lease_duration_ms(),
            key_prefix: default_key_prefix(),
            channel_prefix: default_channel_prefix(),
        }
    }
}

impl LockConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=600_000).contains(&self.wait_timeout_ms) {
            return Err(Error::Config(ConfigError::Message(format!(
                "lock wait_timeout_ms must be between 1 and 600000, got {}",
                self.wait_timeout_ms
            ))));
        }

        if !(10..=3_600_000).contains(&self.lease_duration_ms) {
            return Err(Error::Config(ConfigError::Message(format!(
                "lock lease_duration_ms must be between 10 and 3600000, got {}",
                self.lease_duration_ms
            ))));
        }

        if self.key_prefix.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "lock key_prefix cannot be empty".to_string(),
            )));
        }

        // Sharing a prefix would let a release message collide with a lock key.
        if self.channel_prefix.trim().is_empty() || self.channel_prefix == self.key_prefix {
            return Err(Error::Config(ConfigError::Message(format!(
                "lock channel_prefix must be non-empty and differ from key_prefix, got {:?}",
                self.channel_prefix
            ))));
        }

        Ok(())
    }
}
