//! Coordination backend configuration
//!
//! Selects the service that stores lock leases and carries release
//! notifications.
//!
//! ```toml
//! [coordination]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379/"
//! subscriber_buffer_size = 16
//! reaper_enabled = true
//! reaper_interval_ms = 100
//! max_cleanup_duration_ms = 1
//! ```

use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationBackendKind {
    /// In-process lease table and pub/sub hub. Shared by every lock manager of
    /// one process, not across processes.
    #[default]
    Memory,
    /// Redis `SET NX PX` leases and Redis pub/sub. Requires the
    /// `redis-backend` feature.
    Redis,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CoordinationConfig {
    #[serde(default)]
    pub backend: CoordinationBackendKind,

    /// Connection URL, only used by the redis backend
    #[serde(default)]
    pub redis_url: String,

    /// Per-subscriber notification buffer
    ///
    /// A waiter only needs one pending message to wake up, extra messages
    /// are dropped when the buffer is full.
    ///
    /// Range: 1-1024
    /// Default: 16
    #[serde(default = "default_subscriber_buffer_size")]
    pub subscriber_buffer_size: usize,

    /// Run the background reaper of the memory backend
    ///
    /// The reaper removes expired leases and publishes a release for each one,
    /// so waiters wake as soon as a dead holder's lease runs out.
    #[serde(default = "default_reaper_enabled")]
    pub reaper_enabled: bool,

    /// Range: 10-60000
    /// Default: 100
    #[serde(default = "default_reaper_interval_ms")]
    pub reaper_interval_ms: u64,

    /// Maximum duration of one reaper scan
    ///
    /// Range: 1-100
    /// Default: 1
    #[serde(default = "default_max_cleanup_duration_ms")]
    pub max_cleanup_duration_ms: u64,
}

fn default_subscriber_buffer_size() -> usize {
    16
}

fn default_reaper_enabled() -> bool {
    true
}

fn default_reaper_interval_ms() -> u64 {
    100
}

fn default_max_cleanup_duration_ms() -> u64 {
    1
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            backend: CoordinationBackendKind::default(),
            redis_url: String::new(),
            subscriber_buffer_size: default_subscriber_buffer_size(),
            reaper_enabled: default_reaper_enabled(),
            reaper_interval_ms: default_reaper_interval_ms(),
            max_cleanup_duration_ms: default_max_cleanup_duration_ms(),
        }
    }
}

impl CoordinationConfig {
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=1024).contains(&self.subscriber_buffer_size) {
            return Err(Error::Config(ConfigError::Message(format!(
                "subscriber_buffer_size must be between 1 and 1024, got {}",
                self.subscriber_buffer_size
            ))));
        }

        match self.backend {
            CoordinationBackendKind::Memory => {
                if self.reaper_enabled {
                    if !(10..=60_000).contains(&self.reaper_interval_ms) {
                        return Err(Error::Config(ConfigError::Message(format!(
                            "reaper_interval_ms must be between 10 and 60000, got {}",
                            self.reaper_interval_ms
                        ))));
                    }
                    if !(1..=100).contains(&self.max_cleanup_duration_ms) {
                        return Err(Error::Config(ConfigError::Message(format!(
                            "max_cleanup_duration_ms must be between 1 and 100, got {}",
                            self.max_cleanup_duration_ms
                        ))));
                    }
                }
            }
            CoordinationBackendKind::Redis => {
                if self.redis_url.trim().is_empty() {
                    return Err(Error::Config(ConfigError::Message(
                        "redis_url is required when backend = \"redis\"".to_string(),
                    )));
                }
                if !cfg!(feature = "redis-backend") {
                    return Err(Error::Config(ConfigError::Message(
                        "backend = \"redis\" requires the `redis-backend` feature".to_string(),
                    )));
                }
            }
        }

        Ok(())
    }
}
