//! Stock store configuration

use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    Memory,
    Sled,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,

    /// Database directory, required by the sled backend
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend == StorageBackendKind::Sled {
            match &self.db_path {
                Some(path) if !path.as_os_str().is_empty() => {}
                _ => {
                    return Err(Error::Config(ConfigError::Message(
                        "storage db_path is required when backend = \"sled\"".to_string(),
                    )));
                }
            }
        }
        Ok(())
    }
}
