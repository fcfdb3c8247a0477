//! Engine configuration, loaded from JSON with every field optional.
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::constants::{DEFAULT_CACHE_TTL_SECS, DEFAULT_STORE_TIMEOUT_SECS};
use crate::stance_card::StanceCharPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config JSON could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds a corpus snapshot is served before the next read reloads it
    pub cache_ttl_secs: u64,
    /// Upper bound on any single backing-store call
    pub store_timeout_secs: u64,
    pub stance_char_policy: StanceCharPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            store_timeout_secs: DEFAULT_STORE_TIMEOUT_SECS,
            stance_char_policy: StanceCharPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is out of range.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its content is invalid.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// # Errors
    ///
    /// Returns an error naming the first zero-valued duration.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::Zero {
                field: "cache_ttl_secs",
            });
        }
        if self.store_timeout_secs == 0 {
            return Err(ConfigError::Zero {
                field: "store_timeout_secs",
            });
        }
        Ok(())
    }

    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}
