//! Host-level runtime settings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for one [`Host`](crate::Host). Durations are carried as
/// milliseconds so a plain TOML file can express them.
///
/// ```toml
/// supervise_timeout_ms = 5000
/// shutdown_grace_ms = 10000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Upper bound on a cross-host supervision round-trip. `None` waits
    /// forever; expiry is fatal for the raising executor.
    pub supervise_timeout_ms: Option<u64>,

    /// How long `shutdown` waits for local executors to drain.
    pub shutdown_grace_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            supervise_timeout_ms: None,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl HostConfig {
    /// Load settings from a TOML file and validate them.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: HostConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shutdown_grace_ms == 0 {
            return Err(ConfigError::Invalid(
                "shutdown_grace_ms must be positive".to_string(),
            ));
        }
        if self.supervise_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "supervise_timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn supervise_timeout(&self) -> Option<Duration> {
        self.supervise_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
