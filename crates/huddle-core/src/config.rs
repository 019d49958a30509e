//! Configuration model for the sync core.
//!
//! Loaded from `config.toml` by the infrastructure layer. Every field has a
//! default so a missing or partial file still yields a usable configuration.

use serde::{Deserialize, Serialize};

use crate::channel::DEFAULT_PAGE_SIZE;
use crate::error::{HuddleError, Result};

/// Default capacity of per-topic event buffers.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct HuddleConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HuddleConfig {
    /// Rejects values the sync core cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.sync.page_size == 0 {
            return Err(HuddleError::config("sync.page_size must be greater than 0"));
        }
        if self.sync.event_buffer == 0 {
            return Err(HuddleError::config(
                "sync.event_buffer must be greater than 0",
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(HuddleError::config("logging.level must not be empty"));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Messages requested per pagination fetch
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Capacity of each topic's event buffer
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            event_buffer: default_event_buffer(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: HuddleConfig = toml::from_str("[sync]\npage_size = 50\n").unwrap();
        assert_eq!(config.sync.page_size, 50);
        assert_eq!(config.sync.event_buffer, DEFAULT_EVENT_BUFFER);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = HuddleConfig::default();
        config.sync.page_size = 0;
        assert!(config.validate().unwrap_err().is_config());
    }

    #[test]
    fn test_default_is_valid() {
        assert!(HuddleConfig::default().validate().is_ok());
    }
}
