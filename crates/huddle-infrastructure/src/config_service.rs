//! Configuration service implementation.
//!
//! This module provides a ConfigService that loads the sync configuration
//! from the configuration file (~/.config/huddle/config.toml).

use crate::paths::HuddlePaths;
use huddle_core::config::HuddleConfig;
use huddle_core::error::{HuddleError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Overrides `sync.page_size`.
pub const ENV_PAGE_SIZE: &str = "HUDDLE_PAGE_SIZE";
/// Overrides `logging.level`.
pub const ENV_LOG_LEVEL: &str = "HUDDLE_LOG";

/// Configuration service that loads and caches the configuration.
///
/// A missing file yields defaults; a malformed or invalid file is an error.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    /// Cached configuration loaded from file.
    config: Arc<RwLock<Option<HuddleConfig>>>,
}

impl ConfigService {
    /// Creates a ConfigService reading from the default location.
    pub fn new() -> Result<Self> {
        let path = HuddlePaths::new(None)
            .config_file()
            .map_err(|e| HuddleError::config(e.to_string()))?;
        Ok(Self::with_path(path))
    }

    /// Creates a ConfigService reading from an explicit file.
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config: Arc::new(RwLock::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets the configuration, loading from file if not cached.
    pub fn get_config(&self) -> Result<HuddleConfig> {
        if let Some(cached) = self
            .config
            .read()
            .map_err(|e| HuddleError::internal(e.to_string()))?
            .as_ref()
        {
            return Ok(cached.clone());
        }

        let loaded = Self::apply_env_overrides(Self::load_config(&self.path)?)?;
        loaded.validate()?;

        *self
            .config
            .write()
            .map_err(|e| HuddleError::internal(e.to_string()))? = Some(loaded.clone());

        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        if let Ok(mut write_lock) = self.config.write() {
            *write_lock = None;
        }
    }

    fn load_config(path: &Path) -> Result<HuddleConfig> {
        if !path.exists() {
            tracing::debug!("[ConfigService] {} not found, using defaults", path.display());
            return Ok(HuddleConfig::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: HuddleConfig = toml::from_str(&content)?;
        tracing::info!("[ConfigService] Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn apply_env_overrides(mut config: HuddleConfig) -> Result<HuddleConfig> {
        if let Ok(value) = std::env::var(ENV_PAGE_SIZE) {
            config.sync.page_size = value.parse().map_err(|_| {
                HuddleError::config(format!("{ENV_PAGE_SIZE} must be a positive integer, got '{value}'"))
            })?;
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            config.logging.level = level;
        }
        Ok(config)
    }

    /// Writes `config` to the service's path, creating parent directories.
    pub fn save(&self, config: &HuddleConfig) -> Result<()> {
        config.validate()?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string_pretty(config)?)?;
        self.invalidate_cache();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let service = ConfigService::with_path(dir.path().join("config.toml"));
        let config = service.get_config().unwrap();
        assert_eq!(config.sync, HuddleConfig::default().sync);
    }

    #[test]
    fn test_loads_and_caches_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync]\nevent_buffer = 8\n").unwrap();

        let service = ConfigService::with_path(&path);
        assert_eq!(service.get_config().unwrap().sync.event_buffer, 8);

        std::fs::write(&path, "[sync]\nevent_buffer = 16\n").unwrap();
        assert_eq!(service.get_config().unwrap().sync.event_buffer, 8);

        service.invalidate_cache();
        assert_eq!(service.get_config().unwrap().sync.event_buffer, 16);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync]\nevent_buffer = 0\n").unwrap();

        let err = ConfigService::with_path(&path).get_config().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_save_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let service = ConfigService::with_path(dir.path().join("nested").join("config.toml"));
        let mut config = HuddleConfig::default();
        config.logging.json = true;

        service.save(&config).unwrap();
        assert!(service.get_config().unwrap().logging.json);
    }
}
