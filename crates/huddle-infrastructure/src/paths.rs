//! Path resolution for huddle configuration files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/huddle/            # Config directory (platform default)
//! └── config.toml              # Sync and logging configuration
//! ```

use std::path::{Path, PathBuf};

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Platform config directory could not be determined.
    ConfigDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::ConfigDirNotFound => write!(f, "Cannot find config directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Path management for huddle.
///
/// `base_dir` overrides the platform config directory, which keeps tests
/// away from the real user configuration.
pub struct HuddlePaths {
    base_dir: Option<PathBuf>,
}

impl HuddlePaths {
    pub fn new(base_dir: Option<&Path>) -> Self {
        Self {
            base_dir: base_dir.map(Path::to_path_buf),
        }
    }

    /// Returns the huddle configuration directory.
    pub fn config_dir(&self) -> Result<PathBuf, PathError> {
        match &self.base_dir {
            Some(base) => Ok(base.clone()),
            None => dirs::config_dir()
                .map(|dir| dir.join("huddle"))
                .ok_or(PathError::ConfigDirNotFound),
        }
    }

    /// Returns the path to the main configuration file.
    pub fn config_file(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_dir_override() {
        let paths = HuddlePaths::new(Some(Path::new("/tmp/huddle-test")));
        assert_eq!(
            paths.config_file().unwrap(),
            PathBuf::from("/tmp/huddle-test/config.toml")
        );
    }
}
