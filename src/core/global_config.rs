//! Global configuration management
//!
//! Reads machine-wide settings from `config.toml` in the config directory:
//! the default package repository, the default profile, retry budget,
//! parallel jobs and stage timeouts.

use crate::config::defaults;
use crate::core::driver::StageTimeouts;
use crate::infra::dirs::KilnDirs;
use crate::registry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Global configuration error types
#[derive(Error, Debug)]
pub enum GlobalConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    ReadError { path: String, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    ParseError { path: String, error: String },
}

/// Global configuration for kiln
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Repository settings
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Default build options
    #[serde(default)]
    pub build: BuildConfig,
}

/// Repository configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Local repository root
    pub path: Option<PathBuf>,

    /// Attempts for transient fetch failures
    pub retries: Option<u32>,

    /// Initial retry delay in milliseconds
    pub backoff_ms: Option<u64>,
}

/// Default build options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Profile used when none is given
    pub profile: Option<String>,

    /// Default number of parallel jobs
    pub jobs: Option<usize>,

    /// Configure stage timeout in seconds
    pub configure_timeout: Option<u64>,

    /// Build stage timeout in seconds
    pub build_timeout: Option<u64>,
}

impl GlobalConfig {
    /// Load global configuration from the config directory
    ///
    /// A missing file yields the default configuration; an invalid one is an
    /// error.
    pub fn load(dirs: &KilnDirs) -> Result<Self, GlobalConfigError> {
        Self::load_from_path(&dirs.global_config_path())
    }

    /// Load global configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, GlobalConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| GlobalConfigError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| GlobalConfigError::ParseError {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Save global configuration to a specific path
    ///
    /// Creates parent directories if they don't exist.
    pub fn save_to_path(&self, path: &Path) -> Result<(), GlobalConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| GlobalConfigError::ReadError {
                path: parent.display().to_string(),
                error: e.to_string(),
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| GlobalConfigError::ParseError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        fs::write(path, content).map_err(|e| GlobalConfigError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Effective repository root
    #[must_use]
    pub fn repository_path(&self, dirs: &KilnDirs) -> PathBuf {
        self.repository
            .path
            .clone()
            .unwrap_or_else(|| dirs.packages_dir())
    }

    /// Effective retry policy
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let base = RetryPolicy::default();
        RetryPolicy::new(
            self.repository.retries.unwrap_or(base.max_attempts),
            self.repository
                .backoff_ms
                .map_or(base.base_delay, Duration::from_millis),
        )
    }

    /// Effective number of build jobs
    #[must_use]
    pub fn build_jobs(&self) -> usize {
        self.build.jobs.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Effective stage timeouts
    #[must_use]
    pub fn stage_timeouts(&self) -> StageTimeouts {
        StageTimeouts {
            configure: self
                .build
                .configure_timeout
                .or(defaults::CONFIGURE_TIMEOUT_SECS)
                .map(Duration::from_secs),
            build: self
                .build
                .build_timeout
                .or(defaults::BUILD_TIMEOUT_SECS)
                .map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert!(config.repository.path.is_none());
        assert!(config.build.profile.is_none());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.stage_timeouts(), StageTimeouts::default());
        assert!(config.build_jobs() >= 1);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config = GlobalConfig::load_from_path(&config_path).unwrap();
        assert_eq!(config, GlobalConfig::default());
    }

    #[test]
    fn test_load_valid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let content = r#"
[repository]
path = "/srv/kiln/packages"
retries = 5

[build]
profile = "linux-gcc13"
build_timeout = 3600
"#;
        fs::write(&config_path, content).unwrap();

        let config = GlobalConfig::load_from_path(&config_path).unwrap();
        let dirs = KilnDirs::new();
        assert_eq!(
            config.repository_path(&dirs),
            PathBuf::from("/srv/kiln/packages")
        );
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.build.profile.as_deref(), Some("linux-gcc13"));
        assert_eq!(
            config.stage_timeouts().build,
            Some(Duration::from_secs(3600))
        );
    }

    #[test]
    fn test_repository_defaults_to_data_dir() {
        let dirs = KilnDirs::from_paths(Path::new("/f"), Path::new("/d"));
        assert_eq!(
            GlobalConfig::default().repository_path(&dirs),
            PathBuf::from("/d/packages")
        );
    }

    #[test]
    fn test_load_invalid_toml_returns_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "invalid toml [[[").unwrap();

        let result = GlobalConfig::load_from_path(&config_path);
        assert!(matches!(result, Err(GlobalConfigError::ParseError { .. })));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let config = GlobalConfig {
            repository: RepositoryConfig {
                path: Some(PathBuf::from("/opt/packages")),
                retries: Some(2),
                backoff_ms: Some(100),
            },
            build: BuildConfig {
                profile: Some("default".to_string()),
                jobs: Some(8),
                configure_timeout: Some(60),
                build_timeout: None,
            },
        };

        config.save_to_path(&config_path).unwrap();
        let loaded = GlobalConfig::load_from_path(&config_path).unwrap();
        assert_eq!(loaded, config);
    }
}
