//! Platform-specific directory management
//!
//! Provides platform-specific paths for config and data directories.
//! Follows XDG Base Directory Specification on Linux and standard locations on macOS.
//!
//! Environment variables can override default directories:
//! - `KILN_CONFIG_DIR` - Override config directory
//! - `KILN_DATA_DIR` - Override data directory

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable names for directory overrides
pub const ENV_CONFIG_DIR: &str = "KILN_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "KILN_DATA_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "kiln";

/// Subdirectory names
const PROFILES_SUBDIR: &str = "profiles";
const PACKAGES_SUBDIR: &str = "packages";

/// Platform-specific directory provider for kiln
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KilnDirs {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl KilnDirs {
    /// Create a new `KilnDirs` instance
    ///
    /// Checks environment variables first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_dir: resolve(ENV_CONFIG_DIR, dirs::config_dir, &[".config"]),
            data_dir: resolve(ENV_DATA_DIR, dirs::data_dir, &[".local", "share"]),
        }
    }

    /// Use explicit directories
    #[must_use]
    pub fn from_paths(config_dir: &Path, data_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            data_dir: data_dir.to_path_buf(),
        }
    }

    /// Config directory
    /// - Linux: `$XDG_CONFIG_HOME/kiln` or `~/.config/kiln`
    /// - macOS: `~/Library/Application Support/kiln`
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Data directory
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Named profiles, `<config>/profiles/<name>.toml`
    #[must_use]
    pub fn profiles_dir(&self) -> PathBuf {
        self.config_dir.join(PROFILES_SUBDIR)
    }

    /// Default local package repository root
    #[must_use]
    pub fn packages_dir(&self) -> PathBuf {
        self.data_dir.join(PACKAGES_SUBDIR)
    }

    /// Path to `config.toml` in the config directory
    #[must_use]
    pub fn global_config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

impl Default for KilnDirs {
    fn default() -> Self {
        Self::new()
    }
}

/// Environment override, then platform directory, then a home-relative fallback
fn resolve(var: &str, platform: fn() -> Option<PathBuf>, fallback: &[&str]) -> PathBuf {
    if let Ok(path) = env::var(var) {
        return PathBuf::from(path);
    }

    platform().map(|p| p.join(APP_NAME)).unwrap_or_else(|| {
        let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        fallback
            .iter()
            .fold(base, |path, part| path.join(part))
            .join(APP_NAME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_new_creates_instance() {
        let dirs = KilnDirs::new();
        assert!(!dirs.config_dir().as_os_str().is_empty());
        assert!(!dirs.data_dir().as_os_str().is_empty());
    }

    #[test]
    fn test_profiles_dir_is_under_config_dir() {
        let dirs = KilnDirs::new();
        assert!(dirs.profiles_dir().starts_with(dirs.config_dir()));
    }

    #[test]
    fn test_packages_dir_is_under_data_dir() {
        let dirs = KilnDirs::from_paths(Path::new("/f"), Path::new("/d"));
        assert_eq!(dirs.packages_dir(), PathBuf::from("/d/packages"));
    }

    #[test]
    fn test_global_config_path_is_under_config_dir() {
        let dirs = KilnDirs::new();
        assert!(dirs.global_config_path().starts_with(dirs.config_dir()));
        assert!(dirs.global_config_path().ends_with("config.toml"));
    }
}
