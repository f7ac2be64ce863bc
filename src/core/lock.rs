//! Lock file handling
//!
//! The lock file (kiln.lock) records the resolved version, configuration
//! hash and dependencies of every package for one profile, so later runs
//! can check that resolution is reproducible.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::core::resolver::ResolvedGraph;
use crate::core::settings::Settings;
use crate::error::{FilesystemError, KilnError};

/// Current lock file format version
pub const LOCK_FORMAT_VERSION: u32 = 1;

/// Lock file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockFile {
    /// Lock file format version
    pub version: u32,

    /// Canonical settings key the packages were resolved for
    pub profile: String,

    /// Locked packages by name
    #[serde(default)]
    pub packages: BTreeMap<String, LockedPackage>,
}

/// A locked package entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedPackage {
    /// Exact version
    pub version: String,

    /// Full configuration hash
    pub config_hash: String,

    /// Dependencies (package names)
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Effective options
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl LockFile {
    /// Create an empty lock file for `profile`
    pub fn new(profile: String) -> Self {
        Self {
            version: LOCK_FORMAT_VERSION,
            profile,
            packages: BTreeMap::new(),
        }
    }

    /// Record every package of a resolved graph
    pub fn from_graph(graph: &ResolvedGraph, settings: &Settings) -> Self {
        let mut lock = Self::new(settings.key());
        for node in graph.nodes() {
            lock.add_package(
                node.name.clone(),
                LockedPackage {
                    version: node.version.clone(),
                    config_hash: node.config_hash().to_string(),
                    dependencies: node.dependencies.clone(),
                    options: node.options.clone(),
                },
            );
        }
        lock
    }

    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load from `path`; `Ok(None)` when the file does not exist
    pub fn load(path: &Path) -> Result<Option<Self>, KilnError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let lock = Self::from_toml(&content).map_err(|e| KilnError::LockMismatch {
            message: format!("cannot parse {}: {e}", path.display()),
        })?;
        Ok(Some(lock))
    }

    /// Write to `path`
    pub fn save(&self, path: &Path) -> Result<(), KilnError> {
        let content = self.to_toml().map_err(|e| KilnError::Generic(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Ok(())
    }

    /// Add a locked package
    pub fn add_package(&mut self, name: String, package: LockedPackage) {
        self.packages.insert(name, package);
    }

    /// Human-readable differences from `other`, empty when equivalent
    pub fn diff(&self, other: &Self) -> Vec<String> {
        let mut changes = Vec::new();
        if self.profile != other.profile {
            changes.push(format!("profile: {} -> {}", self.profile, other.profile));
        }
        for (name, ours) in &self.packages {
            match other.packages.get(name) {
                None => changes.push(format!("{name}: removed")),
                Some(theirs) if ours.version != theirs.version => {
                    changes.push(format!("{name}: {} -> {}", ours.version, theirs.version));
                }
                Some(theirs) if ours != theirs => {
                    changes.push(format!("{name}: configuration changed"));
                }
                Some(_) => {}
            }
        }
        for (name, theirs) in &other.packages {
            if !self.packages.contains_key(name) {
                changes.push(format!("{name}: added at {}", theirs.version));
            }
        }
        changes
    }

    /// Fail with [`KilnError::LockMismatch`] unless `other` matches
    pub fn verify(&self, other: &Self) -> Result<(), KilnError> {
        let changes = self.diff(other);
        if changes.is_empty() {
            return Ok(());
        }
        Err(KilnError::LockMismatch {
            message: changes.join(", "),
        })
    }
}

impl Default for LockFile {
    fn default() -> Self {
        Self::new(String::new())
    }
}
