//! Build layout
//!
//! Every (project, settings) pair gets its own directory under `build/`:
//!
//! ```text
//! <project>/build/<os>-<arch>-<compiler>-<build_type>[-<hash8>]/
//!     generators/      emitted build-tool input
//! ```
//!
//! The `-<hash8>` suffix appears only when sub-settings are present, so two
//! profiles differing in `compiler.version` never share a directory.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::config::defaults::{BUILD_DIR, GENERATORS_DIR};
use crate::core::settings::Settings;
use crate::error::FilesystemError;

/// Filesystem scope for one project and profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    project_dir: PathBuf,
    build_dir: PathBuf,
}

impl BuildLayout {
    /// Layout for `settings` under `project_dir`
    pub fn new(project_dir: &Path, settings: &Settings) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            build_dir: project_dir.join(BUILD_DIR).join(Self::dir_name(settings)),
        }
    }

    /// Directory name for a profile
    pub fn dir_name(settings: &Settings) -> String {
        let base = format!(
            "{}-{}-{}-{}",
            settings.os(),
            settings.arch(),
            settings.compiler(),
            settings.build_type()
        )
        .to_lowercase();

        if !settings.has_sub_settings() {
            return base;
        }

        let digest = Sha256::digest(settings.key().as_bytes());
        format!("{base}-{}", &hex::encode(digest)[..8])
    }

    /// Project source directory
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Build output directory
    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Directory receiving generator output
    pub fn generators_dir(&self) -> PathBuf {
        self.build_dir.join(GENERATORS_DIR)
    }

    /// Whether the build directory exists
    pub fn exists(&self) -> bool {
        self.build_dir.is_dir()
    }

    /// Create the build and generators directories
    pub fn create(&self) -> Result<(), FilesystemError> {
        let generators = self.generators_dir();
        std::fs::create_dir_all(&generators).map_err(|e| FilesystemError::CreateDir {
            path: generators,
            error: e.to_string(),
        })
    }

    /// Remove the build directory, returning the bytes freed
    pub fn remove(&self) -> Result<u64, FilesystemError> {
        if !self.exists() {
            return Ok(0);
        }
        let size = dir_size(&self.build_dir);
        std::fs::remove_dir_all(&self.build_dir).map_err(|e| FilesystemError::RemoveDir {
            path: self.build_dir.clone(),
            error: e.to_string(),
        })?;
        tracing::debug!("Removed {}", self.build_dir.display());
        Ok(size)
    }
}

/// Total size of regular files under `path`
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
