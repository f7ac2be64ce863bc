//! Clean logic
//!
//! Removes build layouts: either every layout under `build/`, or the single
//! layout of one profile. Generated files and build outputs go with them;
//! the recipe and lock file are never touched.

use std::path::Path;

use crate::config::defaults::BUILD_DIR;
use crate::core::layout::{dir_size, BuildLayout};
use crate::error::FilesystemError;

/// Result of clean operation
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanResult {
    /// Layout directory names that were removed
    pub removed: Vec<String>,
    /// Bytes freed
    pub freed_bytes: u64,
}

impl CleanResult {
    /// Whether anything was removed
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

/// Remove every layout under `<project>/build`
pub fn clean_project(project_path: &Path) -> Result<CleanResult, FilesystemError> {
    let build_root = project_path.join(BUILD_DIR);
    if !build_root.exists() {
        return Ok(CleanResult::default());
    }

    let mut removed: Vec<String> = std::fs::read_dir(&build_root)
        .map_err(|e| FilesystemError::ReadFile {
            path: build_root.clone(),
            error: e.to_string(),
        })?
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    removed.sort();

    let freed_bytes = dir_size(&build_root);
    std::fs::remove_dir_all(&build_root).map_err(|e| FilesystemError::RemoveDir {
        path: build_root.clone(),
        error: e.to_string(),
    })?;
    tracing::info!("Removed {}", build_root.display());

    Ok(CleanResult {
        removed,
        freed_bytes,
    })
}

/// Remove a single layout
pub fn clean_layout(layout: &BuildLayout) -> Result<CleanResult, FilesystemError> {
    if !layout.exists() {
        return Ok(CleanResult::default());
    }

    let name = layout
        .build_dir()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let freed_bytes = layout.remove()?;
    tracing::info!("Removed {}", layout.build_dir().display());

    Ok(CleanResult {
        removed: vec![name],
        freed_bytes,
    })
}

/// Check if a project has any build layouts
pub fn has_build_artifacts(project_path: &Path) -> bool {
    project_path.join(BUILD_DIR).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings::Settings;
    use crate::test_utils::fixtures::linux_release;
    use tempfile::TempDir;

    fn populate(layout: &BuildLayout, bytes: usize) {
        layout.create().unwrap();
        std::fs::write(layout.generators_dir().join("out.cmake"), vec![b'x'; bytes]).unwrap();
    }

    #[test]
    fn test_clean_nothing() {
        let temp = TempDir::new().unwrap();
        let result = clean_project(temp.path()).unwrap();
        assert!(result.is_empty());
        assert!(!has_build_artifacts(temp.path()));
    }

    #[test]
    fn test_clean_all_layouts() {
        let temp = TempDir::new().unwrap();
        let release = BuildLayout::new(temp.path(), &linux_release());
        let debug = BuildLayout::new(
            temp.path(),
            &linux_release().with_overrides([("build_type", "Debug")]).unwrap(),
        );
        populate(&release, 100);
        populate(&debug, 50);
        std::fs::write(temp.path().join("kiln.toml"), "").unwrap();

        let result = clean_project(temp.path()).unwrap();
        assert_eq!(
            result.removed,
            vec!["linux-x86_64-gcc-debug", "linux-x86_64-gcc-release"]
        );
        assert_eq!(result.freed_bytes, 150);
        assert!(!has_build_artifacts(temp.path()));
        assert!(temp.path().join("kiln.toml").exists());
    }

    #[test]
    fn test_clean_single_layout() {
        let temp = TempDir::new().unwrap();
        let release = BuildLayout::new(temp.path(), &linux_release());
        let other: Settings = linux_release()
            .with_overrides([("compiler.version", "13")])
            .unwrap();
        let gcc13 = BuildLayout::new(temp.path(), &other);
        populate(&release, 10);
        populate(&gcc13, 20);

        let result = clean_layout(&gcc13).unwrap();
        assert_eq!(result.freed_bytes, 20);
        assert_eq!(result.removed.len(), 1);
        assert!(!gcc13.exists());
        assert!(release.exists());

        assert!(clean_layout(&gcc13).unwrap().is_empty());
    }
}
