//! Filesystem package repository
//!
//! Layout of a repository root:
//!
//! ```text
//! <root>/<name>/<version>/package.toml      descriptor
//! <root>/<name>/<version>/package/          binary package (any config)
//! <root>/<name>/<version>/binaries/<hash>/  binary package for one config
//! ```
//!
//! `<hash>` is the 16-character [`ConfigHash::short`] prefix.

use std::path::{Path, PathBuf};

use crate::core::hash::ConfigHash;
use crate::core::package::PackageDescriptor;
use crate::core::requirement::VersionSpec;
use crate::core::settings::Settings;
use crate::error::RepositoryError;
use crate::registry::{ArtifactHandle, PackageMetadata, PackageRepository};

/// Descriptor file name inside a version directory
pub const DESCRIPTOR_FILE: &str = "package.toml";

/// Repository reading package descriptors from a directory tree
#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    /// Create a repository rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Repository root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a descriptor into the index, creating directories as needed
    pub fn publish(&self, descriptor: &PackageDescriptor) -> Result<PathBuf, RepositoryError> {
        let dir = self
            .root
            .join(&descriptor.package.name)
            .join(&descriptor.package.version);
        std::fs::create_dir_all(dir.join("package")).map_err(|e| RepositoryError::Io {
            path: dir.clone(),
            error: e.to_string(),
        })?;

        let path = dir.join(DESCRIPTOR_FILE);
        let content = descriptor.to_toml().map_err(|e| RepositoryError::Parse {
            path: path.clone(),
            error: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| RepositoryError::Io {
            path: path.clone(),
            error: e.to_string(),
        })?;
        Ok(dir)
    }

    /// Versions of `name` that carry a descriptor
    async fn versions(&self, name: &str) -> Result<Vec<String>, RepositoryError> {
        let dir = self.root.join(name);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RepositoryError::Io {
                    path: dir,
                    error: e.to_string(),
                })
            }
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| RepositoryError::Io {
            path: dir.clone(),
            error: e.to_string(),
        })? {
            if entry.path().join(DESCRIPTOR_FILE).is_file() {
                versions.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        versions.sort();
        Ok(versions)
    }
}

impl PackageRepository for LocalRepository {
    async fn lookup(
        &self,
        name: &str,
        spec: &VersionSpec,
        _settings: &Settings,
    ) -> Result<PackageMetadata, RepositoryError> {
        let versions = self.versions(name).await?;
        let version = spec
            .select(versions.iter().map(String::as_str))
            .ok_or_else(|| RepositoryError::NotFound {
                name: name.to_string(),
                version: spec.to_string(),
            })?;

        let dir = self.root.join(name).join(version);
        let path = dir.join(DESCRIPTOR_FILE);
        tracing::debug!("Reading package descriptor {}", path.display());

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| RepositoryError::Io {
                path: path.clone(),
                error: e.to_string(),
            })?;
        let descriptor =
            PackageDescriptor::from_toml(&content).map_err(|e| RepositoryError::Parse {
                path: path.clone(),
                error: e.to_string(),
            })?;

        if descriptor.package.name != name || descriptor.package.version != version {
            return Err(RepositoryError::Parse {
                path,
                error: format!(
                    "descriptor declares {}/{} but is stored as {name}/{version}",
                    descriptor.package.name, descriptor.package.version
                ),
            });
        }

        let artifact = ArtifactHandle::new(name, version, dir.display().to_string());
        descriptor
            .to_metadata(artifact)
            .map_err(|e| RepositoryError::Parse {
                path,
                error: e.to_string(),
            })
    }

    async fn fetch(
        &self,
        artifact: &ArtifactHandle,
        config: &ConfigHash,
    ) -> Result<PathBuf, RepositoryError> {
        let dir = PathBuf::from(&artifact.locator);
        let per_config = dir.join("binaries").join(config.short());
        if per_config.is_dir() {
            return Ok(per_config);
        }

        let generic = dir.join("package");
        if generic.is_dir() {
            return Ok(generic);
        }

        Err(RepositoryError::NotFound {
            name: artifact.name.clone(),
            version: format!("{} (binary {})", artifact.version, config.short()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalRepository) {
        let temp = TempDir::new().unwrap();
        let repo = LocalRepository::new(temp.path());
        repo.publish(&PackageDescriptor::new("fmt", "10.2.1")).unwrap();
        repo.publish(&PackageDescriptor::new("fmt", "11.1.3")).unwrap();
        repo.publish(&PackageDescriptor::new("spdlog", "1.15.1").requires("fmt/[>=10]"))
            .unwrap();
        (temp, repo)
    }

    #[tokio::test]
    async fn test_lookup_reads_descriptor() {
        let (_temp, repo) = setup();
        let meta = repo
            .lookup("spdlog", &VersionSpec::Exact("1.15.1".into()), &Settings::detect())
            .await
            .unwrap();
        assert_eq!(meta.name, "spdlog");
        assert_eq!(meta.requirements.iter().next().unwrap().name, "fmt");
    }

    #[tokio::test]
    async fn test_lookup_range_picks_highest() {
        let (_temp, repo) = setup();
        let spec = VersionSpec::parse("fmt", "[>=10]").unwrap();
        let meta = repo.lookup("fmt", &spec, &Settings::detect()).await.unwrap();
        assert_eq!(meta.resolved_version, "11.1.3");
    }

    #[tokio::test]
    async fn test_lookup_unknown_package() {
        let (_temp, repo) = setup();
        let err = repo
            .lookup("opencv", &VersionSpec::Exact("4.11.0".into()), &Settings::detect())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_lookup_rejects_mismatched_descriptor() {
        let (temp, repo) = setup();
        let dir = temp.path().join("zlib").join("1.3.1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(DESCRIPTOR_FILE),
            PackageDescriptor::new("zlib", "1.3.0").to_toml().unwrap(),
        )
        .unwrap();

        let err = repo
            .lookup("zlib", &VersionSpec::Exact("1.3.1".into()), &Settings::detect())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_fetch_prefers_per_config_binary() {
        let (temp, repo) = setup();
        let meta = repo
            .lookup("fmt", &VersionSpec::Exact("11.1.3".into()), &Settings::detect())
            .await
            .unwrap();
        let hash = ConfigHash::compute("fmt", "11.1.3", &Settings::detect(), &BTreeMap::new());

        let generic = repo.fetch(&meta.artifact, &hash).await.unwrap();
        assert!(generic.ends_with("package"));

        let binary = temp
            .path()
            .join("fmt/11.1.3/binaries")
            .join(hash.short());
        std::fs::create_dir_all(&binary).unwrap();
        assert_eq!(repo.fetch(&meta.artifact, &hash).await.unwrap(), binary);
    }
}
