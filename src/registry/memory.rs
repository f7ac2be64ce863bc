//! In-process package repository
//!
//! Holds [`PackageDescriptor`]s in memory and counts calls, so embedders can
//! resolve without a filesystem index and tests can observe request
//! collapsing.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::hash::ConfigHash;
use crate::core::package::PackageDescriptor;
use crate::core::requirement::VersionSpec;
use crate::core::settings::Settings;
use crate::error::RepositoryError;
use crate::registry::{ArtifactHandle, PackageMetadata, PackageRepository};

/// Repository backed by in-memory descriptors
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    /// name -> version -> descriptor
    packages: BTreeMap<String, BTreeMap<String, PackageDescriptor>>,
    /// Root under which fetched folders are reported
    root: PathBuf,
    /// Artificial delay applied to every call
    latency: Option<Duration>,
    lookups: AtomicUsize,
    fetches: AtomicUsize,
}

impl InMemoryRepository {
    /// Create an empty repository reporting folders under `/kiln/packages`
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/kiln/packages"),
            ..Self::default()
        }
    }

    /// Add a package descriptor
    #[must_use]
    pub fn with_package(mut self, descriptor: PackageDescriptor) -> Self {
        self.insert(descriptor);
        self
    }

    /// Report fetched folders under `root`
    #[must_use]
    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.root = root;
        self
    }

    /// Delay every lookup and fetch
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Add or replace a package descriptor
    pub fn insert(&mut self, descriptor: PackageDescriptor) {
        self.packages
            .entry(descriptor.package.name.clone())
            .or_default()
            .insert(descriptor.package.version.clone(), descriptor);
    }

    /// Number of lookups served
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of fetches served
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl PackageRepository for InMemoryRepository {
    async fn lookup(
        &self,
        name: &str,
        spec: &VersionSpec,
        _settings: &Settings,
    ) -> Result<PackageMetadata, RepositoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let not_found = || RepositoryError::NotFound {
            name: name.to_string(),
            version: spec.to_string(),
        };

        let versions = self.packages.get(name).ok_or_else(not_found)?;
        let version = spec
            .select(versions.keys().map(String::as_str))
            .ok_or_else(not_found)?;
        let descriptor = &versions[version];

        let artifact = ArtifactHandle::new(name, version, format!("mem://{name}/{version}"));
        descriptor
            .to_metadata(artifact)
            .map_err(|e| RepositoryError::Parse {
                path: PathBuf::from(format!("mem://{name}/{version}")),
                error: e.to_string(),
            })
    }

    async fn fetch(
        &self,
        artifact: &ArtifactHandle,
        config: &ConfigHash,
    ) -> Result<PathBuf, RepositoryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let known = self
            .packages
            .get(&artifact.name)
            .is_some_and(|v| v.contains_key(&artifact.version));
        if !known {
            return Err(RepositoryError::NotFound {
                name: artifact.name.clone(),
                version: artifact.version.clone(),
            });
        }

        Ok(self
            .root
            .join(&artifact.name)
            .join(&artifact.version)
            .join(config.short()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> InMemoryRepository {
        InMemoryRepository::new()
            .with_package(PackageDescriptor::new("fmt", "10.2.1"))
            .with_package(PackageDescriptor::new("fmt", "11.1.3"))
            .with_package(PackageDescriptor::new("spdlog", "1.15.1").requires("fmt/11.1.3"))
    }

    #[tokio::test]
    async fn test_lookup_exact() {
        let meta = repo()
            .lookup("spdlog", &VersionSpec::Exact("1.15.1".into()), &Settings::detect())
            .await
            .unwrap();
        assert_eq!(meta.resolved_version, "1.15.1");
        assert_eq!(meta.requirements.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_range_picks_highest() {
        let spec = VersionSpec::parse("fmt", "[>=10 <12]").unwrap();
        let meta = repo().lookup("fmt", &spec, &Settings::detect()).await.unwrap();
        assert_eq!(meta.resolved_version, "11.1.3");
    }

    #[tokio::test]
    async fn test_lookup_missing_version() {
        let err = repo()
            .lookup("fmt", &VersionSpec::Exact("9.0.0".into()), &Settings::detect())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_fetch_counts_calls() {
        let repo = repo();
        let handle = ArtifactHandle::new("fmt", "11.1.3", "mem://fmt/11.1.3");
        let hash = ConfigHash::compute("fmt", "11.1.3", &Settings::detect(), &BTreeMap::new());
        let path = repo.fetch(&handle, &hash).await.unwrap();
        assert!(path.starts_with("/kiln/packages/fmt/11.1.3"));
        assert_eq!(repo.fetch_count(), 1);
    }
}
