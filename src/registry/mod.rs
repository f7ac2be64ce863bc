//! Package repository collaborator
//!
//! The resolver and fetch stage talk to packages only through the
//! [`PackageRepository`] trait. Repositories are passed in explicitly; there
//! is no process-wide registry.
//!
//! - [`local`] - directory index of `package.toml` files
//! - [`memory`] - in-process repository for embedding and tests
//! - [`cache`] - memoizing, retrying wrapper around any repository

pub mod cache;
pub mod local;
pub mod memory;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::hash::ConfigHash;
use crate::core::package::CppInfo;
use crate::core::requirement::{RequirementSet, VersionSpec};
use crate::core::settings::Settings;
use crate::error::RepositoryError;

pub use cache::{CachedRepository, RetryPolicy};
pub use local::LocalRepository;
pub use memory::InMemoryRepository;

/// Opaque locator for a binary package
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactHandle {
    /// Package name
    pub name: String,
    /// Package version
    pub version: String,
    /// Repository-specific location
    pub locator: String,
}

impl ArtifactHandle {
    /// Create a new handle
    pub fn new(name: &str, version: &str, locator: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            locator: locator.into(),
        }
    }
}

/// Result of a metadata lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    /// Package name
    pub name: String,
    /// Concrete version selected by the repository
    pub resolved_version: String,
    /// The package's own requirements, in declaration order
    pub requirements: RequirementSet,
    /// Default option values
    pub options: BTreeMap<String, String>,
    /// Consumer build metadata
    pub cpp_info: CppInfo,
    /// Handle to fetch the binary package
    pub artifact: ArtifactHandle,
}

/// Package metadata and fetch collaborator
pub trait PackageRepository: Send + Sync {
    /// Select a version of `name` satisfying `spec` for `settings`
    fn lookup(
        &self,
        name: &str,
        spec: &VersionSpec,
        settings: &Settings,
    ) -> impl Future<Output = Result<PackageMetadata, RepositoryError>> + Send;

    /// Make the package for configuration `config` available locally
    fn fetch(
        &self,
        artifact: &ArtifactHandle,
        config: &ConfigHash,
    ) -> impl Future<Output = Result<PathBuf, RepositoryError>> + Send;
}

impl<R: PackageRepository> PackageRepository for Arc<R> {
    fn lookup(
        &self,
        name: &str,
        spec: &VersionSpec,
        settings: &Settings,
    ) -> impl Future<Output = Result<PackageMetadata, RepositoryError>> + Send {
        (**self).lookup(name, spec, settings)
    }

    fn fetch(
        &self,
        artifact: &ArtifactHandle,
        config: &ConfigHash,
    ) -> impl Future<Output = Result<PathBuf, RepositoryError>> + Send {
        (**self).fetch(artifact, config)
    }
}
