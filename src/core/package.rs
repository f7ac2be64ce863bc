//! Package definitions
//!
//! [`PackageDescriptor`] is the on-disk `package.toml` a repository serves;
//! [`PackageNode`] is one resolved, configured package inside a
//! [`ResolvedGraph`](crate::core::resolver::ResolvedGraph).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::hash::ConfigHash;
use crate::core::requirement::RequirementSet;
use crate::core::settings::Settings;
use crate::error::RequirementError;
use crate::registry::{ArtifactHandle, PackageMetadata};

/// Consumer-facing build metadata of a package
///
/// Directories are relative to the package folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CppInfo {
    /// Include directories
    #[serde(default = "default_include_dirs")]
    pub include_dirs: Vec<String>,

    /// Library directories
    #[serde(default = "default_lib_dirs")]
    pub lib_dirs: Vec<String>,

    /// Libraries to link, in link order
    #[serde(default)]
    pub libs: Vec<String>,

    /// System libraries to link
    #[serde(default)]
    pub system_libs: Vec<String>,

    /// Preprocessor definitions
    #[serde(default)]
    pub defines: Vec<String>,
}

fn default_include_dirs() -> Vec<String> {
    vec!["include".to_string()]
}

fn default_lib_dirs() -> Vec<String> {
    vec!["lib".to_string()]
}

impl Default for CppInfo {
    fn default() -> Self {
        Self {
            include_dirs: default_include_dirs(),
            lib_dirs: default_lib_dirs(),
            libs: Vec::new(),
            system_libs: Vec::new(),
            defines: Vec::new(),
        }
    }
}

/// Package identity section of `package.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Package name
    pub name: String,

    /// Package version
    pub version: String,

    /// Short description
    #[serde(default)]
    pub description: Option<String>,
}

/// A package definition (`package.toml`)
///
/// ```toml
/// requires = ["fmt/11.1.3"]
///
/// [package]
/// name = "spdlog"
/// version = "1.15.1"
///
/// [options]
/// shared = "False"
///
/// [cpp_info]
/// libs = ["spdlog"]
/// defines = ["SPDLOG_FMT_EXTERNAL"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Requirements as `name/version` references
    #[serde(default)]
    pub requires: Vec<String>,

    /// Identity
    pub package: PackageInfo,

    /// Default option values
    #[serde(default)]
    pub options: BTreeMap<String, String>,

    /// Consumer build metadata
    #[serde(default)]
    pub cpp_info: CppInfo,
}

impl PackageDescriptor {
    /// Create a descriptor with no requirements
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            package: PackageInfo {
                name: name.to_string(),
                version: version.to_string(),
                description: None,
            },
            requires: Vec::new(),
            options: BTreeMap::new(),
            cpp_info: CppInfo {
                libs: vec![name.to_string()],
                ..CppInfo::default()
            },
        }
    }

    /// Add a requirement reference
    #[must_use]
    pub fn requires(mut self, reference: &str) -> Self {
        self.requires.push(reference.to_string());
        self
    }

    /// Add a default option
    #[must_use]
    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }

    /// Replace the consumer build metadata
    #[must_use]
    pub fn with_cpp_info(mut self, cpp_info: CppInfo) -> Self {
        self.cpp_info = cpp_info;
        self
    }

    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Parsed requirements in declaration order
    pub fn requirement_set(&self) -> Result<RequirementSet, RequirementError> {
        RequirementSet::from_references(&self.requires)
    }

    /// Convert to repository metadata with the given artifact handle
    pub fn to_metadata(&self, artifact: ArtifactHandle) -> Result<PackageMetadata, RequirementError> {
        Ok(PackageMetadata {
            name: self.package.name.clone(),
            resolved_version: self.package.version.clone(),
            requirements: self.requirement_set()?,
            options: self.options.clone(),
            cpp_info: self.cpp_info.clone(),
            artifact,
        })
    }
}

/// A resolved package configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageNode {
    /// Package name
    pub name: String,
    /// Selected version
    pub version: String,
    /// Profile the package is configured for
    pub settings: Settings,
    /// Effective options
    pub options: BTreeMap<String, String>,
    /// Direct dependency names, in declaration order
    pub dependencies: Vec<String>,
    /// Consumer build metadata
    pub cpp_info: CppInfo,
    /// Handle used to fetch the binary package
    pub artifact: ArtifactHandle,
    /// Local package folder, set once fetched
    pub package_folder: Option<PathBuf>,
}

impl PackageNode {
    /// Deterministic identity of this configuration
    pub fn config_hash(&self) -> ConfigHash {
        ConfigHash::of(self)
    }

    /// Reference string `name/version`
    pub fn reference(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }

    /// Package folder, or a placeholder when not yet fetched
    pub fn folder(&self) -> &Path {
        self.package_folder
            .as_deref()
            .unwrap_or_else(|| Path::new(""))
    }

    /// Absolute include directories
    pub fn include_paths(&self) -> Vec<PathBuf> {
        self.cpp_info
            .include_dirs
            .iter()
            .map(|d| self.folder().join(d))
            .collect()
    }

    /// Absolute library directories
    pub fn lib_paths(&self) -> Vec<PathBuf> {
        self.cpp_info
            .lib_dirs
            .iter()
            .map(|d| self.folder().join(d))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPDLOG: &str = r#"
requires = ["fmt/11.1.3"]

[package]
name = "spdlog"
version = "1.15.1"

[options]
shared = "False"

[cpp_info]
libs = ["spdlog"]
defines = ["SPDLOG_FMT_EXTERNAL"]
"#;

    #[test]
    fn test_descriptor_from_toml() {
        let desc = PackageDescriptor::from_toml(SPDLOG).unwrap();
        assert_eq!(desc.package.name, "spdlog");
        assert_eq!(desc.requires, vec!["fmt/11.1.3"]);
        assert_eq!(desc.options["shared"], "False");
        assert_eq!(desc.cpp_info.include_dirs, vec!["include"]);
        assert_eq!(desc.cpp_info.defines, vec!["SPDLOG_FMT_EXTERNAL"]);
    }

    #[test]
    fn test_descriptor_toml_roundtrip() {
        let desc = PackageDescriptor::new("fmt", "11.1.3").with_option("shared", "False");
        let parsed = PackageDescriptor::from_toml(&desc.to_toml().unwrap()).unwrap();
        assert_eq!(desc, parsed);
    }

    #[test]
    fn test_descriptor_rejects_bad_requirement() {
        let desc = PackageDescriptor::new("a", "1.0").requires("not-a-reference");
        assert!(desc.requirement_set().is_err());
    }

    #[test]
    fn test_node_paths_join_package_folder() {
        let desc = PackageDescriptor::new("fmt", "11.1.3");
        let meta = desc
            .to_metadata(ArtifactHandle::new("fmt", "11.1.3", "mem://fmt/11.1.3"))
            .unwrap();
        let node = PackageNode {
            name: meta.name,
            version: meta.resolved_version,
            settings: Settings::detect(),
            options: meta.options,
            dependencies: Vec::new(),
            cpp_info: meta.cpp_info,
            artifact: meta.artifact,
            package_folder: Some(PathBuf::from("/pkgs/fmt")),
        };
        assert_eq!(node.include_paths(), vec![PathBuf::from("/pkgs/fmt/include")]);
        assert_eq!(node.lib_paths(), vec![PathBuf::from("/pkgs/fmt/lib")]);
        assert_eq!(node.reference(), "fmt/11.1.3");
    }
}
