//! Test utilities
//!
//! Proptest strategies plus shared fixtures for unit tests.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    /// Generate a valid package name
    pub fn package_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,20}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate a valid semver version string
    pub fn semver_version() -> impl Strategy<Value = String> {
        (0u32..100, 0u32..100, 0u32..100)
            .prop_map(|(major, minor, patch)| format!("{major}.{minor}.{patch}"))
    }

    /// Generate a value accepted by the settings model
    pub fn setting_value() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_.+-]{1,12}"
    }

    /// Generate a build type in any letter case
    pub fn build_type() -> impl Strategy<Value = String> {
        (
            prop_oneof![
                Just("Debug"),
                Just("Release"),
                Just("RelWithDebInfo"),
                Just("MinSizeRel"),
            ],
            any::<bool>(),
        )
            .prop_map(|(t, upper)| {
                if upper {
                    t.to_uppercase()
                } else {
                    t.to_lowercase()
                }
            })
    }

    /// Generate a package option map
    pub fn options() -> impl Strategy<Value = BTreeMap<String, String>> {
        prop::collection::btree_map("[a-z_]{1,10}", "[A-Za-z0-9]{1,8}", 0..4)
    }
}

#[cfg(test)]
pub mod fixtures {
    use crate::core::package::PackageDescriptor;
    use crate::core::requirement::RequirementSet;
    use crate::core::resolver::{ResolvedGraph, Resolver};
    use crate::core::settings::Settings;
    use crate::registry::{InMemoryRepository, PackageRepository};

    /// Linux/gcc/Release/x86_64 profile
    pub fn linux_release() -> Settings {
        Settings::normalize([
            ("os", "Linux"),
            ("compiler", "gcc"),
            ("build_type", "Release"),
            ("arch", "x86_64"),
        ])
        .unwrap()
    }

    /// Repository with spdlog depending on fmt, plus nlohmann_json
    pub fn sample_repository() -> InMemoryRepository {
        InMemoryRepository::new()
            .with_package(
                PackageDescriptor::new("spdlog", "1.15.1")
                    .requires("fmt/11.1.3")
                    .with_option("header_only", "False"),
            )
            .with_package(PackageDescriptor::new("fmt", "11.1.3").with_option("shared", "False"))
            .with_package(PackageDescriptor::new("nlohmann_json", "3.11.3"))
    }

    /// Resolve the sample requirements and assign package folders
    pub async fn sample_graph() -> ResolvedGraph {
        let repo = sample_repository();
        let requirements =
            RequirementSet::from_references(["spdlog/1.15.1", "nlohmann_json/3.11.3"]).unwrap();
        let mut graph = Resolver::new(&repo)
            .resolve(&requirements, &linux_release())
            .await
            .unwrap();
        for node in graph.nodes_mut() {
            let folder = repo
                .fetch(&node.artifact, &node.config_hash())
                .await
                .unwrap();
            node.package_folder = Some(folder);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::core::settings::Settings;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_package_name_generator(name in package_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'));
        }

        #[test]
        fn test_build_type_generator_is_accepted(build_type in build_type()) {
            let settings = Settings::normalize([
                ("os", "Linux"),
                ("compiler", "gcc"),
                ("build_type", build_type.as_str()),
                ("arch", "x86_64"),
            ]);
            prop_assert!(settings.is_ok());
        }
    }
}
