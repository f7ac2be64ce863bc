//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

use kiln::core::package::PackageDescriptor;
use kiln::registry::LocalRepository;

/// Test project context
///
/// A temporary directory holding the project (`project/`), a local package
/// repository (`repo/`) and isolated kiln config and data dirs.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        let project = Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        };
        std::fs::create_dir_all(project.path()).expect("Failed to create project directory");
        std::fs::create_dir_all(project.repo_path()).expect("Failed to create repository");
        project
    }

    /// Project with the sample recipe and repository
    pub fn sample() -> Self {
        let project = Self::new();
        project.publish_sample_packages();
        project.write_recipe(SAMPLE_RECIPE);
        project
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("project")
    }

    /// Local package repository root
    pub fn repo_path(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    /// Local package repository
    pub fn repository(&self) -> LocalRepository {
        LocalRepository::new(self.repo_path())
    }

    /// Add a package to the local repository
    pub fn publish(&self, descriptor: &PackageDescriptor) -> PathBuf {
        self.repository()
            .publish(descriptor)
            .expect("Failed to publish package")
    }

    /// Publish spdlog -> fmt, nlohmann_json, yaml-cpp and opencv
    pub fn publish_sample_packages(&self) {
        self.publish(
            &PackageDescriptor::new("spdlog", "1.15.1")
                .requires("fmt/11.1.3")
                .with_option("header_only", "False"),
        );
        self.publish(&PackageDescriptor::new("fmt", "11.1.3").with_option("shared", "False"));
        self.publish(&PackageDescriptor::new("nlohmann_json", "3.11.3"));
        self.publish(&PackageDescriptor::new("yaml-cpp", "0.8.0"));
        self.publish(&PackageDescriptor::new("opencv", "4.11.0").with_option("shared", "False"));
    }

    /// Write kiln.toml
    pub fn write_recipe(&self, content: &str) {
        self.create_file("kiln.toml", content);
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.path().join(name)).expect("Failed to read file")
    }

    /// Run the kiln binary in the project directory with isolated dirs
    pub fn kiln(&self, args: &[&str]) -> Output {
        self.kiln_command(args)
            .output()
            .expect("Failed to execute kiln")
    }

    /// Prepared kiln command
    pub fn kiln_command(&self, args: &[&str]) -> Command {
        let home = self.dir.path();
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_kiln"));
        cmd.current_dir(self.path())
            .env("KILN_CONFIG_DIR", home.join("config"))
            .env("KILN_DATA_DIR", home.join("data"))
            .env("KILN_REPOSITORY", self.repo_path())
            .env_remove("RUST_LOG")
            .args(args);
        cmd
    }

    /// Config directory used by [`Self::kiln`]
    pub fn config_dir(&self) -> PathBuf {
        self.dir.path().join("config")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Names of the layout directories under `build/`
pub fn layouts(project_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(project_dir.join("build"))
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Profile used by tests so results do not depend on the host
pub const LINUX_PROFILE: &str = r#"
[settings]
os = "Linux"
arch = "x86_64"
compiler = "gcc"
build_type = "Release"
"#;

/// Sample recipe mirroring a small sensor application
pub const SAMPLE_RECIPE: &str = r#"
requires = [
    "spdlog/1.15.1",
    "fmt/11.1.3",
    "nlohmann_json/3.11.3",
    "yaml-cpp/0.8.0",
    "opencv/4.11.0",
]
generators = ["CMakeDeps", "CMakeToolchain", "json"]

[project]
name = "sensor_app"

[settings]
os = "Linux"
arch = "x86_64"
compiler = "gcc"
build_type = "Release"

[options]
"opencv:shared" = "True"

[layout]
kind = "cmake_layout"

[build]
tool = "commands"
configure = ["sh", "-c", "test -f \"$KILN_GENERATORS_DIR/kiln_toolchain.cmake\" && echo configured > configured.txt"]
build = ["sh", "-c", "test -f configured.txt && echo built > built.txt"]
"#;
