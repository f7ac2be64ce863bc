//! Recipe (kiln.toml) parsing and validation
//!
//! The recipe declares a project's requirements, generators, default
//! settings, option overrides, layout and build stage configuration.
//! String values support `${VAR}` environment substitution.
//!
//! ```toml
//! requires = ["spdlog/1.15.1", "fmt/11.1.3"]
//! generators = ["CMakeDeps", "CMakeToolchain"]
//!
//! [project]
//! name = "sensor_app"
//!
//! [settings]
//! build_type = "Release"
//!
//! [options]
//! "opencv:shared" = "True"
//!
//! [layout]
//! kind = "cmake_layout"
//!
//! [build]
//! tool = "cmake"
//! build_timeout = 3600
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::core::driver::{BuildTool, CMakeTool, CommandTool, StageTimeouts};
use crate::core::options::OptionOverrides;
use crate::core::profile::Profile;
use crate::core::requirement::{Requirement, RequirementSet};
use crate::error::{FilesystemError, KilnError, RequirementError};

/// Layout kinds understood by the build layout
pub const LAYOUT_KINDS: &[&str] = &["cmake_layout"];

/// Build tools selectable in `[build]`
pub const BUILD_TOOLS: &[&str] = &["cmake", "commands"];

/// The project recipe (kiln.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipe {
    /// Requirement references, `name/version` or `name/[range]`
    #[serde(default)]
    pub requires: Vec<String>,

    /// Generator names, in emission order
    #[serde(default)]
    pub generators: Vec<String>,

    /// Project metadata
    #[serde(default)]
    pub project: ProjectConfig,

    /// Default settings fields, overridden by profiles
    #[serde(default)]
    pub settings: BTreeMap<String, String>,

    /// Option overrides, `"pkg:option" = "value"`
    #[serde(default)]
    pub options: BTreeMap<String, String>,

    /// Build layout
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Build stage configuration
    #[serde(default)]
    pub build: BuildConfig,
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,

    /// Project description
    #[serde(default)]
    pub description: Option<String>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
            version: default_version(),
            description: None,
        }
    }
}

/// Layout configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayoutConfig {
    /// Layout kind
    #[serde(default = "default_layout")]
    pub kind: String,
}

fn default_layout() -> String {
    "cmake_layout".to_string()
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            kind: default_layout(),
        }
    }
}

/// Build stage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildConfig {
    /// `cmake` or `commands`
    #[serde(default = "default_tool")]
    pub tool: String,

    /// Configure argv for the `commands` tool
    #[serde(default)]
    pub configure: Vec<String>,

    /// Build argv for the `commands` tool
    #[serde(default)]
    pub build: Vec<String>,

    /// Extra arguments for `cmake` configure
    #[serde(default)]
    pub cmake_args: Vec<String>,

    /// Parallel jobs
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Configure stage timeout in seconds
    #[serde(default)]
    pub configure_timeout: Option<u64>,

    /// Build stage timeout in seconds
    #[serde(default)]
    pub build_timeout: Option<u64>,
}

fn default_tool() -> String {
    "cmake".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            configure: Vec::new(),
            build: Vec::new(),
            cmake_args: Vec::new(),
            jobs: None,
            configure_timeout: None,
            build_timeout: None,
        }
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex is valid")
    })
}

/// Substitute `${VAR}` patterns with environment values
///
/// Unset variables expand to the empty string.
///
/// # Examples
/// ```
/// use kiln::core::recipe::substitute_env_vars;
///
/// std::env::set_var("KILN_DOC_VAR", "hello");
/// assert_eq!(substitute_env_vars("prefix_${KILN_DOC_VAR}_suffix"), "prefix_hello_suffix");
/// std::env::remove_var("KILN_DOC_VAR");
/// ```
pub fn substitute_env_vars(input: &str) -> String {
    env_var_pattern()
        .replace_all(input, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// Recursively substitute environment variables in a TOML value
fn substitute_in_value(value: &mut toml::Value) {
    match value {
        toml::Value::String(s) => *s = substitute_env_vars(s),
        toml::Value::Array(arr) => arr.iter_mut().for_each(substitute_in_value),
        toml::Value::Table(table) => table
            .iter_mut()
            .for_each(|(_, v)| substitute_in_value(v)),
        _ => {}
    }
}

impl Recipe {
    /// Load a recipe file with environment substitution
    pub fn load(path: &Path) -> Result<Self, KilnError> {
        if !path.is_file() {
            return Err(KilnError::RecipeNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let mut value: toml::Value = toml::from_str(&content)
            .map_err(|source| KilnError::RecipeParse { source })?;
        substitute_in_value(&mut value);
        value
            .try_into()
            .map_err(|source| KilnError::RecipeParse { source })
    }

    /// Parse from TOML string, without substitution
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Parsed requirements in declaration order
    pub fn requirements(&self) -> Result<RequirementSet, RequirementError> {
        RequirementSet::from_references(&self.requires)
    }

    /// Parsed option overrides
    pub fn option_overrides(&self) -> Result<OptionOverrides, RequirementError> {
        OptionOverrides::parse(&self.options)
    }

    /// Default settings as a profile layer
    pub fn profile(&self) -> Profile {
        Profile {
            settings: self.settings.clone(),
            options: self.options.clone(),
        }
    }

    /// Stage timeouts declared by the recipe, falling back to `fallback`
    pub fn stage_timeouts(&self, fallback: StageTimeouts) -> StageTimeouts {
        StageTimeouts {
            configure: self
                .build
                .configure_timeout
                .map(Duration::from_secs)
                .or(fallback.configure),
            build: self
                .build
                .build_timeout
                .map(Duration::from_secs)
                .or(fallback.build),
        }
    }

    /// Build tool selected by `[build]`
    pub fn build_tool(&self, default_jobs: usize) -> Result<Box<dyn BuildTool>, KilnError> {
        let jobs = self.build.jobs.unwrap_or(default_jobs);
        match self.build.tool.as_str() {
            "commands" => Ok(Box::new(CommandTool::new(
                self.build.configure.clone(),
                self.build.build.clone(),
            ))),
            "cmake" => {
                let tool = CMakeTool::locate().ok_or_else(|| {
                    KilnError::Generic("cmake was not found on PATH".to_string())
                })?;
                Ok(Box::new(
                    tool.with_jobs(jobs)
                        .with_configure_args(self.build.cmake_args.clone()),
                ))
            }
            other => Err(KilnError::Generic(format!("Unknown build tool '{other}'"))),
        }
    }

    /// Report every problem in the recipe
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.project.name.trim().is_empty() {
            errors.push("project.name must not be empty".to_string());
        }

        let mut seen: Vec<String> = Vec::new();
        for reference in &self.requires {
            match Requirement::parse(reference) {
                Ok(req) if seen.contains(&req.name) => {
                    errors.push(format!("requires: '{}' is declared twice", req.name));
                }
                Ok(req) => seen.push(req.name),
                Err(e) => errors.push(format!("requires: {e}")),
            }
        }

        for name in &self.generators {
            if name.trim().is_empty() {
                errors.push("generators: empty generator name".to_string());
            }
        }

        if let Err(e) = self.option_overrides() {
            errors.push(format!("options: {e}"));
        }

        if !LAYOUT_KINDS.contains(&self.layout.kind.as_str()) {
            errors.push(format!(
                "layout.kind: '{}' is not one of {}",
                self.layout.kind,
                LAYOUT_KINDS.join(", ")
            ));
        }

        if !BUILD_TOOLS.contains(&self.build.tool.as_str()) {
            errors.push(format!(
                "build.tool: '{}' is not one of {}",
                self.build.tool,
                BUILD_TOOLS.join(", ")
            ));
        } else if self.build.tool == "commands" {
            if self.build.configure.is_empty() {
                errors.push("build.configure: required when build.tool = \"commands\"".to_string());
            }
            if self.build.build.is_empty() {
                errors.push("build.build: required when build.tool = \"commands\"".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
