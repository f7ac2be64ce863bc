//! Error types for kiln
//!
//! Domain-specific error types using thiserror. Each pipeline phase has its
//! own enum; [`KilnError`] wraps them for callers that drive the whole
//! pipeline.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Settings validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// Required field absent or empty
    #[error("Invalid settings: required field '{field}' is missing")]
    MissingField { field: String },

    /// Value outside a closed vocabulary
    #[error("Invalid settings: '{field}' has unrecognized value '{value}' (expected one of {allowed:?})")]
    UnrecognizedValue {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    /// Value contains characters that cannot appear in a profile key
    #[error("Invalid settings: '{field}' has malformed value '{value}'")]
    MalformedValue { field: String, value: String },

    /// Key that is neither a known field nor a sub-setting of one
    #[error("Invalid settings: unknown setting '{field}'")]
    UnknownField { field: String },
}

/// Requirement declaration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequirementError {
    /// Reference is not of the form `name/version`
    #[error("Invalid requirement reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// Version range could not be parsed
    #[error("Invalid version range '{range}' for '{package}': {reason}")]
    InvalidRange {
        package: String,
        range: String,
        reason: String,
    },

    /// Same package declared twice in one scope
    #[error("Package '{name}' is required more than once")]
    Duplicate { name: String },
}

/// Package repository errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// No package satisfies the request
    #[error("Package '{name}' with version '{version}' not found")]
    NotFound { name: String, version: String },

    /// Transient transport failure (retryable)
    #[error("Network error for '{name}': {error}")]
    Network { name: String, error: String },

    /// Transient failures exhausted the retry budget
    #[error("Fetch of '{name}' failed after {attempts} attempts: {error}")]
    Fetch {
        name: String,
        attempts: u32,
        error: String,
    },

    /// Local IO failure
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },

    /// Package metadata could not be parsed
    #[error("Failed to parse package metadata '{path}': {error}")]
    Parse { path: PathBuf, error: String },
}

impl RepositoryError {
    /// Whether the error may go away on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

/// Dependency resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// Two incompatible constraints on one package name
    #[error("Version conflict for '{package}': '{existing}' (required by {existing_by}) conflicts with '{requested}' (required by {requested_by})")]
    VersionConflict {
        package: String,
        existing: String,
        existing_by: String,
        requested: String,
        requested_by: String,
    },

    /// Circular dependency detected
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// Repository lookup or fetch failed
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Requirement declaration was malformed
    #[error("Requirement error: {0}")]
    Requirement(#[from] RequirementError),
}

/// Generator errors
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// Generator name is not registered
    #[error("Generator '{name}' not found (available: {})", available.join(", "))]
    NotFound { name: String, available: Vec<String> },

    /// Target directory or file could not be written
    #[error("Failed to write '{path}': {error}")]
    Write { path: PathBuf, error: String },

    /// Generator could not serialize its output
    #[error("Generator '{name}' failed: {error}")]
    Render { name: String, error: String },
}

/// Build pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Configure stage (build-file generation)
    Configure,
    /// Build stage (compilation)
    Build,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configure => write!(f, "configure"),
            Self::Build => write!(f, "build"),
        }
    }
}

/// Build driver errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    /// Operation invoked from the wrong state
    #[error("Cannot {operation} while driver is {state}")]
    Sequence { operation: String, state: String },

    /// Configure stage exited non-zero
    #[error("Configure failed with exit code {}: {stderr}", code_display(*exit_code))]
    Configure {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// Build stage exited non-zero
    #[error("Build failed with exit code {}: {stderr}", code_display(*exit_code))]
    Build {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// Stage exceeded its timeout
    #[error("{stage} stage timed out after {timeout:?}")]
    Timeout {
        stage: Stage,
        timeout: Duration,
        stdout: String,
        stderr: String,
    },

    /// Stage was cancelled by the caller
    #[error("{stage} stage was cancelled")]
    Cancelled { stage: Stage },

    /// Process could not be started
    #[error("Failed to start {stage} command '{program}': {error}")]
    Spawn {
        stage: Stage,
        program: String,
        error: String,
    },

    /// Hook callback failed
    #[error("{hook} hook failed: {error}")]
    Hook { hook: String, error: String },
}

fn code_display(code: Option<i32>) -> String {
    code.map_or_else(|| "none (killed by signal)".to_string(), |c| c.to_string())
}

impl BuildError {
    /// Stage the error is attributed to, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Configure { .. } => Some(Stage::Configure),
            Self::Build { .. } => Some(Stage::Build),
            Self::Timeout { stage, .. } | Self::Cancelled { stage } | Self::Spawn { stage, .. } => {
                Some(*stage)
            }
            Self::Sequence { .. } | Self::Hook { .. } => None,
        }
    }
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },
}

/// Top-level kiln error type
#[derive(Error, Debug)]
pub enum KilnError {
    /// Recipe not found
    #[error("Recipe not found at '{path}'. Create a kiln.toml to describe the project.")]
    RecipeNotFound { path: String },

    /// Recipe parse error
    #[error("Failed to parse recipe: {source}")]
    RecipeParse { source: toml::de::Error },

    /// Settings error
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Requirement error
    #[error("Requirement error: {0}")]
    Requirement(#[from] RequirementError),

    /// Resolver error
    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Repository error
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Generator error
    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    /// Build error
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    /// Lock file mismatch
    #[error("Lock file mismatch: {message}")]
    LockMismatch { message: String },

    /// Generic error
    #[error("{0}")]
    Generic(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_renders_path() {
        let err = ResolverError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a -> b -> a");
    }

    #[test]
    fn test_build_error_stage_attribution() {
        let err = BuildError::Configure {
            exit_code: Some(2),
            stdout: String::new(),
            stderr: "boom".into(),
        };
        assert_eq!(err.stage(), Some(Stage::Configure));
        assert!(err.to_string().contains("exit code 2"));

        let err = BuildError::Sequence {
            operation: "build".into(),
            state: "idle".into(),
        };
        assert_eq!(err.stage(), None);
    }

    #[test]
    fn test_killed_process_has_no_exit_code() {
        let err = BuildError::Build {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(err.to_string().contains("killed by signal"));
    }

    #[test]
    fn test_only_network_errors_are_transient() {
        let network = RepositoryError::Network {
            name: "fmt".into(),
            error: "reset".into(),
        };
        let missing = RepositoryError::NotFound {
            name: "fmt".into(),
            version: "1.0".into(),
        };
        assert!(network.is_transient());
        assert!(!missing.is_transient());
    }
}
