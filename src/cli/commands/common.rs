//! Shared setup for commands that resolve a project

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use crate::core::global_config::GlobalConfig;
use crate::core::options::OptionOverrides;
use crate::core::pipeline::{effective_configuration, Pipeline, Project};
use crate::core::profile::{parse_key_values, Profile};
use crate::core::settings::Settings;
use crate::infra::dirs::KilnDirs;
use crate::registry::{CachedRepository, LocalRepository};

/// Profile, override and repository flags
#[derive(Args, Debug, Clone, Default)]
pub struct ResolveArgs {
    /// Profile name (under the profiles directory) or path
    #[arg(short = 'p', long)]
    pub profile: Option<String>,

    /// Override a setting (key=value)
    #[arg(short = 's', long = "setting", value_name = "KEY=VALUE")]
    pub settings: Vec<String>,

    /// Override a package option (pkg:option=value)
    #[arg(short = 'o', long = "option", value_name = "PKG:OPTION=VALUE")]
    pub options: Vec<String>,

    /// Package repository root
    #[arg(long, env = "KILN_REPOSITORY")]
    pub repo: Option<PathBuf>,
}

/// Everything a command needs to run the pipeline for one project
#[derive(Debug)]
pub struct Session {
    /// Global configuration
    pub config: GlobalConfig,
    /// Loaded project
    pub project: Project,
    /// Effective profile
    pub settings: Settings,
    /// Effective option overrides
    pub overrides: OptionOverrides,
    /// Repository with memoization and retries
    pub repository: CachedRepository<LocalRepository>,
}

impl Session {
    /// Load the project in `dir` and layer its configuration
    pub fn open(dir: &Path, args: &ResolveArgs) -> Result<Self> {
        let dirs = KilnDirs::new();
        let config = GlobalConfig::load(&dirs).context("Failed to load global configuration")?;
        let project = Project::load(dir)?;

        let profile = load_profile(args.profile.as_deref().or(config.build.profile.as_deref()), &dirs)?;
        let settings = parse_key_values(&args.settings)?;
        let options = parse_key_values(&args.options)?;
        let (settings, overrides) =
            effective_configuration(project.recipe(), profile.as_ref(), &settings, &options)?;

        let root = args
            .repo
            .clone()
            .unwrap_or_else(|| config.repository_path(&dirs));
        tracing::debug!("Using repository {}", root.display());
        let repository = CachedRepository::with_retry(LocalRepository::new(root), config.retry_policy());

        Ok(Self {
            config,
            project,
            settings,
            overrides,
            repository,
        })
    }

    /// Install pipeline for this session
    pub fn pipeline(&self) -> Pipeline<'_, CachedRepository<LocalRepository>> {
        Pipeline::new(&self.project, &self.repository, self.settings.clone())
            .with_overrides(self.overrides.clone())
    }
}

/// Load a named or path profile
pub fn load_profile(name: Option<&str>, dirs: &KilnDirs) -> Result<Option<Profile>> {
    let Some(name) = name else {
        return Ok(None);
    };
    let path = Profile::locate(name, dirs).with_context(|| {
        format!(
            "Profile '{name}' not found (looked in {})",
            dirs.profiles_dir().display()
        )
    })?;
    tracing::debug!("Using profile {}", path.display());
    Ok(Some(Profile::load(&path)?))
}
