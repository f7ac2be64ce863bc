//! Install and build orchestration
//!
//! Runs the phases for one project and profile in order:
//!
//! 1. resolve the recipe's requirements into a [`ResolvedGraph`]
//! 2. check the lock file when `--locked` is requested
//! 3. fetch every node concurrently (one fetch per distinct configuration)
//! 4. create the [`BuildLayout`] and emit generator output into it
//! 5. record `kiln.lock`
//!
//! Nothing touches the filesystem until resolution and the lock check have
//! succeeded. The build stages run afterwards through [`BuildDriver`].

use futures::future::try_join_all;
use std::path::{Path, PathBuf};

use crate::config::defaults::{LOCK_FILE, RECIPE_FILE};
use crate::core::driver::{BuildDriver, BuildTool};
use crate::core::generators::GeneratorRegistry;
use crate::core::layout::BuildLayout;
use crate::core::lock::LockFile;
use crate::core::options::OptionOverrides;
use crate::core::profile::Profile;
use crate::core::recipe::Recipe;
use crate::core::resolver::{ResolvedGraph, Resolver};
use crate::core::settings::Settings;
use crate::error::{GeneratorError, KilnError};
use crate::registry::PackageRepository;

/// A project directory and its parsed recipe
#[derive(Debug, Clone)]
pub struct Project {
    dir: PathBuf,
    recipe: Recipe,
}

impl Project {
    /// Load and validate `kiln.toml` from `dir`
    pub fn load(dir: &Path) -> Result<Self, KilnError> {
        let recipe = Recipe::load(&dir.join(RECIPE_FILE))?;
        recipe
            .validate()
            .map_err(|errors| KilnError::Generic(format!("Invalid recipe:\n  {}", errors.join("\n  "))))?;
        Ok(Self::new(dir, recipe))
    }

    /// Wrap an already parsed recipe
    pub fn new(dir: &Path, recipe: Recipe) -> Self {
        Self {
            dir: dir.to_path_buf(),
            recipe,
        }
    }

    /// Project directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Parsed recipe
    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    /// Path of the lock file
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Layout for `settings`
    pub fn layout(&self, settings: &Settings) -> BuildLayout {
        BuildLayout::new(&self.dir, settings)
    }
}

/// Settings and option overrides after layering every source
///
/// Settings: detected host < recipe `[settings]` < profile < `settings`.
/// Options: recipe `[options]` < profile `[options]` < `options`.
pub fn effective_configuration(
    recipe: &Recipe,
    profile: Option<&Profile>,
    settings: &[(String, String)],
    options: &[(String, String)],
) -> Result<(Settings, OptionOverrides), KilnError> {
    let mut layered = Profile::detect().merged_with(&recipe.profile());
    let mut overrides = recipe.option_overrides()?;
    if let Some(profile) = profile {
        layered = layered.merged_with(profile);
        overrides = overrides.merged_with(&profile.option_overrides()?);
    }

    let resolved = layered.to_settings(settings)?;
    let overrides =
        overrides.merged_with(&OptionOverrides::parse(options.iter().map(|(k, v)| (k, v)))?);
    Ok((resolved, overrides))
}

/// Result of a successful install
#[derive(Debug)]
pub struct Installation {
    /// Resolved and fetched graph
    pub graph: ResolvedGraph,
    /// Profile the graph was resolved for
    pub settings: Settings,
    /// Build layout holding the generated files
    pub layout: BuildLayout,
    /// Files written by the generators
    pub generated: Vec<PathBuf>,
    /// Lock file describing the graph
    pub lock: LockFile,
}

/// Install pipeline for one project and profile
pub struct Pipeline<'a, R> {
    project: &'a Project,
    repository: &'a R,
    settings: Settings,
    overrides: OptionOverrides,
    generators: GeneratorRegistry,
    locked: bool,
}

impl<'a, R: PackageRepository> Pipeline<'a, R> {
    /// Create a pipeline using the built-in generators
    pub fn new(project: &'a Project, repository: &'a R, settings: Settings) -> Self {
        Self {
            project,
            repository,
            settings,
            overrides: OptionOverrides::new(),
            generators: GeneratorRegistry::with_builtins(),
            locked: false,
        }
    }

    /// Set option overrides
    #[must_use]
    pub fn with_overrides(mut self, overrides: OptionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Use a custom generator registry
    #[must_use]
    pub fn with_generators(mut self, generators: GeneratorRegistry) -> Self {
        self.generators = generators;
        self
    }

    /// Require the resolution to match the existing lock file
    #[must_use]
    pub fn locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    /// Active profile
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolve the recipe's requirements
    pub async fn resolve(&self) -> Result<ResolvedGraph, KilnError> {
        let requirements = self.project.recipe().requirements()?;
        tracing::info!(
            "Resolving {} requirement(s) for {}",
            requirements.len(),
            self.settings.key()
        );
        let graph = Resolver::new(self.repository)
            .with_overrides(self.overrides.clone())
            .resolve(&requirements, &self.settings)
            .await?;
        tracing::debug!("Build order: {}", graph.build_order().join(", "));
        Ok(graph)
    }

    /// Fetch every node and record its package folder
    pub async fn fetch(&self, graph: &mut ResolvedGraph) -> Result<(), KilnError> {
        let folders = try_join_all(graph.nodes().iter().map(|node| {
            let hash = node.config_hash();
            async move { self.repository.fetch(&node.artifact, &hash).await }
        }))
        .await?;

        for (node, folder) in graph.nodes_mut().iter_mut().zip(folders) {
            tracing::debug!("{} -> {}", node.reference(), folder.display());
            node.package_folder = Some(folder);
        }
        Ok(())
    }

    /// Resolve, fetch, generate and lock
    pub async fn install(&self) -> Result<Installation, KilnError> {
        let mut graph = self.resolve().await?;
        let lock = LockFile::from_graph(&graph, &self.settings);

        if self.locked {
            let existing = LockFile::load(&self.project.lock_path())?.ok_or_else(|| {
                KilnError::LockMismatch {
                    message: format!("{LOCK_FILE} does not exist"),
                }
            })?;
            existing.verify(&lock)?;
        }

        let generators = &self.project.recipe().generators;
        if let Some(unknown) = generators.iter().find(|g| !self.generators.contains(g)) {
            return Err(GeneratorError::NotFound {
                name: unknown.clone(),
                available: self.generators.names(),
            }
            .into());
        }

        self.fetch(&mut graph).await?;

        let layout = self.project.layout(&self.settings);
        layout.create()?;
        let generated =
            self.generators
                .emit(generators, &graph, &self.settings, &layout.generators_dir())?;
        tracing::info!(
            "Generated {} file(s) in {}",
            generated.len(),
            layout.generators_dir().display()
        );

        if !self.locked {
            lock.save(&self.project.lock_path())?;
        }

        Ok(Installation {
            graph,
            settings: self.settings.clone(),
            layout,
            generated,
            lock,
        })
    }
}

impl Installation {
    /// Idle build driver over this installation's layout
    pub fn driver(&self, tool: Box<dyn BuildTool>) -> BuildDriver {
        BuildDriver::from_boxed(tool, self.layout.clone(), self.settings.clone())
    }
}
