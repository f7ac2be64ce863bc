//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod clean;
pub mod common;
pub mod graph;
pub mod install;
pub mod profile;

use anyhow::Result;
use clap::Subcommand;

use common::ResolveArgs;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve and fetch dependencies, then emit generator output
    Install {
        #[command(flatten)]
        args: ResolveArgs,

        /// Fail if the resolution differs from kiln.lock
        #[arg(long)]
        locked: bool,
    },

    /// Install, then run the configure and build stages
    Build {
        #[command(flatten)]
        args: ResolveArgs,

        /// Fail if the resolution differs from kiln.lock
        #[arg(long)]
        locked: bool,

        /// Number of parallel jobs
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Display the resolved dependency graph
    Graph {
        #[command(flatten)]
        args: ResolveArgs,

        /// Show only the subtree of this package
        #[arg(long)]
        package: Option<String>,

        /// Output in DOT graph format
        #[arg(long)]
        dot: bool,
    },

    /// Remove build layouts
    Clean {
        #[command(flatten)]
        args: ResolveArgs,

        /// Remove only the layout of the selected profile
        #[arg(long)]
        current: bool,
    },

    /// Manage profiles
    #[command(subcommand)]
    Profile(ProfileCommands),
}

/// Profile subcommands
#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Detect the host profile and save it
    Detect {
        /// Profile name
        #[arg(long, default_value = "default")]
        name: String,

        /// Overwrite an existing profile
        #[arg(short, long)]
        force: bool,
    },

    /// Show a profile after normalization
    Show {
        /// Profile name or path (detected host profile if omitted)
        name: Option<String>,

        /// Override a setting (key=value)
        #[arg(short = 's', long = "setting", value_name = "KEY=VALUE")]
        settings: Vec<String>,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self, json: bool) -> Result<()> {
        let current_dir = std::env::current_dir()?;
        match self {
            Self::Install { args, locked } => install::execute(&current_dir, &args, locked, json).await,
            Self::Build { args, locked, jobs } => {
                let options = build::BuildOptions { locked, jobs };
                build::execute(&current_dir, &args, options).await
            }
            Self::Graph { args, package, dot } => {
                let format = if dot {
                    graph::GraphFormat::Dot
                } else if json {
                    graph::GraphFormat::Json
                } else {
                    graph::GraphFormat::Tree
                };
                graph::execute(&current_dir, &args, package.as_deref(), format).await
            }
            Self::Clean { args, current } => clean::execute(&current_dir, &args, current, json),
            Self::Profile(ProfileCommands::Detect { name, force }) => profile::detect(&name, force, json),
            Self::Profile(ProfileCommands::Show { name, settings }) => {
                profile::show(name.as_deref(), &settings, json)
            }
        }
    }
}
