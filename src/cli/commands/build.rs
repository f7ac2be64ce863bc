//! Build command implementation
//!
//! Implements `kiln build`: install, then run the configure and build
//! stages in the profile's build layout. Ctrl-C cancels the running stage.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::cli::commands::common::{ResolveArgs, Session};
use crate::cli::commands::install;
use crate::cli::output::{create_spinner, success, OutputConfig};
use crate::core::driver::BuildState;
use crate::infra::process::LineSink;

/// Build options
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Fail if packages differ from lock file
    pub locked: bool,
    /// Number of parallel jobs
    pub jobs: Option<usize>,
}

/// Execute the build command
pub async fn execute(project_dir: &Path, args: &ResolveArgs, options: BuildOptions) -> Result<()> {
    let session = Session::open(project_dir, args)?;
    let recipe = session.project.recipe();

    let installation = install::install(&session, options.locked).await?;
    install::report(&installation);

    let jobs = options.jobs.unwrap_or_else(|| session.config.build_jobs());
    let tool = recipe
        .build_tool(jobs)
        .context("Failed to select build tool")?;
    tracing::info!("Building {} with {}", recipe.project.name, tool.name());

    let spinner = create_spinner("Configuring...");
    let sink: LineSink = {
        let spinner = spinner.clone();
        Arc::new(move |line: &str| spinner.set_message(line.trim().to_string()))
    };

    let mut driver = installation
        .driver(tool)
        .with_timeouts(recipe.stage_timeouts(session.config.stage_timeouts()))
        .with_output_sink(sink);

    let cancel = driver.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling build");
            cancel.cancel();
        }
    });

    let result = async {
        driver.configure().await?;
        spinner.set_message("Building...");
        driver.build().await
    }
    .await;
    interrupt.abort();
    spinner.finish_and_clear();
    result?;

    debug_assert_eq!(driver.state(), BuildState::Succeeded);
    if OutputConfig::current().json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "state": driver.state().to_string(),
                "build_dir": driver.layout().build_dir().display().to_string(),
            }))?
        );
    } else {
        success(&format!(
            "Build succeeded in {}",
            driver.layout().build_dir().display()
        ));
    }
    Ok(())
}
