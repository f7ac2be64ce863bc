//! Install command implementation
//!
//! Implements `kiln install`: resolve, fetch, emit generator output and
//! write kiln.lock.

use anyhow::Result;
use std::path::Path;

use crate::cli::commands::common::{ResolveArgs, Session};
use crate::cli::output::{create_spinner, detail, success};
use crate::core::pipeline::Installation;

/// Execute the install command
pub async fn execute(project_dir: &Path, args: &ResolveArgs, locked: bool, json: bool) -> Result<()> {
    let session = Session::open(project_dir, args)?;
    let installation = install(&session, locked).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary(&installation))?);
    } else {
        report(&installation);
    }
    Ok(())
}

/// Run the install pipeline behind a spinner
pub async fn install(session: &Session, locked: bool) -> Result<Installation> {
    let spinner = create_spinner(&format!(
        "Installing dependencies of {}...",
        session.project.recipe().project.name
    ));
    let result = session.pipeline().locked(locked).install().await;
    spinner.finish_and_clear();
    Ok(result?)
}

/// Print a human-readable summary
pub fn report(installation: &Installation) {
    success(&format!(
        "Installed {} package(s) for {}",
        installation.graph.len(),
        installation.settings
    ));
    for node in installation.graph.nodes() {
        detail(&format!("{} ({})", node.reference(), node.config_hash().short()));
    }
    if !installation.generated.is_empty() {
        success(&format!(
            "Generated {} file(s) in {}",
            installation.generated.len(),
            installation.layout.generators_dir().display()
        ));
    }
}

/// JSON summary of an installation
pub fn summary(installation: &Installation) -> serde_json::Value {
    let packages: Vec<serde_json::Value> = installation
        .graph
        .nodes()
        .iter()
        .map(|node| {
            serde_json::json!({
                "name": node.name,
                "version": node.version,
                "config_hash": node.config_hash().to_string(),
                "package_folder": node.folder().display().to_string(),
            })
        })
        .collect();

    serde_json::json!({
        "settings": installation.settings.key(),
        "build_dir": installation.layout.build_dir().display().to_string(),
        "packages": packages,
        "generated": installation
            .generated
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>(),
    })
}
