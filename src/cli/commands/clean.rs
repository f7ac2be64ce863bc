//! CLI implementation for `kiln clean`
//!
//! Removes every build layout, or only the selected profile's layout with
//! `--current`.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::commands::common::{ResolveArgs, Session};
use crate::cli::output::{detail, format_bytes, success};
use crate::config::defaults::RECIPE_FILE;
use crate::core::clean::{clean_layout, clean_project, has_build_artifacts, CleanResult};

/// Execute the clean command
pub fn execute(path: &Path, args: &ResolveArgs, current: bool, json: bool) -> Result<()> {
    if !path.join(RECIPE_FILE).exists() {
        anyhow::bail!("No {RECIPE_FILE} found in {}", path.display());
    }

    let result = if current {
        let session = Session::open(path, args)?;
        clean_layout(&session.project.layout(&session.settings))
            .context("Failed to clean build layout")?
    } else if has_build_artifacts(path) {
        clean_project(path).context("Failed to clean build layouts")?
    } else {
        CleanResult::default()
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "removed": result.removed,
                "freed_bytes": result.freed_bytes,
            }))?
        );
    } else if result.is_empty() {
        success("Nothing to clean");
    } else {
        success(&format!("Freed {}", format_bytes(result.freed_bytes)));
        for name in &result.removed {
            detail(&format!("Removed build/{name}/"));
        }
    }
    Ok(())
}
