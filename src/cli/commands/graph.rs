//! CLI command for displaying the dependency graph
//!
//! Implements `kiln graph`. Only resolves; nothing is fetched or written.

use anyhow::{bail, Result};
use std::path::Path;

use crate::cli::commands::common::{ResolveArgs, Session};
use crate::core::tree::DependencyTree;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    /// Indented tree
    Tree,
    /// DOT digraph
    Dot,
    /// JSON document
    Json,
}

/// Execute the graph command
pub async fn execute(
    project_dir: &Path,
    args: &ResolveArgs,
    package: Option<&str>,
    format: GraphFormat,
) -> Result<()> {
    let session = Session::open(project_dir, args)?;
    let graph = session.pipeline().resolve().await?;
    let tree = DependencyTree::new(&graph);

    let output = match (format, package) {
        (GraphFormat::Tree, Some(name)) => match tree.format_tree_for_package(name) {
            Some(output) => output,
            None => bail!("Package '{name}' is not part of the resolved graph"),
        },
        (GraphFormat::Tree, None) => tree.format_tree(),
        (GraphFormat::Dot, _) => tree.format_dot(),
        (GraphFormat::Json, _) => tree.format_json()?,
    };
    print!("{output}");
    if !output.ends_with('\n') {
        println!();
    }
    Ok(())
}
