//! Dependency graph visualization
//!
//! Renders a [`ResolvedGraph`] as an indented tree, as a DOT digraph, or as
//! JSON for tooling.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use crate::core::resolver::ResolvedGraph;

/// Read-only view over a resolved graph
#[derive(Debug, Clone, Copy)]
pub struct DependencyTree<'a> {
    graph: &'a ResolvedGraph,
}

/// JSON shape of one node
#[derive(Debug, Serialize)]
struct JsonNode<'a> {
    name: &'a str,
    version: &'a str,
    config_hash: String,
    dependencies: &'a [String],
    options: &'a BTreeMap<String, String>,
}

/// JSON shape of the whole graph
#[derive(Debug, Serialize)]
struct JsonGraph<'a> {
    roots: &'a [String],
    build_order: Vec<&'a str>,
    packages: Vec<JsonNode<'a>>,
}

impl<'a> DependencyTree<'a> {
    /// View `graph`
    pub fn new(graph: &'a ResolvedGraph) -> Self {
        Self { graph }
    }

    /// Format as tree string
    pub fn format_tree(&self) -> String {
        if self.graph.is_empty() {
            return "No packages in project".to_string();
        }

        let mut output = String::from("Dependency Tree:\n");
        let roots = self.graph.roots();
        for (i, root) in roots.iter().enumerate() {
            self.format_node(&mut output, root, "", i == roots.len() - 1, &mut HashSet::new());
        }
        output
    }

    /// Format the subtree below one package
    pub fn format_tree_for_package(&self, package: &str) -> Option<String> {
        self.graph.get(package)?;
        let mut output = format!("Dependencies for '{package}':\n");
        self.format_node(&mut output, package, "", true, &mut HashSet::new());
        Some(output)
    }

    fn format_node(
        &self,
        output: &mut String,
        name: &str,
        prefix: &str,
        is_last: bool,
        path: &mut HashSet<String>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let label = self
            .graph
            .get(name)
            .map_or_else(|| name.to_string(), |n| n.reference());
        let _ = writeln!(output, "{prefix}{connector}{label}");

        // A resolved graph is acyclic; the guard only bounds recursion.
        if !path.insert(name.to_string()) {
            return;
        }

        if let Some(node) = self.graph.get(name) {
            let child_prefix = if is_last {
                format!("{prefix}    ")
            } else {
                format!("{prefix}│   ")
            };
            for (i, dep) in node.dependencies.iter().enumerate() {
                let last = i == node.dependencies.len() - 1;
                self.format_node(output, dep, &child_prefix, last, path);
            }
        }

        path.remove(name);
    }

    /// Format as DOT graph
    pub fn format_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph dependencies {\n");
        output.push_str("    rankdir=TB;\n");
        output.push_str("    node [shape=box];\n");
        output.push('\n');

        for name in self.graph.build_order() {
            if let Some(node) = self.graph.get(name) {
                let _ = writeln!(output, "    \"{}\" [label=\"{}\"];", node.name, node.reference());
            }
        }
        output.push('\n');

        for name in self.graph.build_order() {
            if let Some(node) = self.graph.get(name) {
                for dep in &node.dependencies {
                    let _ = writeln!(output, "    \"{}\" -> \"{dep}\";", node.name);
                }
            }
        }

        output.push_str("}\n");
        output
    }

    /// Format as pretty-printed JSON
    pub fn format_json(&self) -> Result<String, serde_json::Error> {
        let build_order = self.graph.build_order();
        let packages = build_order
            .iter()
            .filter_map(|name| self.graph.get(name))
            .map(|node| JsonNode {
                name: &node.name,
                version: &node.version,
                config_hash: node.config_hash().to_string(),
                dependencies: &node.dependencies,
                options: &node.options,
            })
            .collect();

        serde_json::to_string_pretty(&JsonGraph {
            roots: self.graph.roots(),
            build_order,
            packages,
        })
    }
}
