//! Dependency resolution
//!
//! Expands declared requirements breadth-first against a repository,
//! reconciles repeated package names into a single version, detects cycles
//! and computes the build order.
//!
//! Narrowing (a range tightened to an exact version or to an intersection)
//! restarts expansion with the narrowed spec pinned, so requirements that
//! came only from the discarded version do not leak into the result. A pin
//! is dropped once the package that asked for it may no longer be selected.

use std::collections::{BTreeSet, HashMap, HashSet};

use futures::future::try_join_all;

use crate::core::options::OptionOverrides;
use crate::core::package::PackageNode;
use crate::core::requirement::{Reconcile, Requirement, RequirementSet, VersionSpec};
use crate::core::settings::Settings;
use crate::error::{RepositoryError, ResolverError};
use crate::registry::{PackageMetadata, PackageRepository};

/// Label used as the requirer of top-level requirements
pub const ROOT_REQUIRER: &str = "<recipe>";

/// Upper bound on expansion restarts caused by narrowing
const MAX_NARROWING_PASSES: usize = 64;

/// Deduplicated, conflict-free package set in build order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedGraph {
    /// Nodes in topological order, dependencies first
    nodes: Vec<PackageNode>,
    /// Names of the top-level requirements, in declaration order
    roots: Vec<String>,
}

impl ResolvedGraph {
    /// Nodes in build order
    pub fn nodes(&self) -> &[PackageNode] {
        &self.nodes
    }

    /// Mutable nodes in build order
    pub fn nodes_mut(&mut self) -> &mut [PackageNode] {
        &mut self.nodes
    }

    /// Top-level package names
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Package names in build order
    pub fn build_order(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// Look up a node by name
    pub fn get(&self, name: &str) -> Option<&PackageNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Number of packages
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no packages
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A package picked during expansion
#[derive(Debug)]
struct Selection {
    spec: VersionSpec,
    required_by: String,
    meta: PackageMetadata,
}

/// Spec tightened by an earlier pass
#[derive(Debug, Clone)]
struct Pin {
    spec: VersionSpec,
    /// Package whose requirement forced the narrowing
    required_by: String,
    /// Conflict to report if nothing satisfies the pin
    conflict: ResolverError,
}

enum Expansion {
    Complete {
        selected: HashMap<String, Selection>,
        discovery: Vec<String>,
    },
    Narrowed {
        name: String,
        pin: Pin,
        /// `name` and everything it pulled in during the aborted pass
        affected: HashSet<String>,
    },
}

enum Outcome {
    Keep,
    Restart(String, Pin),
}

/// Resolver over an explicitly passed repository handle
#[derive(Debug)]
pub struct Resolver<'a, R> {
    repository: &'a R,
    overrides: OptionOverrides,
}

impl<'a, R: PackageRepository> Resolver<'a, R> {
    /// Create a resolver over `repository`
    pub fn new(repository: &'a R) -> Self {
        Self {
            repository,
            overrides: OptionOverrides::default(),
        }
    }

    /// Apply option overrides to resolved packages
    #[must_use]
    pub fn with_overrides(mut self, overrides: OptionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Resolve `requirements` for `settings` into a build-ordered graph
    pub async fn resolve(
        &self,
        requirements: &RequirementSet,
        settings: &Settings,
    ) -> Result<ResolvedGraph, ResolverError> {
        let mut pins: HashMap<String, Pin> = HashMap::new();
        let mut pass = 0;

        loop {
            pass += 1;
            match self.expand(requirements, settings, &pins).await? {
                Expansion::Complete {
                    selected,
                    discovery,
                } => {
                    let order = topological_order(&selected, &discovery)?;
                    let graph = self.build_graph(requirements, settings, selected, &order);
                    tracing::info!(
                        "Resolved {} packages: {}",
                        graph.len(),
                        graph.build_order().join(", ")
                    );
                    return Ok(graph);
                }
                Expansion::Narrowed { pin, .. } if pass >= MAX_NARROWING_PASSES => {
                    return Err(pin.conflict);
                }
                Expansion::Narrowed {
                    name,
                    pin,
                    affected,
                } => {
                    tracing::debug!(
                        "Pass {pass}: narrowing '{name}' to {}, restarting expansion",
                        pin.spec
                    );
                    pins.retain(|pinned, p| {
                        let stale = affected.contains(&p.required_by);
                        if stale {
                            tracing::debug!(
                                "Dropping pin on '{pinned}' from '{}'",
                                p.required_by
                            );
                        }
                        !stale
                    });
                    pins.insert(name, pin);
                }
            }
        }
    }

    async fn expand(
        &self,
        requirements: &RequirementSet,
        settings: &Settings,
        pins: &HashMap<String, Pin>,
    ) -> Result<Expansion, ResolverError> {
        let mut selected: HashMap<String, Selection> = HashMap::new();
        let mut discovery: Vec<String> = Vec::new();
        let mut frontier: Vec<(Requirement, String)> = requirements
            .iter()
            .map(|r| (r.clone(), ROOT_REQUIRER.to_string()))
            .collect();

        while !frontier.is_empty() {
            let mut pending: Vec<(String, VersionSpec, String)> = Vec::new();
            let mut deferred: Vec<(Requirement, String)> = Vec::new();

            for (req, by) in frontier {
                if let Some(sel) = selected.get_mut(&req.name) {
                    if let Outcome::Restart(name, pin) = reconcile(sel, &req, &by)? {
                        return Ok(narrowed(&selected, name, pin));
                    }
                } else if pending.iter().any(|(name, _, _)| *name == req.name) {
                    deferred.push((req, by));
                } else if let Some(pin) = pins.get(&req.name) {
                    pending.push((req.name, pin.spec.clone(), pin.required_by.clone()));
                } else {
                    pending.push((req.name, req.spec, by));
                }
            }

            let lookups = pending
                .iter()
                .map(|(name, spec, _)| self.lookup(name, spec, settings, pins));
            let metas = try_join_all(lookups).await?;

            let mut next = Vec::new();
            for ((name, spec, by), meta) in pending.into_iter().zip(metas) {
                tracing::debug!("Selected {name}/{} (required by {by})", meta.resolved_version);
                next.extend(
                    meta.requirements
                        .iter()
                        .map(|r| (r.clone(), name.clone())),
                );
                discovery.push(name.clone());
                selected.insert(
                    name,
                    Selection {
                        spec,
                        required_by: by,
                        meta,
                    },
                );
            }

            for (req, by) in deferred {
                if let Some(sel) = selected.get_mut(&req.name) {
                    if let Outcome::Restart(name, pin) = reconcile(sel, &req, &by)? {
                        return Ok(narrowed(&selected, name, pin));
                    }
                }
            }

            frontier = next;
        }

        Ok(Expansion::Complete {
            selected,
            discovery,
        })
    }

    async fn lookup(
        &self,
        name: &str,
        spec: &VersionSpec,
        settings: &Settings,
        pins: &HashMap<String, Pin>,
    ) -> Result<PackageMetadata, ResolverError> {
        match self.repository.lookup(name, spec, settings).await {
            Ok(meta) => Ok(meta),
            Err(RepositoryError::NotFound { .. }) if pins.contains_key(name) => {
                Err(pins[name].conflict.clone())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn build_graph(
        &self,
        requirements: &RequirementSet,
        settings: &Settings,
        mut selected: HashMap<String, Selection>,
        order: &[String],
    ) -> ResolvedGraph {
        let nodes = order
            .iter()
            .filter_map(|name| selected.remove(name))
            .map(|sel| {
                let meta = sel.meta;
                PackageNode {
                    options: self.overrides.apply(&meta.name, &meta.options),
                    dependencies: meta.requirements.iter().map(|r| r.name.clone()).collect(),
                    name: meta.name,
                    version: meta.resolved_version,
                    settings: settings.clone(),
                    cpp_info: meta.cpp_info,
                    artifact: meta.artifact,
                    package_folder: None,
                }
            })
            .collect();

        ResolvedGraph {
            nodes,
            roots: requirements.iter().map(|r| r.name.clone()).collect(),
        }
    }
}

/// Reconcile a repeated requirement against the current selection
fn reconcile(sel: &mut Selection, req: &Requirement, by: &str) -> Result<Outcome, ResolverError> {
    match sel.spec.reconcile(&sel.meta.resolved_version, &req.spec) {
        Reconcile::Keep => Ok(Outcome::Keep),
        Reconcile::Conflict => Err(conflict(sel, req, by)),
        Reconcile::Narrow(spec) if spec.matches(&sel.meta.resolved_version) => {
            sel.spec = spec;
            Ok(Outcome::Keep)
        }
        Reconcile::Narrow(spec) => {
            let pin = Pin {
                spec,
                required_by: by.to_string(),
                conflict: conflict(sel, req, by),
            };
            Ok(Outcome::Restart(req.name.clone(), pin))
        }
    }
}

fn narrowed(selected: &HashMap<String, Selection>, name: String, pin: Pin) -> Expansion {
    let mut affected = HashSet::new();
    let mut stack = vec![name.clone()];
    while let Some(current) = stack.pop() {
        if !affected.insert(current.clone()) {
            continue;
        }
        if let Some(sel) = selected.get(&current) {
            stack.extend(sel.meta.requirements.iter().map(|r| r.name.clone()));
        }
    }
    Expansion::Narrowed {
        name,
        pin,
        affected,
    }
}

fn conflict(sel: &Selection, req: &Requirement, by: &str) -> ResolverError {
    let existing = if sel.spec.is_exact() {
        sel.spec.to_string()
    } else {
        format!("{} (selected {})", sel.spec, sel.meta.resolved_version)
    };
    ResolverError::VersionConflict {
        package: req.name.clone(),
        existing,
        existing_by: sel.required_by.clone(),
        requested: req.spec.to_string(),
        requested_by: by.to_string(),
    }
}

/// Kahn's algorithm; among ready packages the earliest discovered goes first
fn topological_order(
    selected: &HashMap<String, Selection>,
    discovery: &[String],
) -> Result<Vec<String>, ResolverError> {
    let index: HashMap<&str, usize> = discovery
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let deps: Vec<Vec<usize>> = discovery
        .iter()
        .map(|name| {
            selected[name]
                .meta
                .requirements
                .iter()
                .filter_map(|r| index.get(r.name.as_str()).copied())
                .collect()
        })
        .collect();

    let mut remaining: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); discovery.len()];
    for (node, node_deps) in deps.iter().enumerate() {
        for &dep in node_deps {
            dependents[dep].push(node);
        }
    }

    let mut ready: BTreeSet<usize> = (0..discovery.len())
        .filter(|&i| remaining[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(discovery.len());

    while let Some(next) = ready.pop_first() {
        order.push(discovery[next].clone());
        for &dependent in &dependents[next] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() == discovery.len() {
        return Ok(order);
    }

    let stuck: HashSet<usize> = (0..discovery.len())
        .filter(|&i| remaining[i] > 0)
        .collect();
    Err(ResolverError::CyclicDependency {
        cycle: find_cycle(&deps, &stuck, discovery),
    })
}

/// Walk dependency edges among `stuck` nodes until one repeats
fn find_cycle(deps: &[Vec<usize>], stuck: &HashSet<usize>, names: &[String]) -> Vec<String> {
    let Some(&start) = stuck.iter().min() else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut position: HashMap<usize, usize> = HashMap::from([(start, 0)]);
    let mut current = start;

    loop {
        // Every stuck node has at least one stuck dependency
        let Some(&next) = deps[current].iter().find(|d| stuck.contains(*d)) else {
            return path.iter().map(|&i| names[i].clone()).collect();
        };
        if let Some(&at) = position.get(&next) {
            let mut cycle: Vec<String> = path[at..].iter().map(|&i| names[i].clone()).collect();
            cycle.push(names[next].clone());
            return cycle;
        }
        position.insert(next, path.len());
        path.push(next);
        current = next;
    }
}
