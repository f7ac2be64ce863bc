//! Requirement declarations
//!
//! A requirement names a package and a version spec, written in recipes as
//! `name/version` (exact) or `name/[>=1.0 <2.0]` (range). Declaration order
//! is significant: it breaks ties during resolution and ordering.

use regex::Regex;
use semver::{Version, VersionReq};
use std::fmt;
use std::sync::OnceLock;

use crate::error::RequirementError;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.+-]*$").expect("static regex is valid")
    })
}

/// Version constraint on a package
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionSpec {
    /// Exactly this version string
    Exact(String),
    /// Any version admitted by the range
    Range(VersionReq),
}

/// Outcome of reconciling a second constraint with an existing selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconcile {
    /// Existing selection satisfies both constraints
    Keep,
    /// Constraint tightens to the given spec
    Narrow(VersionSpec),
    /// Constraints are incompatible
    Conflict,
}

impl VersionSpec {
    /// Parse a version spec; bracketed text is a range
    pub fn parse(package: &str, text: &str) -> Result<Self, RequirementError> {
        let text = text.trim();
        if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            return parse_range(inner)
                .map(Self::Range)
                .map_err(|reason| RequirementError::InvalidRange {
                    package: package.to_string(),
                    range: text.to_string(),
                    reason,
                });
        }
        if text.is_empty() || !name_pattern().is_match(text) {
            return Err(RequirementError::InvalidReference {
                reference: format!("{package}/{text}"),
                reason: "version must be non-empty and contain no spaces".to_string(),
            });
        }
        Ok(Self::Exact(text.to_string()))
    }

    /// Whether a concrete version satisfies this spec
    pub fn matches(&self, version: &str) -> bool {
        match self {
            Self::Exact(v) => versions_equal(v, version),
            Self::Range(req) => lenient_version(version).is_some_and(|v| req.matches(&v)),
        }
    }

    /// Whether this spec pins a single version
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }

    /// Pick the version this spec selects from the available ones
    ///
    /// Exact specs pick their own version if present; ranges pick the
    /// highest matching version.
    pub fn select<'a, I>(&self, available: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        match self {
            Self::Exact(_) => available.into_iter().find(|v| self.matches(v)),
            Self::Range(req) => available
                .into_iter()
                .filter_map(|v| lenient_version(v).map(|parsed| (parsed, v)))
                .filter(|(parsed, _)| req.matches(parsed))
                .max_by(|a, b| a.0.cmp(&b.0))
                .map(|(_, v)| v),
        }
    }

    /// Reconcile `incoming` with this spec, whose current pick is `selected`
    ///
    /// An exact version admitted by a range wins over the range. Two ranges
    /// keep the current pick when it satisfies both, and otherwise narrow to
    /// their intersection.
    pub fn reconcile(&self, selected: &str, incoming: &VersionSpec) -> Reconcile {
        if self == incoming {
            return Reconcile::Keep;
        }
        match (self, incoming) {
            (Self::Exact(a), Self::Exact(b)) => {
                if versions_equal(a, b) {
                    Reconcile::Keep
                } else {
                    Reconcile::Conflict
                }
            }
            (Self::Exact(a), Self::Range(_)) => {
                if incoming.matches(a) {
                    Reconcile::Keep
                } else {
                    Reconcile::Conflict
                }
            }
            (Self::Range(_), Self::Exact(b)) => {
                if self.matches(b) {
                    Reconcile::Narrow(incoming.clone())
                } else {
                    Reconcile::Conflict
                }
            }
            (Self::Range(current), Self::Range(other)) => {
                if incoming.matches(selected) {
                    Reconcile::Keep
                } else {
                    let mut comparators = current.comparators.clone();
                    comparators.extend(other.comparators.iter().cloned());
                    Reconcile::Narrow(Self::Range(VersionReq { comparators }))
                }
            }
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "{v}"),
            Self::Range(req) => write!(f, "[{req}]"),
        }
    }
}

fn parse_range(inner: &str) -> Result<VersionReq, String> {
    let comparators: Vec<&str> = inner
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect();
    if comparators.is_empty() {
        return Err("empty range".to_string());
    }
    VersionReq::parse(&comparators.join(", ")).map_err(|e| e.to_string())
}

/// Parse a version, padding missing minor/patch components with zero
///
/// `1.0` becomes `1.0.0`; versions with more than three numeric components
/// or non-numeric components are not semver-comparable and yield `None`.
pub fn lenient_version(text: &str) -> Option<Version> {
    if let Ok(v) = Version::parse(text) {
        return Some(v);
    }
    let split_at = text.find(['-', '+']).unwrap_or(text.len());
    let (core, suffix) = text.split_at(split_at);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }
    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    Version::parse(&format!("{padded}{suffix}")).ok()
}

fn versions_equal(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (lenient_version(a), lenient_version(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// A single `(name, version spec)` requirement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    /// Package name
    pub name: String,
    /// Version constraint
    pub spec: VersionSpec,
}

impl Requirement {
    /// Create a requirement from already-validated parts
    pub fn new(name: impl Into<String>, spec: VersionSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    /// Parse a `name/version` reference
    pub fn parse(reference: &str) -> Result<Self, RequirementError> {
        let reference = reference.trim();
        let (name, version) =
            reference
                .split_once('/')
                .ok_or_else(|| RequirementError::InvalidReference {
                    reference: reference.to_string(),
                    reason: "expected 'name/version'".to_string(),
                })?;

        if !name_pattern().is_match(name) {
            return Err(RequirementError::InvalidReference {
                reference: reference.to_string(),
                reason: format!("invalid package name '{name}'"),
            });
        }

        let spec = VersionSpec::parse(name, version)?;
        Ok(Self::new(name, spec))
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.spec)
    }
}

/// Ordered requirement list, unique by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementSet {
    entries: Vec<Requirement>,
}

impl RequirementSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse references in declaration order
    pub fn from_references<I, S>(references: I) -> Result<Self, RequirementError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for reference in references {
            set.push(Requirement::parse(reference.as_ref())?)?;
        }
        Ok(set)
    }

    /// Append a requirement; a second entry for the same name is rejected
    pub fn push(&mut self, requirement: Requirement) -> Result<(), RequirementError> {
        if self.contains(&requirement.name) {
            return Err(RequirementError::Duplicate {
                name: requirement.name,
            });
        }
        self.entries.push(requirement);
        Ok(())
    }

    /// Whether a requirement for `name` exists
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|r| r.name == name)
    }

    /// Requirements in declaration order
    pub fn iter(&self) -> std::slice::Iter<'_, Requirement> {
        self.entries.iter()
    }

    /// Number of requirements
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a RequirementSet {
    type Item = &'a Requirement;
    type IntoIter = std::slice::Iter<'a, Requirement>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
