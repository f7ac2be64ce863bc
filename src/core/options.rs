//! Package option overrides
//!
//! Recipes override package options with `"pkg:option" = "value"` entries.
//! A `*` pattern applies to every package that declares the option, and
//! overrides only ever touch declared options.
//! Within one layer: package default < `*:option` < `pkg:option`. A later
//! layer beats an earlier one regardless of pattern.

use std::collections::BTreeMap;

use crate::error::RequirementError;

/// Option overrides declared by a recipe or profile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionOverrides {
    /// Overrides for every package declaring the option
    wildcard: BTreeMap<String, String>,
    /// Per-package overrides
    scoped: BTreeMap<String, BTreeMap<String, String>>,
}

impl OptionOverrides {
    /// Create an empty override set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `pattern:option = value` entries
    pub fn parse<K, V, I>(entries: I) -> Result<Self, RequirementError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut overrides = Self::new();
        for (key, value) in entries {
            let key = key.as_ref().trim();
            let (pattern, option) =
                key.split_once(':')
                    .ok_or_else(|| RequirementError::InvalidReference {
                        reference: key.to_string(),
                        reason: "option override must be 'package:option'".to_string(),
                    })?;
            if pattern.is_empty() || option.is_empty() {
                return Err(RequirementError::InvalidReference {
                    reference: key.to_string(),
                    reason: "option override must be 'package:option'".to_string(),
                });
            }
            overrides.set(pattern, option, value.as_ref());
        }
        Ok(overrides)
    }

    /// Set one override; `pattern` is a package name or `*`
    pub fn set(&mut self, pattern: &str, option: &str, value: &str) {
        if pattern == "*" {
            self.wildcard.insert(option.to_string(), value.to_string());
        } else {
            self.scoped
                .entry(pattern.to_string())
                .or_default()
                .insert(option.to_string(), value.to_string());
        }
    }

    /// Layer `other` on top of `self`
    #[must_use]
    pub fn merged_with(mut self, other: &Self) -> Self {
        for (k, v) in &other.wildcard {
            // an upper wildcard shadows lower scoped values for the same option
            for opts in self.scoped.values_mut() {
                opts.remove(k);
            }
            self.wildcard.insert(k.clone(), v.clone());
        }
        self.scoped.retain(|_, opts| !opts.is_empty());
        for (pkg, opts) in &other.scoped {
            let entry = self.scoped.entry(pkg.clone()).or_default();
            for (k, v) in opts {
                entry.insert(k.clone(), v.clone());
            }
        }
        self
    }

    /// Effective options for `package` given its declared defaults
    pub fn apply(&self, package: &str, defaults: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut options = defaults.clone();
        for (k, v) in &self.wildcard {
            if let Some(slot) = options.get_mut(k) {
                slot.clone_from(v);
            }
        }
        if let Some(scoped) = self.scoped.get(package) {
            for (k, v) in scoped {
                match options.get_mut(k) {
                    Some(slot) => slot.clone_from(v),
                    None => tracing::warn!(
                        "Ignoring override '{package}:{k}': {package} declares no option '{k}'"
                    ),
                }
            }
        }
        options
    }

    /// Whether no overrides are present
    pub fn is_empty(&self) -> bool {
        self.wildcard.is_empty() && self.scoped.is_empty()
    }
}
