//! Configuration hashing
//!
//! A [`ConfigHash`] identifies one package build configuration. It is a
//! SHA-256 over a length-prefixed encoding of name, version, settings and
//! options, all in sorted order, so the value is stable across runs and
//! machines and no two distinguishable configurations share an encoding.

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::package::PackageNode;
use crate::core::settings::Settings;

/// Encoding version, bumped whenever the encoding changes
const ENCODING_VERSION: &[u8] = b"kiln-config-v1";

/// Deterministic identity of a package configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigHash(String);

impl ConfigHash {
    /// Hash a resolved node
    pub fn of(node: &PackageNode) -> Self {
        Self::compute(&node.name, &node.version, &node.settings, &node.options)
    }

    /// Hash the raw configuration inputs
    pub fn compute(
        name: &str,
        version: &str,
        settings: &Settings,
        options: &BTreeMap<String, String>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(ENCODING_VERSION);

        update_field(&mut hasher, name.as_bytes());
        update_field(&mut hasher, version.as_bytes());

        let entries = settings.entries();
        update_len(&mut hasher, entries.len());
        for (key, value) in entries {
            update_field(&mut hasher, key.as_bytes());
            update_field(&mut hasher, value.as_bytes());
        }

        update_len(&mut hasher, options.len());
        for (key, value) in options {
            update_field(&mut hasher, key.as_bytes());
            update_field(&mut hasher, value.as_bytes());
        }

        Self(hex::encode(hasher.finalize()))
    }

    /// Full hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 16-character prefix for directory and file names
    pub fn short(&self) -> &str {
        &self.0[..16]
    }
}

fn update_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_le_bytes());
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    update_len(hasher, bytes.len());
    hasher.update(bytes);
}

impl fmt::Display for ConfigHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ConfigHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Hash a node; free-function form of [`ConfigHash::of`]
pub fn config_hash(node: &PackageNode) -> ConfigHash {
    ConfigHash::of(node)
}
