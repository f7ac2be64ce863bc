//! Settings model
//!
//! Canonicalizes the target platform identity (OS, compiler, build type,
//! architecture) into an immutable [`Settings`] value with a stable key.
//! Sub-settings such as `compiler.version` ride along in sorted order.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::error::SettingsError;

/// Required top-level fields, in canonical key order
pub const REQUIRED_FIELDS: &[&str] = &["arch", "build_type", "compiler", "os"];

/// Closed vocabulary for `build_type`
pub const BUILD_TYPES: &[&str] = &["Debug", "Release", "RelWithDebInfo", "MinSizeRel"];

fn value_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.+-]+$").expect("static regex is valid"))
}

/// A normalized target platform profile
///
/// Two `Settings` compare equal exactly when they describe the same profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Settings {
    os: String,
    compiler: String,
    build_type: String,
    arch: String,
    /// Dotted sub-settings (`compiler.version`, `os.distro`, ...)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    sub: BTreeMap<String, String>,
}

impl Settings {
    /// Normalize raw `key = value` pairs into a profile
    ///
    /// Values are trimmed, `build_type` is canonicalized case-insensitively,
    /// and every field is validated.
    pub fn normalize<K, V, I>(raw: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut top: BTreeMap<&'static str, String> = BTreeMap::new();
        let mut sub = BTreeMap::new();

        for (key, value) in raw {
            let key = key.as_ref().trim();
            let value = value.as_ref().trim();

            if let Some(field) = REQUIRED_FIELDS.iter().find(|f| **f == key) {
                top.insert(*field, value.to_string());
                continue;
            }

            match key.split_once('.') {
                Some((prefix, rest)) if REQUIRED_FIELDS.contains(&prefix) && !rest.is_empty() => {
                    validate_value(key, value)?;
                    sub.insert(key.to_string(), value.to_string());
                }
                _ => {
                    return Err(SettingsError::UnknownField {
                        field: key.to_string(),
                    })
                }
            }
        }

        let mut take = |field: &str| -> Result<String, SettingsError> {
            match top.remove(field) {
                Some(v) if !v.is_empty() => Ok(v),
                _ => Err(SettingsError::MissingField {
                    field: field.to_string(),
                }),
            }
        };

        let os = take("os")?;
        let compiler = take("compiler")?;
        let build_type = take("build_type")?;
        let arch = take("arch")?;

        validate_value("os", &os)?;
        validate_value("compiler", &compiler)?;
        validate_value("arch", &arch)?;
        let build_type = canonical_build_type(&build_type)?;

        Ok(Self {
            os,
            compiler,
            build_type,
            arch,
            sub,
        })
    }

    /// Detect the host profile
    ///
    /// Compiler defaults to `gcc` on Linux, `apple-clang` on macOS and `msvc`
    /// on Windows; build type defaults to `Release`.
    pub fn detect() -> Self {
        let os = match std::env::consts::OS {
            "linux" => "Linux",
            "macos" => "Macos",
            "windows" => "Windows",
            "freebsd" => "FreeBSD",
            other => other,
        };
        let compiler = match std::env::consts::OS {
            "macos" => "apple-clang",
            "windows" => "msvc",
            _ => "gcc",
        };
        let arch = match std::env::consts::ARCH {
            "aarch64" => "armv8",
            other => other,
        };

        Self {
            os: os.to_string(),
            compiler: compiler.to_string(),
            build_type: "Release".to_string(),
            arch: arch.to_string(),
            sub: BTreeMap::new(),
        }
    }

    /// Operating system
    pub fn os(&self) -> &str {
        &self.os
    }

    /// Compiler family
    pub fn compiler(&self) -> &str {
        &self.compiler
    }

    /// Build type, one of [`BUILD_TYPES`]
    pub fn build_type(&self) -> &str {
        &self.build_type
    }

    /// Target architecture
    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Look up any field or sub-setting by key
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "os" => Some(&self.os),
            "compiler" => Some(&self.compiler),
            "build_type" => Some(&self.build_type),
            "arch" => Some(&self.arch),
            other => self.sub.get(other).map(String::as_str),
        }
    }

    /// All settings as sorted `(key, value)` pairs
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = vec![
            ("arch", &self.arch),
            ("build_type", &self.build_type),
            ("compiler", &self.compiler),
            ("os", &self.os),
        ];
        entries.extend(self.sub.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        entries.sort_unstable();
        entries
    }

    /// Whether any sub-settings are present
    pub fn has_sub_settings(&self) -> bool {
        !self.sub.is_empty()
    }

    /// Stable canonical key, identical across runs and machines
    pub fn key(&self) -> String {
        self.entries()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Apply `key=value` overrides and re-normalize
    pub fn with_overrides<K, V, I>(&self, overrides: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut raw: BTreeMap<String, String> = self
            .entries()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (k, v) in overrides {
            raw.insert(k.as_ref().trim().to_string(), v.as_ref().to_string());
        }
        Self::normalize(raw)
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

fn validate_value(field: &str, value: &str) -> Result<(), SettingsError> {
    if value.is_empty() {
        return Err(SettingsError::MissingField {
            field: field.to_string(),
        });
    }
    if !value_pattern().is_match(value) {
        return Err(SettingsError::MalformedValue {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

fn canonical_build_type(value: &str) -> Result<String, SettingsError> {
    BUILD_TYPES
        .iter()
        .find(|bt| bt.eq_ignore_ascii_case(value))
        .map(|bt| (*bt).to_string())
        .ok_or_else(|| SettingsError::UnrecognizedValue {
            field: "build_type".to_string(),
            value: value.to_string(),
            allowed: BUILD_TYPES.iter().map(|s| (*s).to_string()).collect(),
        })
}
