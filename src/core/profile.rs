//! Profiles
//!
//! A profile is a TOML file with a `[settings]` table and an optional
//! `[options]` table:
//!
//! ```toml
//! [settings]
//! os = "Linux"
//! arch = "x86_64"
//! compiler = "gcc"
//! "compiler.version" = "13"
//! build_type = "Release"
//!
//! [options]
//! "*:shared" = "False"
//! ```
//!
//! Profiles are raw field maps; they only become [`Settings`] after all
//! layers are merged and normalized.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::options::OptionOverrides;
use crate::core::settings::Settings;
use crate::error::{FilesystemError, KilnError, RequirementError, SettingsError};
use crate::infra::dirs::KilnDirs;

/// Profile file contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Raw settings fields
    #[serde(default)]
    pub settings: BTreeMap<String, String>,

    /// Option overrides, `"pkg:option" = "value"`
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl Profile {
    /// Profile describing the host
    pub fn detect() -> Self {
        Self::from_settings(&Settings::detect())
    }

    /// Profile holding exactly `settings`
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            settings: settings
                .entries()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            options: BTreeMap::new(),
        }
    }

    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load a profile file
    pub fn load(path: &Path) -> Result<Self, KilnError> {
        let content = std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
            .map_err(|e| KilnError::Generic(format!("Invalid profile '{}': {e}", path.display())))
    }

    /// Find a profile by path, or by name under the profiles directory
    pub fn locate(name_or_path: &str, dirs: &KilnDirs) -> Option<PathBuf> {
        let direct = PathBuf::from(name_or_path);
        if direct.is_file() {
            return Some(direct);
        }
        let named = dirs.profiles_dir().join(format!("{name_or_path}.toml"));
        named.is_file().then_some(named)
    }

    /// Layer `other` on top of this profile
    #[must_use]
    pub fn merged_with(mut self, other: &Self) -> Self {
        self.settings
            .extend(other.settings.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.options
            .extend(other.options.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Normalize into [`Settings`], applying `overrides` last
    pub fn to_settings<K, V>(&self, overrides: &[(K, V)]) -> Result<Settings, SettingsError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut raw = self.settings.clone();
        for (k, v) in overrides {
            raw.insert(k.as_ref().trim().to_string(), v.as_ref().to_string());
        }
        Settings::normalize(raw)
    }

    /// Option overrides declared by this profile
    pub fn option_overrides(&self) -> Result<OptionOverrides, RequirementError> {
        OptionOverrides::parse(&self.options)
    }
}

/// Split `key=value` command-line pairs
pub fn parse_key_values(pairs: &[String]) -> Result<Vec<(String, String)>, KilnError> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| KilnError::Generic(format!("Expected key=value, got '{pair}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const GCC13: &str = r#"
[settings]
os = "Linux"
arch = "x86_64"
compiler = "gcc"
"compiler.version" = "13"
build_type = "debug"

[options]
"*:shared" = "True"
"#;

    #[test]
    fn test_parse_and_normalize() {
        let profile = Profile::from_toml(GCC13).unwrap();
        let settings = profile.to_settings::<&str, &str>(&[]).unwrap();
        assert_eq!(settings.build_type(), "Debug");
        assert_eq!(settings.get("compiler.version"), Some("13"));
        assert!(!profile.option_overrides().unwrap().is_empty());
    }

    #[test]
    fn test_overrides_win() {
        let profile = Profile::from_toml(GCC13).unwrap();
        let settings = profile.to_settings(&[("build_type", "Release")]).unwrap();
        assert_eq!(settings.build_type(), "Release");
    }

    #[test]
    fn test_merge_layers() {
        let base = Profile::from_toml(GCC13).unwrap();
        let mut top = Profile::default();
        top.settings.insert("compiler".into(), "clang".into());

        let merged = base.merged_with(&top);
        assert_eq!(merged.settings["compiler"], "clang");
        assert_eq!(merged.settings["os"], "Linux");
    }

    #[test]
    fn test_incomplete_profile_fails_normalization() {
        let mut profile = Profile::default();
        profile.settings.insert("os".into(), "Linux".into());
        assert!(matches!(
            profile.to_settings::<&str, &str>(&[]),
            Err(SettingsError::MissingField { .. })
        ));
    }

    #[test]
    fn test_detect_is_complete() {
        assert!(Profile::detect().to_settings::<&str, &str>(&[]).is_ok());
    }

    #[test]
    fn test_locate_by_name_and_path() {
        let temp = TempDir::new().unwrap();
        let dirs = KilnDirs::from_paths(temp.path(), temp.path());
        std::fs::create_dir_all(dirs.profiles_dir()).unwrap();
        let named = dirs.profiles_dir().join("gcc13.toml");
        std::fs::write(&named, GCC13).unwrap();

        assert_eq!(Profile::locate("gcc13", &dirs), Some(named.clone()));
        assert_eq!(
            Profile::locate(named.to_str().unwrap(), &dirs),
            Some(named.clone())
        );
        assert_eq!(Profile::locate("missing", &dirs), None);
        assert_eq!(Profile::load(&named).unwrap(), Profile::from_toml(GCC13).unwrap());
    }

    #[test]
    fn test_parse_key_values() {
        let pairs = parse_key_values(&["build_type=Debug".into(), " os = Linux ".into()]).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("build_type".to_string(), "Debug".to_string()),
                ("os".to_string(), "Linux".to_string())
            ]
        );
        assert!(parse_key_values(&["nonsense".into()]).is_err());
    }
}
