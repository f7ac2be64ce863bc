//! CLI implementation for `kiln profile`

use anyhow::{bail, Context, Result};

use crate::cli::commands::common::load_profile;
use crate::cli::output::success;
use crate::core::profile::{parse_key_values, Profile};
use crate::infra::dirs::KilnDirs;

/// Detect the host profile and write it to the profiles directory
pub fn detect(name: &str, force: bool, json: bool) -> Result<()> {
    let dirs = KilnDirs::new();
    let path = dirs.profiles_dir().join(format!("{name}.toml"));
    if path.exists() && !force {
        bail!(
            "Profile '{name}' already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    let profile = Profile::detect();
    std::fs::create_dir_all(dirs.profiles_dir())
        .with_context(|| format!("Failed to create {}", dirs.profiles_dir().display()))?;
    std::fs::write(&path, profile.to_toml()?)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "name": name,
                "path": path.display().to_string(),
                "settings": profile.settings,
            }))?
        );
    } else {
        success(&format!("Saved detected profile to {}", path.display()));
        print!("{}", profile.to_toml()?);
    }
    Ok(())
}

/// Print a profile after normalization
pub fn show(name: Option<&str>, overrides: &[String], json: bool) -> Result<()> {
    let dirs = KilnDirs::new();
    let profile = load_profile(name, &dirs)?.unwrap_or_else(Profile::detect);
    let settings = profile.to_settings(&parse_key_values(overrides)?)?;

    let normalized = Profile {
        settings: Profile::from_settings(&settings).settings,
        options: profile.options,
    };
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "key": settings.key(),
                "settings": normalized.settings,
                "options": normalized.options,
            }))?
        );
    } else {
        print!("{}", normalized.to_toml()?);
    }
    Ok(())
}
