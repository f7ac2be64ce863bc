//! Output formatting and progress indicators
//!
//! This module provides utilities for displaying spinners, status lines and
//! errors, honoring the global `--quiet` and `--json` flags.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::OnceLock;

static GLOBAL: OnceLock<OutputConfig> = OnceLock::new();

/// Global output preferences from the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Suppress everything except errors
    pub quiet: bool,
    /// Machine-readable output
    pub json: bool,
    /// Verbosity level (`-v` count)
    pub verbose: u8,
}

impl OutputConfig {
    /// Create an output configuration
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Install as the process-wide configuration; first call wins
    pub fn apply_global(self) {
        let _ = GLOBAL.set(self);
    }

    /// Process-wide configuration
    pub fn current() -> Self {
        GLOBAL.get().copied().unwrap_or_default()
    }

    /// Whether human-oriented progress output should be shown
    pub fn show_progress(&self) -> bool {
        !self.quiet && !self.json
    }

    /// Tracing filter directive for this verbosity
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            (false, _) => "debug",
        }
    }
}

/// Create a spinner for operations with unknown duration
///
/// Hidden when progress output is disabled.
pub fn create_spinner(message: &str) -> ProgressBar {
    if !OutputConfig::current().show_progress() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.blue} {msg}")
            .expect("Invalid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

/// Print a success line unless output is quiet or JSON
pub fn success(message: &str) {
    if OutputConfig::current().show_progress() {
        println!("{} {message}", status::SUCCESS);
    }
}

/// Print an indented detail line unless output is quiet or JSON
pub fn detail(message: &str) {
    if OutputConfig::current().show_progress() {
        println!("  {message}");
    }
}

/// Print a warning to stderr unless output is quiet
pub fn warning(message: &str) {
    if !OutputConfig::current().quiet {
        eprintln!("{} {message}", status::WARNING);
    }
}

/// Print an error and its cause chain to stderr
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{} {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}

/// Format a byte count for humans
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level() {
        assert_eq!(OutputConfig::new(false, false, 0).log_level(), "warn");
        assert_eq!(OutputConfig::new(false, false, 1).log_level(), "info");
        assert_eq!(OutputConfig::new(false, false, 3).log_level(), "debug");
        assert_eq!(OutputConfig::new(true, false, 2).log_level(), "error");
    }

    #[test]
    fn test_progress_hidden_for_json() {
        assert!(!OutputConfig::new(false, true, 0).show_progress());
        assert!(OutputConfig::new(false, false, 0).show_progress());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
