//! Kiln - dependency-aware native build orchestrator
//!
//! Kiln reads a declarative recipe (`kiln.toml`) naming a project's native
//! library requirements, resolves them against a package repository into a
//! conflict-free graph for one platform profile, emits build-tool input
//! (CMake config packages, toolchain files, JSON) and drives a two-stage
//! configure/build pipeline.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Settings, resolution, generation, build driving
//! - [`registry`] - Package repository trait and implementations
//! - [`infra`] - Platform directories and external processes
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;
pub mod registry;

#[cfg(test)]
pub mod test_utils;
