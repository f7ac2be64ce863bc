//! Core business logic module
//!
//! # Submodules
//!
//! - [`settings`] - Platform settings model and normalization
//! - [`requirement`] - Requirement declarations and version specs
//! - [`options`] - Package option overrides
//! - [`package`] - Package descriptors and resolved nodes
//! - [`hash`] - Configuration hashing
//! - [`resolver`] - Dependency graph resolution
//! - [`generators`] - Build-tool input generators
//! - [`layout`] - Per-profile build directories
//! - [`driver`] - Configure/build state machine
//! - [`pipeline`] - Install orchestration
//! - [`lock`] - Lock file handling
//! - [`tree`] - Graph display
//! - [`recipe`] - Recipe (kiln.toml) parsing and validation
//! - [`profile`] - Profile files
//! - [`global_config`] - Global configuration management
//! - [`clean`] - Clean build layouts

pub mod clean;
pub mod driver;
pub mod generators;
pub mod global_config;
pub mod hash;
pub mod layout;
pub mod lock;
pub mod options;
pub mod package;
pub mod pipeline;
pub mod profile;
pub mod recipe;
pub mod requirement;
pub mod resolver;
pub mod settings;
pub mod tree;
