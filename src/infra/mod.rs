//! Infrastructure layer
//!
//! Platform directories and external processes.

pub mod dirs;
pub mod process;
