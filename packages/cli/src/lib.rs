//! Citeguard CLI - check and repair `[path:start-end]` citations in reports.
//!
//! - [`cli`]: argument parsing and the `evaluate` / `correct` commands
//! - [`render`]: human-readable summaries
//! - [`error`]: error types and Result alias

pub mod cli;
pub mod error;
pub mod render;

pub use error::{CliError, Result};
