//! Error types for the citeguard engine

use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Citation token could not be parsed
    #[error("Invalid citation format: {0}")]
    InvalidCitation(String),

    /// Line range violates `end_line >= start_line >= 1`
    #[error("Invalid line range {start}-{end}: {reason}")]
    InvalidLineRange { start: u32, end: u32, reason: String },

    /// IO error while loading files into the cache
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Directory walk failed
    #[error("Directory walk failed: {0}")]
    WalkError(#[from] walkdir::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
