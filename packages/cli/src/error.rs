//! Error types for the command-line interface.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Report or output file could not be read or written.
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Engine(#[from] citeguard_engine::EngineError),

    #[error(transparent)]
    Pipeline(#[from] citeguard_pipeline::PipelineError),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// `--strict` and failures remain after correction.
    #[error("{remaining} citation failure(s) remain after correction ({state})")]
    StrictFailure { remaining: usize, state: String },
}

pub type Result<T> = std::result::Result<T, CliError>;

impl CliError {
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}
