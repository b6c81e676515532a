//! Error types for the run manager.

use std::path::PathBuf;

use thiserror::Error;

use crate::meta::RunStatus;

/// Result type alias using the run error type.
pub type Result<T> = std::result::Result<T, RunError>;

/// Errors raised while supervising runs.
#[derive(Debug, Error)]
pub enum RunError {
    /// No run with this id exists in the store.
    #[error("run not found: {0}")]
    NotFound(String),

    /// The run's persisted status does not permit the operation.
    #[error("run {id} cannot be resumed from status '{status}'")]
    NotResumable {
        /// The run id.
        id: String,
        /// Its current persisted status.
        status: RunStatus,
    },

    /// The run's pipeline or prompt file failed to load.
    #[error(transparent)]
    Pipeline(#[from] sluice_pipeline::PipelineError),

    /// The run's prompt file failed to parse.
    #[error(transparent)]
    Prompt(#[from] sluice_agent::AgentError),

    /// Metadata or log serialization failed.
    #[error("failed to serialize run record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// I/O failure with the path included.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl RunError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
