//! Error types for the pipeline crate.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the pipeline error type.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while loading, validating, or executing a pipeline.
///
/// Load-time errors are configuration errors and carry the offending node
/// and field. Node execution failures are NOT errors at this level - they
/// are recorded in the node's outcome and halt the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline file could not be read.
    #[error("failed to read pipeline {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The pipeline YAML was malformed or used an unknown node type.
    #[error("failed to parse pipeline: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A pipeline declared no nodes.
    #[error("pipeline must declare at least one node")]
    Empty,

    /// Two nodes share an id.
    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    /// A node field failed validation.
    #[error("node '{node}': invalid field '{field}': {message}")]
    Validation {
        /// The offending node id.
        node: String,
        /// The offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_node_and_field() {
        let err = PipelineError::Validation {
            node: "build".into(),
            field: "outputSchema".into(),
            message: "unparseable schema".into(),
        };
        let text = err.to_string();
        assert!(text.contains("build"));
        assert!(text.contains("outputSchema"));
    }
}
