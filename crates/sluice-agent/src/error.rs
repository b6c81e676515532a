//! Error types for the agent crate.

use thiserror::Error;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors raised by the tool-calling loop and its tools.
///
/// Tool-level failures are deliberately NOT represented here as loop
/// failures: a tool that cannot complete returns an error observation and
/// the loop continues. Only the model's own malformed output and resource
/// exhaustion terminate an execution.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model reply parsed as JSON but matched none of the accepted
    /// action payload shapes.
    #[error("Unsupported agent response shape")]
    UnsupportedShape,

    /// An action named something outside the accepted action set.
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    /// The iteration bound was exhausted without a terminal action or
    /// final answer.
    #[error("agent exceeded {0} iterations without completing")]
    MaxIterations(u32),

    /// The final answer failed schema validation after all permitted
    /// retries.
    #[error("agent output failed schema validation after {attempts} attempts: {errors}")]
    SchemaRejected {
        /// Number of validation attempts made.
        attempts: u32,
        /// Joined validation error messages from the last attempt.
        errors: String,
    },

    /// A requested tool is not registered.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// A tool failed in a way that is not recoverable in-conversation.
    #[error("tool error: {0}")]
    Tool(String),

    /// A prompt file was malformed.
    #[error("prompt file error: {0}")]
    Prompt(String),

    /// The LLM backend failed.
    #[error("LLM error: {0}")]
    Llm(#[from] sluice_llm::LlmError),

    /// The declared output schema could not be parsed.
    #[error("output schema error: {0}")]
    Schema(#[from] sluice_template::SchemaError),

    /// I/O failure with the resolved path included.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Resolved absolute path.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_shape_message() {
        assert_eq!(
            AgentError::UnsupportedShape.to_string(),
            "Unsupported agent response shape"
        );
    }

    #[test]
    fn test_io_error_names_path() {
        let err = AgentError::Io {
            path: "/work/missing.txt".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.to_string().contains("/work/missing.txt"));
    }
}
