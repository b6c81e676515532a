//! Error types for the policy crate.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the policy error type.
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Errors raised while resolving or executing a script request.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The resolved underlying script is not declared in the manifest.
    #[error("Script {0} is not defined")]
    ScriptNotDefined(String),

    /// A flag was requested that the policy does not allow.
    #[error("flag '{flag}' is not allowed for script '{script}'")]
    UnknownFlag {
        /// The offending flag name.
        flag: String,
        /// The requested script.
        script: String,
    },

    /// A flag value had the wrong type for its spec.
    #[error("flag '{flag}' for script '{script}' expects a {expected} value")]
    FlagType {
        /// The offending flag name.
        flag: String,
        /// The requested script.
        script: String,
        /// The expected value kind.
        expected: &'static str,
    },

    /// A string flag was given an empty value without `allow_empty`.
    #[error("flag '{flag}' for script '{script}' must not be empty")]
    EmptyFlagValue {
        /// The offending flag name.
        flag: String,
        /// The requested script.
        script: String,
    },

    /// The project manifest could not be read.
    #[error("failed to read manifest {path}: {source}")]
    ManifestRead {
        /// Absolute path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The project manifest was not valid JSON.
    #[error("failed to parse manifest {path}: {source}")]
    ManifestParse {
        /// Absolute path that was parsed.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// The script process could not be spawned.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that was invoked.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Other I/O failure while supervising the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_not_defined_message() {
        let err = PolicyError::ScriptNotDefined("deploy".into());
        assert_eq!(err.to_string(), "Script deploy is not defined");
    }

    #[test]
    fn test_unknown_flag_message_names_both() {
        let err = PolicyError::UnknownFlag {
            flag: "force".into(),
            script: "test".into(),
        };
        let text = err.to_string();
        assert!(text.contains("force"));
        assert!(text.contains("test"));
    }
}
