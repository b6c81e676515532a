//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the config error type.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file exists but is not valid YAML for the schema.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path of the file.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_yaml::Error,
    },
}
