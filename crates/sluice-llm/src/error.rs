//! Error types for the LLM crate.

use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Error type for LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network/transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the provider.
        message: String,
    },

    /// Rate limited by the provider.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Backend-level failure (mock exhaustion, unexpected payloads).
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration problem (missing API key, bad URL).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Whether an error is worth retrying with backoff.
///
/// Transport failures, 5xx responses, and rate limits are transient;
/// everything else fails fast.
pub fn is_retryable(error: &LlmError) -> bool {
    match error {
        LlmError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        LlmError::Api { status, .. } => *status >= 500,
        LlmError::RateLimited(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = LlmError::Api {
            status: 400,
            message: "invalid model".into(),
        };
        assert_eq!(err.to_string(), "API error (400): invalid model");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&LlmError::RateLimited("slow down".into())));
        assert!(is_retryable(&LlmError::Api {
            status: 503,
            message: "overloaded".into()
        }));
        assert!(!is_retryable(&LlmError::Api {
            status: 401,
            message: "bad key".into()
        }));
        assert!(!is_retryable(&LlmError::Config("no key".into())));
    }
}
