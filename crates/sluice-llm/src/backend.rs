//! LLM backend trait, retry helper, and mock implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{LlmError, Result, is_retryable};
use crate::types::{CompletionRequest, CompletionResponse, ContentBlock, StopReason, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors (network failures, 5xx, rate limits).
/// Non-retryable errors are returned immediately.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;
    let mut backoff = initial_backoff;

    for attempt in 0..=max_retries {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(e);
                }

                last_error = Some(e);

                if attempt < max_retries {
                    tracing::warn!(
                        backend = backend_name,
                        attempt = attempt + 1,
                        max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| LlmError::Backend("retry loop exhausted".to_string())))
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for LLM backend providers.
///
/// Implementations provide the actual connection to a model service. Tools
/// are passed natively via `request.tools`; responses carry structured
/// `tool_use` content blocks.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Execute a completion request and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// Check that the backend is available and properly configured.
    async fn health_check(&self) -> Result<()>;
}

/// A backend that can be shared across threads.
pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// A mock backend for testing purposes.
///
/// Returns pre-configured responses in order, useful for deterministic
/// testing of the agent loop and tool execution.
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    responses: std::sync::Mutex<Vec<CompletionResponse>>,
    request_log: std::sync::Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    /// Create a new mock backend with the given responses.
    ///
    /// Responses are returned in order. If more requests are made than
    /// responses available, an error is returned.
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            responses: std::sync::Mutex::new(responses),
            request_log: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create a mock backend with a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![Self::text_response(text)])
    }

    /// Create a mock backend replying with the given texts, in order.
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(Self::text_response).collect())
    }

    /// Build a plain text response.
    pub fn text_response(text: impl Into<String>) -> CompletionResponse {
        CompletionResponse::new(
            "mock_msg",
            "mock-model",
            vec![ContentBlock::text(text)],
            StopReason::EndTurn,
            Usage::new(10, 20),
        )
    }

    /// Build a response containing a single tool use.
    pub fn tool_use_response(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> CompletionResponse {
        CompletionResponse::new(
            "mock_msg",
            "mock-model",
            vec![ContentBlock::tool_use(id, name, input)],
            StopReason::ToolUse,
            Usage::new(10, 20),
        )
    }

    /// Get all requests that were made to this backend.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log.lock().unwrap().clone()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.request_log.lock().unwrap().push(request);

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(LlmError::Backend(
                "MockBackend: no more responses available".to_string(),
            ));
        }
        Ok(responses.remove(0))
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[tokio::test]
    async fn test_mock_returns_responses_in_order() {
        let backend = MockBackend::with_texts(["first", "second"]);

        let req = CompletionRequest::new("m", vec![Message::user("hi")], 64);
        assert_eq!(backend.complete(req.clone()).await.unwrap().text(), "first");
        assert_eq!(backend.complete(req.clone()).await.unwrap().text(), "second");
        assert!(backend.complete(req).await.is_err());
        assert_eq!(backend.request_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_logs_requests() {
        let backend = MockBackend::with_text("ok");
        let req = CompletionRequest::new("model-x", vec![Message::user("payload")], 64);
        backend.complete(req).await.unwrap();

        let logged = backend.requests();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].model, "model-x");
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_on_fatal() {
        let mut calls = 0u32;
        let result: Result<()> = with_retry(3, Duration::from_millis(1), "test", || {
            calls += 1;
            async move {
                Err(LlmError::Config("bad key".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_with_retry_retries_transient() {
        let mut calls = 0u32;
        let result = with_retry(3, Duration::from_millis(1), "test", || {
            calls += 1;
            let attempt = calls;
            async move {
                if attempt < 3 {
                    Err(LlmError::RateLimited("slow down".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }
}
