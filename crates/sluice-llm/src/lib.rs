//! LLM client abstraction for sluice.
//!
//! Provides provider-agnostic request/response types compatible with the
//! Anthropic Messages API, the [`LlmBackend`] trait that the agent loop
//! drives, a reqwest-based Anthropic backend with retry/backoff, and a
//! deterministic [`MockBackend`] for tests.

pub mod anthropic;
pub mod backend;
pub mod error;
pub mod types;

pub use anthropic::{AnthropicBackend, AnthropicConfig};
pub use backend::{LlmBackend, MockBackend, SharedBackend, with_retry};
pub use error::{LlmError, Result};
pub use types::{
    CompletionRequest, CompletionResponse, Content, ContentBlock, Message, Role, StopReason,
    ToolDefinition, ToolResultBlock, ToolUse, Usage,
};
