//! The tool-calling loop for sluice agents.
//!
//! Drives a conversational model through bounded iterations, normalizes the
//! action payload shapes models actually emit, and dispatches a fixed set
//! of capability-scoped tools: file read/write, directory listing, and
//! policy-gated script execution. Two call sites share the loop: pipeline
//! agent nodes (native tool calling plus a schema-validated final answer)
//! and standalone prompt files (the JSON action protocol).

pub mod action;
pub mod agent;
pub mod error;
pub mod prompt;
pub mod tool;
pub mod tools;

pub use action::{ACTION_NAMES, ActionRequest, extract_json, is_action_name, normalize_actions};
pub use agent::{AgentLoop, LoopConfig, PromptRunOutcome};
pub use error::{AgentError, Result};
pub use prompt::{PromptFile, PromptFrontMatter, PromptStatus};
pub use tool::{Tool, ToolContext, ToolRegistry, ToolResult};
pub use tools::{
    ListDirectoryTool, ReadFileTool, RunNpmScriptTool, WriteFileTool, default_registry,
};
