//! Tool framework for agent capabilities.
//!
//! Defines the [`Tool`] trait the four capability tools implement, the
//! [`ToolRegistry`] for lookup and allowlist filtering, and the argument
//! helpers that accept the alternate key aliases models actually emit
//! (`path` / `file_path`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use sluice_types::{NullSink, SharedLogSink};

use crate::error::{AgentError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Argument Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Get a required string argument, accepting any of the given key aliases.
pub fn required_str<'a>(args: &'a Value, aliases: &[&str]) -> Result<&'a str> {
    for key in aliases {
        if let Some(value) = args.get(key) {
            return value.as_str().ok_or_else(|| {
                AgentError::Tool(format!("argument '{key}' must be a string"))
            });
        }
    }
    Err(AgentError::Tool(format!(
        "missing required argument '{}'",
        aliases[0]
    )))
}

/// Get an optional object argument by key.
pub fn optional_object<'a>(args: &'a Value, key: &str) -> Option<&'a serde_json::Map<String, Value>> {
    args.get(key).and_then(Value::as_object)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for agent tools.
///
/// Each tool declares its name and a JSON Schema for its arguments, and
/// implements async execution. Failures a model can recover from are
/// returned as [`ToolResult::Error`], not as `Err` - the loop injects them
/// into the conversation as observations and continues.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of this tool.
    fn name(&self) -> &str;

    /// Human-readable description for the model.
    fn description(&self) -> &str;

    /// JSON Schema for this tool's arguments.
    fn parameters(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Context
// ─────────────────────────────────────────────────────────────────────────────

/// Context provided to tools during execution.
#[derive(Clone)]
pub struct ToolContext {
    /// Working directory relative paths resolve against.
    pub workdir: PathBuf,
    /// Sink for run-scoped log entries and tool-call records.
    pub sink: SharedLogSink,
}

impl ToolContext {
    /// Create a context rooted at the given working directory, discarding
    /// log output.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            sink: Arc::new(NullSink),
        }
    }

    /// Attach a log sink.
    pub fn with_sink(mut self, sink: SharedLogSink) -> Self {
        self.sink = sink;
        self
    }

    /// Resolve a model-supplied path against the working directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.workdir.join(p)
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Result
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a tool execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    /// Successful output.
    Text {
        /// Observation text returned to the model.
        content: String,
    },
    /// Tool execution failed in a model-recoverable way.
    Error {
        /// Error message.
        message: String,
    },
}

impl ToolResult {
    /// Create a success result.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this result is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The observation text injected into the conversation.
    pub fn observation(&self) -> String {
        match self {
            Self::Text { content } => content.clone(),
            Self::Error { message } => format!("tool_error: {message}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of available tools, with lookup by name and allowlist filtering
/// for agent nodes that declare an explicit tool set.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any existing tool of the same name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    /// Register a tool from an Arc.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Whether a tool is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// A new registry containing only the named tools. Names not matching
    /// any registered tool are silently ignored.
    pub fn filtered_by_names(&self, names: &[String]) -> ToolRegistry {
        let tools = names
            .iter()
            .filter_map(|name| {
                self.tools
                    .get(name.as_str())
                    .map(|tool| (name.clone(), Arc::clone(tool)))
            })
            .collect();
        ToolRegistry { tools }
    }

    /// Convert all tools to LLM tool definitions for native tool calling.
    pub fn to_llm_definitions(&self) -> Vec<sluice_llm::ToolDefinition> {
        let mut definitions: Vec<_> = self
            .tools
            .values()
            .map(|tool| {
                sluice_llm::ToolDefinition::new(tool.name(), tool.description(), tool.parameters())
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Execute a tool by name.
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        tool.execute(args, ctx).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input back"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult> {
            Ok(ToolResult::text(
                args.get("text").and_then(Value::as_str).unwrap_or(""),
            ))
        }
    }

    #[test]
    fn test_required_str_aliases() {
        let args = json!({"file_path": "a.txt"});
        assert_eq!(
            required_str(&args, &["path", "file_path"]).unwrap(),
            "a.txt"
        );

        let missing = json!({});
        let err = required_str(&missing, &["path", "file_path"]).unwrap_err();
        assert!(err.to_string().contains("path"));

        let wrong_type = json!({"path": 3});
        assert!(required_str(&wrong_type, &["path"]).is_err());
    }

    #[test]
    fn test_context_resolves_relative_paths() {
        let ctx = ToolContext::new("/work");
        assert_eq!(ctx.resolve("src/main.rs"), PathBuf::from("/work/src/main.rs"));
        assert_eq!(ctx.resolve("/abs/file"), PathBuf::from("/abs/file"));
    }

    #[test]
    fn test_result_observation() {
        assert_eq!(ToolResult::text("ok").observation(), "ok");
        assert_eq!(
            ToolResult::error("no such file").observation(),
            "tool_error: no such file"
        );
    }

    #[test]
    fn test_registry_filter() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        assert!(registry.contains("echo"));

        let filtered = registry.filtered_by_names(&["echo".into(), "missing".into()]);
        assert_eq!(filtered.len(), 1);

        let empty = registry.filtered_by_names(&[]);
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_registry_execute_unknown_tool() {
        let registry = ToolRegistry::new();
        let ctx = ToolContext::new(".");
        let err = registry.execute("nope", json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_registry_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let ctx = ToolContext::new(".");
        let result = registry
            .execute("echo", json!({"text": "hi"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.observation(), "hi");
    }
}
