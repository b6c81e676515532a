//! The four capability tools dispatched by the agent loop.

pub mod file;
pub mod script;

pub use file::{ListDirectoryTool, ReadFileTool, WriteFileTool};
pub use script::RunNpmScriptTool;

use std::sync::Arc;

use sluice_policy::ScriptPolicy;

use crate::tool::ToolRegistry;

/// Build a registry holding the full capability set.
pub fn default_registry(policy: Arc<ScriptPolicy>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool::new());
    registry.register(WriteFileTool::new());
    registry.register(ListDirectoryTool::new());
    registry.register(RunNpmScriptTool::new(policy));
    registry
}
