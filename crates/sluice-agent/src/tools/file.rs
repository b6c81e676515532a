//! Filesystem tools: read, write, and directory listing.
//!
//! Read observations are capped so a large file cannot flood the model's
//! context; the marker tells the agent how much was cut so it can decide
//! whether to ask again.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::fs;

use crate::error::Result;
use crate::tool::{Tool, ToolContext, ToolResult, required_str};

/// Default cap on file content returned to the model, in characters.
pub const DEFAULT_READ_LIMIT: usize = 6000;

/// Cap content at `limit` characters, appending a truncation marker stating
/// how many characters were cut.
pub fn truncate_content(content: &str, limit: usize) -> String {
    let total = content.chars().count();
    if total <= limit {
        return content.to_string();
    }
    let kept: String = content.chars().take(limit).collect();
    format!("{kept}...[truncated {} characters]", total - limit)
}

// ─────────────────────────────────────────────────────────────────────────────
// read_file
// ─────────────────────────────────────────────────────────────────────────────

/// Tool that reads a file and returns bounded content.
#[derive(Debug, Clone)]
pub struct ReadFileTool {
    read_limit: usize,
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self {
            read_limit: DEFAULT_READ_LIMIT,
        }
    }
}

impl ReadFileTool {
    /// Create a read tool with the default content cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a read tool with a custom content cap.
    pub fn with_limit(read_limit: usize) -> Self {
        Self { read_limit }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file's contents. Large files are truncated; request the file again if you need more."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the file, relative to the working directory"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let path = match required_str(&args, &["path", "file_path"]) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };
        let resolved = ctx.resolve(path);

        match fs::read_to_string(&resolved).await {
            Ok(content) => Ok(ToolResult::text(truncate_content(
                &content,
                self.read_limit,
            ))),
            Err(e) => Ok(ToolResult::error(format!(
                "failed to read {}: {e}",
                resolved.display()
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// write_file
// ─────────────────────────────────────────────────────────────────────────────

/// Tool that writes a file, creating parent directories as needed.
#[derive(Debug, Clone, Default)]
pub struct WriteFileTool;

impl WriteFileTool {
    /// Create a write tool.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, overwriting it. This completes the current task."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the file, relative to the working directory"},
                "content": {"type": "string", "description": "Full file content to write"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let path = match required_str(&args, &["path", "file_path"]) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };
        let content = match required_str(&args, &["content"]) {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };
        let resolved = ctx.resolve(path);

        if let Some(parent) = resolved.parent()
            && let Err(e) = fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::error(format!(
                "failed to create {}: {e}",
                parent.display()
            )));
        }

        match fs::write(&resolved, content).await {
            Ok(()) => Ok(ToolResult::text(format!(
                "Wrote {} bytes to {}",
                content.len(),
                resolved.display()
            ))),
            Err(e) => Ok(ToolResult::error(format!(
                "failed to write {}: {e}",
                resolved.display()
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// list_directory
// ─────────────────────────────────────────────────────────────────────────────

/// Tool that lists directory entries, directories marked with a trailing `/`.
#[derive(Debug, Clone, Default)]
pub struct ListDirectoryTool;

impl ListDirectoryTool {
    /// Create a listing tool.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Directories carry a trailing slash."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory path, relative to the working directory. Defaults to the working directory."}
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or(".");
        let resolved = ctx.resolve(path);

        let mut read_dir = match fs::read_dir(&resolved).await {
            Ok(rd) => rd,
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "failed to list {}: {e}",
                    resolved.display()
                )));
            }
        };

        let mut entries = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();

        if entries.is_empty() {
            Ok(ToolResult::text(format!("{} is empty", resolved.display())))
        } else {
            Ok(ToolResult::text(entries.join("\n")))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_exact_prefix_and_marker() {
        let content = "x".repeat(6100);
        let result = truncate_content(&content, 6000);
        assert!(result.starts_with(&"x".repeat(6000)));
        assert!(result.ends_with("...[truncated 100 characters]"));

        let short = "hello";
        assert_eq!(truncate_content(short, 6000), "hello");
    }

    #[tokio::test]
    async fn test_read_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello world").unwrap();
        let ctx = ToolContext::new(dir.path());

        let result = ReadFileTool::new()
            .execute(json!({"path": "a.txt"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.observation(), "hello world");
    }

    #[tokio::test]
    async fn test_read_file_accepts_file_path_alias() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "aliased").unwrap();
        let ctx = ToolContext::new(dir.path());

        let result = ReadFileTool::new()
            .execute(json!({"file_path": "a.txt"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.observation(), "aliased");
    }

    #[tokio::test]
    async fn test_read_missing_file_is_recoverable_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());

        let result = ReadFileTool::new()
            .execute(json!({"path": "nope.txt"}), &ctx)
            .await
            .unwrap();
        assert!(result.is_error());
        assert!(result.observation().contains("nope.txt"));
    }

    #[tokio::test]
    async fn test_read_truncates_large_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "y".repeat(7000)).unwrap();
        let ctx = ToolContext::new(dir.path());

        let result = ReadFileTool::new()
            .execute(json!({"path": "big.txt"}), &ctx)
            .await
            .unwrap();
        let obs = result.observation();
        assert!(obs.contains("...[truncated 1000 characters]"));
        assert!(obs.starts_with(&"y".repeat(6000)));
    }

    #[tokio::test]
    async fn test_write_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());

        let result = WriteFileTool::new()
            .execute(
                json!({"path": "nested/dir/out.txt", "content": "written"}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(!result.is_error());
        let on_disk = std::fs::read_to_string(dir.path().join("nested/dir/out.txt")).unwrap();
        assert_eq!(on_disk, "written");
    }

    #[tokio::test]
    async fn test_write_file_missing_content() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());

        let result = WriteFileTool::new()
            .execute(json!({"path": "out.txt"}), &ctx)
            .await
            .unwrap();
        assert!(result.is_error());
        assert!(result.observation().contains("content"));
    }

    #[tokio::test]
    async fn test_list_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let ctx = ToolContext::new(dir.path());

        let result = ListDirectoryTool::new()
            .execute(json!({}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.observation(), "a.txt\nb.txt\nsub/");
    }
}
