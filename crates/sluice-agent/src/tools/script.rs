//! Policy-gated npm script execution tool.
//!
//! The policy engine resolves and validates the request before any process
//! is spawned; a rejected script or flag never reaches the shell.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use sluice_policy::{CaptureLimits, FlagValue, ScriptPolicy, exec};

use crate::error::Result;
use crate::tool::{Tool, ToolContext, ToolResult, required_str};

/// Tool that runs a project script through the script policy engine.
pub struct RunNpmScriptTool {
    policy: Arc<ScriptPolicy>,
    limits: CaptureLimits,
}

impl RunNpmScriptTool {
    /// Create a script tool backed by the given policy.
    pub fn new(policy: Arc<ScriptPolicy>) -> Self {
        Self {
            policy,
            limits: CaptureLimits::default(),
        }
    }

    /// Override the output capture limits.
    pub fn with_limits(mut self, limits: CaptureLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Parse the model-supplied flag map. Values must be strings or booleans.
fn parse_flags(args: &Value) -> std::result::Result<BTreeMap<String, FlagValue>, String> {
    let Some(raw) = args.get("flags") else {
        return Ok(BTreeMap::new());
    };
    let Some(map) = raw.as_object() else {
        return Err("'flags' must be an object".to_string());
    };

    let mut flags = BTreeMap::new();
    for (name, value) in map {
        let flag = match value {
            Value::Bool(b) => FlagValue::Bool(*b),
            Value::String(s) => FlagValue::Str(s.clone()),
            other => {
                return Err(format!(
                    "flag '{name}' must be a string or boolean, got {other}"
                ));
            }
        };
        flags.insert(name.clone(), flag);
    }
    Ok(flags)
}

/// Render the observation text for a finished script run.
fn render_output(script: &str, output: &exec::ScriptOutput) -> String {
    let mut text = if output.timed_out {
        format!("Script '{script}' timed out and was terminated")
    } else {
        format!(
            "Script '{script}' exited with code {}",
            output
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        )
    };
    if !output.stdout.text.is_empty() || output.stdout.truncated {
        text.push_str("\nstdout:\n");
        text.push_str(&output.stdout.display());
    }
    if !output.stderr.text.is_empty() || output.stderr.truncated {
        text.push_str("\nstderr:\n");
        text.push_str(&output.stderr.display());
    }
    text
}

#[async_trait]
impl Tool for RunNpmScriptTool {
    fn name(&self) -> &str {
        "run_npm_script"
    }

    fn description(&self) -> &str {
        "Run an allowed project npm script with validated flags. Output is captured and bounded."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "script": {"type": "string", "description": "Name of the npm script to run"},
                "flags": {
                    "type": "object",
                    "description": "Flag name to string or boolean value",
                    "additionalProperties": {"type": ["string", "boolean"]}
                }
            },
            "required": ["script"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let script = match required_str(&args, &["script", "name"]) {
            Ok(s) => s,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };
        let flags = match parse_flags(&args) {
            Ok(f) => f,
            Err(e) => return Ok(ToolResult::error(e)),
        };

        // Policy rejection happens before any spawn.
        let invocation = match self.policy.resolve(script, &flags) {
            Ok(inv) => inv,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        match exec::run(&invocation, self.limits).await {
            Ok(output) => {
                let text = render_output(&invocation.script, &output);
                if output.success() {
                    Ok(ToolResult::text(text))
                } else {
                    Ok(ToolResult::error(text))
                }
            }
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_policy::ScriptManifest;

    fn policy() -> Arc<ScriptPolicy> {
        let scripts = BTreeMap::from([("noop".to_string(), "true".to_string())]);
        Arc::new(ScriptPolicy::with_manifest(ScriptManifest::from_scripts(
            "/proj", scripts,
        )))
    }

    #[tokio::test]
    async fn test_undefined_script_rejected_before_spawn() {
        let tool = RunNpmScriptTool::new(policy());
        let ctx = ToolContext::new(".");

        let result = tool
            .execute(json!({"script": "deploy"}), &ctx)
            .await
            .unwrap();
        assert!(result.is_error());
        assert!(
            result
                .observation()
                .contains("Script deploy is not defined")
        );
    }

    #[tokio::test]
    async fn test_missing_script_argument() {
        let tool = RunNpmScriptTool::new(policy());
        let ctx = ToolContext::new(".");

        let result = tool.execute(json!({}), &ctx).await.unwrap();
        assert!(result.is_error());
    }

    #[test]
    fn test_parse_flags_rejects_numbers() {
        let err = parse_flags(&json!({"flags": {"count": 3}})).unwrap_err();
        assert!(err.contains("count"));
    }

    #[test]
    fn test_parse_flags_mixed() {
        let flags = parse_flags(&json!({"flags": {"watch": true, "reporter": "json"}})).unwrap();
        assert_eq!(flags["watch"], FlagValue::Bool(true));
        assert_eq!(flags["reporter"], FlagValue::Str("json".into()));
    }

    #[test]
    fn test_render_output_includes_streams() {
        let output = exec::ScriptOutput {
            exit_code: Some(1),
            timed_out: false,
            stdout: exec::BoundedCapture {
                text: "building".into(),
                truncated: false,
                dropped_chars: 0,
            },
            stderr: exec::BoundedCapture {
                text: "warning: slow".into(),
                truncated: false,
                dropped_chars: 0,
            },
        };
        let text = render_output("build", &output);
        assert!(text.contains("exited with code 1"));
        assert!(text.contains("building"));
        assert!(text.contains("warning: slow"));
    }
}
