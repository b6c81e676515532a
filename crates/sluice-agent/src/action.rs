//! Action payload extraction and normalization.
//!
//! Model replies encode actions in one of five accepted JSON shapes:
//!
//! 1. a top-level array of `{action, args}` objects
//! 2. `{"actions": [...]}` wrapping the same array
//! 3. `{"actions": {"read_file": {"args": {...}}}}` - object keyed by
//!    action name
//! 4. a single `{action, args}` object
//! 5. a bare object whose keys are exactly valid action names
//!
//! All five normalize to an ordered [`ActionRequest`] list. Any other shape
//! is a hard parse failure ([`AgentError::UnsupportedShape`]) - the raw
//! payload is logged by the caller before the error propagates.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};

/// The accepted action names, in the order tools are described to the model.
pub const ACTION_NAMES: [&str; 4] = [
    "read_file",
    "write_file",
    "list_directory",
    "run_npm_script",
];

/// One normalized action: a validated name plus its raw argument object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Action name.
    pub action: String,
    /// Arguments as supplied by the model.
    #[serde(default)]
    pub args: Value,
}

impl ActionRequest {
    /// Create an action request.
    pub fn new(action: impl Into<String>, args: Value) -> Self {
        Self {
            action: action.into(),
            args,
        }
    }

    /// Whether this action ends the loop after executing.
    ///
    /// A write is the natural completion signal for a single-pass editing
    /// task; reads, listings, and script runs are observational.
    pub fn is_terminal(&self) -> bool {
        self.action == "write_file"
    }
}

/// Whether a name is one of the accepted actions.
pub fn is_action_name(name: &str) -> bool {
    ACTION_NAMES.contains(&name)
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON Extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Extract a JSON value from model text.
///
/// Tries a fenced code block first (```json or bare ```), then a bare parse
/// of the trimmed text. Returns `None` when neither yields valid JSON.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(fenced) = fenced_block(text)
        && let Ok(value) = serde_json::from_str(fenced.trim())
    {
        return Some(value);
    }
    serde_json::from_str(text.trim()).ok()
}

/// The contents of the first fenced code block, if any.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip an optional language tag on the fence line.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

// ─────────────────────────────────────────────────────────────────────────────
// Shape Normalization
// ─────────────────────────────────────────────────────────────────────────────

/// Normalize a parsed payload into an ordered action list.
pub fn normalize_actions(payload: &Value) -> Result<Vec<ActionRequest>> {
    match payload {
        Value::Array(items) => items.iter().map(single_action).collect(),
        Value::Object(map) => {
            if let Some(actions) = map.get("actions") {
                return match actions {
                    Value::Array(items) => items.iter().map(single_action).collect(),
                    Value::Object(keyed) => keyed_actions(keyed),
                    _ => Err(AgentError::UnsupportedShape),
                };
            }
            if map.get("action").is_some_and(Value::is_string) {
                return single_action(payload).map(|a| vec![a]);
            }
            if !map.is_empty() && map.keys().all(|k| is_action_name(k)) {
                return keyed_actions(map);
            }
            Err(AgentError::UnsupportedShape)
        }
        _ => Err(AgentError::UnsupportedShape),
    }
}

/// Normalize one `{action, args}` element.
fn single_action(value: &Value) -> Result<ActionRequest> {
    let Some(map) = value.as_object() else {
        return Err(AgentError::UnsupportedShape);
    };
    let Some(action) = map.get("action").and_then(Value::as_str) else {
        return Err(AgentError::UnsupportedShape);
    };
    let args = map
        .get("args")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    Ok(ActionRequest::new(action, args))
}

/// Normalize an object keyed by action name. The value for each key may be
/// `{args: {...}}` or the argument object directly.
fn keyed_actions(map: &serde_json::Map<String, Value>) -> Result<Vec<ActionRequest>> {
    map.iter()
        .map(|(name, value)| {
            let args = value
                .as_object()
                .and_then(|o| o.get("args"))
                .cloned()
                .unwrap_or_else(|| value.clone());
            Ok(ActionRequest::new(name, args))
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
