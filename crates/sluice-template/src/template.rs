//! `{{expr}}` interpolation against pipeline state.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

// Placeholder pattern: {{ dotted.path }} with optional inner whitespace.
#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("constant pattern is valid"));

/// Errors raised during template resolution.
#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    /// A placeholder referenced a path that does not exist in the state.
    #[error("unresolved template reference: {{{{{0}}}}}")]
    UnresolvedReference(String),

    /// A placeholder resolved to JSON null.
    #[error("template reference {{{{{0}}}}} resolved to null")]
    NullReference(String),
}

/// Resolve every `{{expr}}` placeholder in `template` against `state`.
///
/// `expr` is a dotted path into the state value; numeric segments index
/// into arrays. Strings substitute verbatim, arrays join their rendered
/// elements with spaces, objects serialize as JSON, numbers and booleans
/// use their display form. Any unresolvable reference is an error - the
/// caller treats that as a configuration problem, not a soft miss.
pub fn resolve(template: &str, state: &Value) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let whole = caps.get(0).ok_or_else(|| {
            TemplateError::UnresolvedReference(template.to_string())
        })?;
        let expr = caps
            .get(1)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .to_string();

        out.push_str(&template[last_end..whole.start()]);

        let value = lookup(state, &expr)
            .ok_or_else(|| TemplateError::UnresolvedReference(expr.clone()))?;
        if value.is_null() {
            return Err(TemplateError::NullReference(expr));
        }
        out.push_str(&render(value));

        last_end = whole.end();
    }

    out.push_str(&template[last_end..]);
    Ok(out)
}

/// Walk a dotted path into a JSON value.
fn lookup<'a>(state: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = state;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Render a resolved value as template output.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(_) => value.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> Value {
        json!({
            "userPrompt": "fix the bug",
            "workingDirectory": "/tmp/project",
            "changedFiles": ["src/a.rs", "src/b.rs"],
            "nodes": {
                "build": {
                    "success": true,
                    "output": "ok",
                    "meta": {"warnings": 2}
                }
            }
        })
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(resolve("no placeholders", &state()).unwrap(), "no placeholders");
    }

    #[test]
    fn test_string_substitution() {
        let out = resolve("prompt: {{userPrompt}}", &state()).unwrap();
        assert_eq!(out, "prompt: fix the bug");
    }

    #[test]
    fn test_nested_path_and_whitespace() {
        let out = resolve("build said {{ nodes.build.output }}", &state()).unwrap();
        assert_eq!(out, "build said ok");
    }

    #[test]
    fn test_array_joins_with_spaces() {
        let out = resolve("{{changedFiles}}", &state()).unwrap();
        assert_eq!(out, "src/a.rs src/b.rs");
    }

    #[test]
    fn test_array_index() {
        let out = resolve("{{changedFiles.1}}", &state()).unwrap();
        assert_eq!(out, "src/b.rs");
    }

    #[test]
    fn test_object_serializes_as_json() {
        let out = resolve("{{nodes.build.meta}}", &state()).unwrap();
        assert_eq!(out, r#"{"warnings":2}"#);
    }

    #[test]
    fn test_bool_and_number() {
        let out = resolve("{{nodes.build.success}}/{{nodes.build.meta.warnings}}", &state()).unwrap();
        assert_eq!(out, "true/2");
    }

    #[test]
    fn test_unresolved_reference_errors() {
        let err = resolve("{{nodes.missing.output}}", &state()).unwrap_err();
        assert!(matches!(err, TemplateError::UnresolvedReference(_)));
        assert!(err.to_string().contains("nodes.missing.output"));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let s = state();
        let first = resolve("{{userPrompt}} in {{workingDirectory}}", &s).unwrap();
        let second = resolve("{{userPrompt}} in {{workingDirectory}}", &s).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_multiple_placeholders() {
        let out = resolve("{{userPrompt}}: {{nodes.build.output}}", &state()).unwrap();
        assert_eq!(out, "fix the bug: ok");
    }
}
