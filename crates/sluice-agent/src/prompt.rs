//! Prompt file parsing.
//!
//! A prompt file is markdown with a YAML front-matter block delimited by
//! `---` lines. The front matter carries the prompt's lifecycle status and
//! optional provider/model overrides; everything after the closing
//! delimiter is the literal user prompt text.

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Lifecycle status of a prompt file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStatus {
    Draft,
    Active,
    Done,
    Archived,
}

/// Parsed front matter of a prompt file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptFrontMatter {
    /// Lifecycle status.
    pub status: PromptStatus,
    /// Provider override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A parsed prompt file: front matter plus the literal prompt body.
#[derive(Debug, Clone)]
pub struct PromptFile {
    /// Parsed front matter.
    pub front_matter: PromptFrontMatter,
    /// The prompt text after the closing delimiter.
    pub body: String,
}

impl PromptFile {
    /// Parse a prompt file from its source text.
    pub fn parse(source: &str) -> Result<Self> {
        let mut lines = source.lines();
        if lines.next().map(str::trim) != Some("---") {
            return Err(AgentError::Prompt(
                "prompt file must start with a '---' front matter delimiter".to_string(),
            ));
        }

        let mut front_lines = Vec::new();
        let mut closed = false;
        for line in lines.by_ref() {
            if line.trim() == "---" {
                closed = true;
                break;
            }
            front_lines.push(line);
        }
        if !closed {
            return Err(AgentError::Prompt(
                "prompt file front matter is missing its closing '---' delimiter".to_string(),
            ));
        }

        let front_matter: PromptFrontMatter =
            serde_yaml::from_str(&front_lines.join("\n")).map_err(|e| {
                AgentError::Prompt(format!("invalid prompt front matter: {e}"))
            })?;

        let body = lines.collect::<Vec<_>>().join("\n");
        Ok(Self {
            front_matter,
            body: body.trim_start_matches('\n').to_string(),
        })
    }

    /// Whether this prompt is eligible to run.
    pub fn is_runnable(&self) -> bool {
        self.front_matter.status == PromptStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_prompt() {
        let source = "---\nstatus: active\nprovider: anthropic\nmodel: claude-sonnet-4-5\n---\n\nRefactor the parser.\nKeep the public API stable.";
        let prompt = PromptFile::parse(source).unwrap();
        assert_eq!(prompt.front_matter.status, PromptStatus::Active);
        assert_eq!(prompt.front_matter.provider.as_deref(), Some("anthropic"));
        assert_eq!(
            prompt.front_matter.model.as_deref(),
            Some("claude-sonnet-4-5")
        );
        assert_eq!(
            prompt.body,
            "Refactor the parser.\nKeep the public API stable."
        );
        assert!(prompt.is_runnable());
    }

    #[test]
    fn test_parse_minimal_front_matter() {
        let prompt = PromptFile::parse("---\nstatus: draft\n---\nbody text").unwrap();
        assert_eq!(prompt.front_matter.status, PromptStatus::Draft);
        assert!(prompt.front_matter.provider.is_none());
        assert_eq!(prompt.body, "body text");
        assert!(!prompt.is_runnable());
    }

    #[test]
    fn test_missing_opening_delimiter() {
        let err = PromptFile::parse("status: active\n---\nbody").unwrap_err();
        assert!(err.to_string().contains("must start with"));
    }

    #[test]
    fn test_missing_closing_delimiter() {
        let err = PromptFile::parse("---\nstatus: active\nbody").unwrap_err();
        assert!(err.to_string().contains("closing"));
    }

    #[test]
    fn test_invalid_status_rejected() {
        let err = PromptFile::parse("---\nstatus: paused\n---\nbody").unwrap_err();
        assert!(matches!(err, AgentError::Prompt(_)));
    }
}
