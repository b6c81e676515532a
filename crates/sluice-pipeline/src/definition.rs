//! Pipeline definition and load-time validation.
//!
//! A pipeline is a YAML document with an ordered node list. Nodes are a
//! tagged union on `type`; a value outside the union fails deserialization,
//! which is the configuration-error path for unknown node kinds. Validation
//! errors name the offending node id and field.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sluice_template::Schema;

use crate::error::{PipelineError, Result};

/// A validated, immutable pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// What the pipeline is for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Nodes in execution order.
    pub nodes: Vec<Node>,
}

/// One pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique id within the pipeline.
    pub id: String,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Kind-specific fields.
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// The node kinds, tagged on `type` in the YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
    /// A shell command whose output is captured and logged.
    Task {
        /// Command line, run through the shell after template resolution.
        command: String,
        /// Working directory override, relative to the run's working
        /// directory.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
        /// Extra environment variables.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
        /// Whether to diff file modification times around the command.
        #[serde(default, rename = "trackChanges")]
        track_changes: bool,
    },
    /// An AI-agent step with an explicit tool allowlist and a declared
    /// output schema.
    Agent {
        /// Prompt text; may contain `{{expr}}` template references.
        prompt: String,
        /// Allowed tool names.
        #[serde(default)]
        tools: Vec<String>,
        /// Compact schema the final answer must match.
        #[serde(rename = "outputSchema")]
        output_schema: String,
        /// Model override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// A pass/fail check; stdio is inherited rather than captured.
    Gate {
        /// Command line, run through the shell after template resolution.
        command: String,
        /// Message reported in place of the raw error when the gate fails.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl NodeKind {
    /// The wire name of this kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Task { .. } => "task",
            NodeKind::Agent { .. } => "agent",
            NodeKind::Gate { .. } => "gate",
        }
    }
}

impl Pipeline {
    /// Parse and validate a pipeline from YAML source.
    pub fn from_yaml(source: &str) -> Result<Self> {
        let pipeline: Pipeline = serde_yaml::from_str(source)?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Load and validate a pipeline file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| PipelineError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let pipeline = Self::from_yaml(&source)?;
        tracing::debug!(
            path = %path.display(),
            nodes = pipeline.nodes.len(),
            "Loaded pipeline"
        );
        Ok(pipeline)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(PipelineError::Empty);
        }

        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(PipelineError::Validation {
                    node: node.id.clone(),
                    field: "id".into(),
                    message: "node id must not be empty".into(),
                });
            }
            if !seen.insert(node.id.as_str()) {
                return Err(PipelineError::DuplicateNode(node.id.clone()));
            }
            node.validate()?;
        }
        Ok(())
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

impl Node {
    fn validate(&self) -> Result<()> {
        let invalid = |field: &str, message: &str| PipelineError::Validation {
            node: self.id.clone(),
            field: field.into(),
            message: message.into(),
        };

        match &self.kind {
            NodeKind::Task { command, .. } | NodeKind::Gate { command, .. } => {
                if command.trim().is_empty() {
                    return Err(invalid("command", "command must not be empty"));
                }
            }
            NodeKind::Agent {
                prompt,
                output_schema,
                ..
            } => {
                if prompt.trim().is_empty() {
                    return Err(invalid("prompt", "prompt must not be empty"));
                }
                if let Err(e) = Schema::parse(output_schema) {
                    return Err(invalid("outputSchema", &e.to_string()));
                }
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
name: release checks
description: build, verify, summarize
nodes:
  - id: build
    type: task
    command: npm run build
    trackChanges: true
    env:
      CI: "1"
  - id: verify
    type: gate
    command: npm test
    message: tests must pass before release
  - id: summarize
    type: agent
    prompt: "Summarize the build output: {{nodes.build.output}}"
    tools: [read_file, list_directory]
    outputSchema: "{summary: string}"
"#;

    #[test]
    fn test_parse_full_pipeline() {
        let pipeline = Pipeline::from_yaml(FULL).unwrap();
        assert_eq!(pipeline.name.as_deref(), Some("release checks"));
        assert_eq!(pipeline.nodes.len(), 3);

        match &pipeline.nodes[0].kind {
            NodeKind::Task {
                command,
                track_changes,
                env,
                ..
            } => {
                assert_eq!(command, "npm run build");
                assert!(track_changes);
                assert_eq!(env["CI"], "1");
            }
            other => panic!("expected task, got {other:?}"),
        }
        match &pipeline.nodes[1].kind {
            NodeKind::Gate { message, .. } => {
                assert_eq!(message.as_deref(), Some("tests must pass before release"));
            }
            other => panic!("expected gate, got {other:?}"),
        }
        match &pipeline.nodes[2].kind {
            NodeKind::Agent { tools, .. } => {
                assert_eq!(tools, &["read_file", "list_directory"]);
            }
            other => panic!("expected agent, got {other:?}"),
        }
    }

    #[test]
    fn test_track_changes_defaults_false() {
        let pipeline =
            Pipeline::from_yaml("nodes:\n  - id: t\n    type: task\n    command: echo hi\n")
                .unwrap();
        match &pipeline.nodes[0].kind {
            NodeKind::Task { track_changes, .. } => assert!(!track_changes),
            other => panic!("expected task, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_node_type_fails_at_parse() {
        let err =
            Pipeline::from_yaml("nodes:\n  - id: x\n    type: loop\n    command: echo\n")
                .unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let err = Pipeline::from_yaml("nodes: []").unwrap_err();
        assert!(matches!(err, PipelineError::Empty));
    }

    #[test]
    fn test_duplicate_node_ids_rejected() {
        let source = "nodes:\n  - id: a\n    type: task\n    command: echo 1\n  - id: a\n    type: task\n    command: echo 2\n";
        let err = Pipeline::from_yaml(source).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateNode(id) if id == "a"));
    }

    #[test]
    fn test_empty_command_names_node_and_field() {
        let err = Pipeline::from_yaml("nodes:\n  - id: t\n    type: task\n    command: \"  \"\n")
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("'t'"));
        assert!(text.contains("command"));
    }

    #[test]
    fn test_bad_output_schema_names_field() {
        let source = "nodes:\n  - id: a\n    type: agent\n    prompt: go\n    outputSchema: \"{broken\"\n";
        let err = Pipeline::from_yaml(source).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("'a'"));
        assert!(text.contains("outputSchema"));
    }

    #[test]
    fn test_roundtrip_preserves_wire_names() {
        let pipeline = Pipeline::from_yaml(FULL).unwrap();
        let yaml = serde_yaml::to_string(&pipeline).unwrap();
        assert!(yaml.contains("trackChanges"));
        assert!(yaml.contains("outputSchema"));
        Pipeline::from_yaml(&yaml).unwrap();
    }
}
