//! Execution state: per-node outcomes and the run accumulator.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// The result of executing one node. Produced exactly once per node;
/// immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutcome {
    /// Id of the node this outcome belongs to.
    pub node_id: String,
    /// Node kind ("task", "agent", "gate").
    pub node_type: String,
    /// Whether the node succeeded.
    pub success: bool,
    /// Node output: captured text for tasks, the validated JSON answer for
    /// agents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Failure description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Files whose modification time advanced during a tracked task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_files: Option<Vec<PathBuf>>,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution finished.
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Mutable execution accumulator, owned by the engine for the duration of
/// one run and discarded after.
#[derive(Debug)]
pub struct PipelineState {
    order: Vec<String>,
    nodes: HashMap<String, NodeOutcome>,
    /// Files changed by tracked tasks so far. Grows monotonically.
    pub changed_files: BTreeSet<PathBuf>,
    /// The run's working directory.
    pub working_directory: PathBuf,
    /// Prompt supplied by the user when the run was created.
    pub user_prompt: Option<String>,
}

impl PipelineState {
    /// Create an empty state for one run.
    pub fn new(working_directory: impl Into<PathBuf>, user_prompt: Option<String>) -> Self {
        Self {
            order: Vec::new(),
            nodes: HashMap::new(),
            changed_files: BTreeSet::new(),
            working_directory: working_directory.into(),
            user_prompt,
        }
    }

    /// Record a node's outcome. Presence signals "already executed".
    pub fn insert(&mut self, outcome: NodeOutcome) {
        if let Some(files) = &outcome.changed_files {
            self.changed_files.extend(files.iter().cloned());
        }
        self.order.push(outcome.node_id.clone());
        self.nodes.insert(outcome.node_id.clone(), outcome);
    }

    /// Look up an outcome by node id.
    pub fn get(&self, node_id: &str) -> Option<&NodeOutcome> {
        self.nodes.get(node_id)
    }

    /// Outcomes in execution order.
    pub fn outcomes(&self) -> Vec<&NodeOutcome> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    /// The state as a JSON value for template resolution. Later nodes
    /// reference earlier outputs as `{{nodes.<id>.output}}`.
    pub fn template_state(&self) -> Value {
        let mut nodes = serde_json::Map::new();
        for id in &self.order {
            if let Some(outcome) = self.nodes.get(id) {
                nodes.insert(
                    id.clone(),
                    json!({
                        "success": outcome.success,
                        "output": outcome.output.clone().unwrap_or(Value::Null),
                        "error": outcome.error.clone(),
                    }),
                );
            }
        }
        json!({
            "nodes": nodes,
            "workingDirectory": self.working_directory.display().to_string(),
            "userPrompt": self.user_prompt.clone(),
            "changedFiles": self
                .changed_files
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str, success: bool, output: Option<Value>) -> NodeOutcome {
        let now = Utc::now();
        NodeOutcome {
            node_id: id.to_string(),
            node_type: "task".to_string(),
            success,
            output,
            error: None,
            changed_files: None,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        }
    }

    #[test]
    fn test_outcomes_keep_insertion_order() {
        let mut state = PipelineState::new("/work", None);
        state.insert(outcome("b", true, None));
        state.insert(outcome("a", true, None));

        let ids: Vec<_> = state.outcomes().iter().map(|o| o.node_id.clone()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_changed_files_merge_monotonically() {
        let mut state = PipelineState::new("/work", None);
        let mut first = outcome("t1", true, None);
        first.changed_files = Some(vec!["src/a.rs".into()]);
        state.insert(first);

        let mut second = outcome("t2", true, None);
        second.changed_files = Some(vec!["src/a.rs".into(), "src/b.rs".into()]);
        state.insert(second);

        assert_eq!(state.changed_files.len(), 2);
    }

    #[test]
    fn test_template_state_exposes_outputs() {
        let mut state = PipelineState::new("/work", Some("do it".into()));
        state.insert(outcome("build", true, Some(json!("compiled ok"))));

        let value = state.template_state();
        assert_eq!(value["nodes"]["build"]["output"], "compiled ok");
        assert_eq!(value["userPrompt"], "do it");
        assert_eq!(value["workingDirectory"], "/work");

        let resolved =
            sluice_template::resolve("result: {{nodes.build.output}}", &value).unwrap();
        assert_eq!(resolved, "result: compiled ok");
    }
}
