//! Run metadata: the sole durable record of run progress.
//!
//! A process restart must be able to reconstruct run state solely from
//! this record plus the log files, so every status transition is persisted
//! before any in-memory notification fires.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run lifecycle status.
///
/// `queued → running → {completed | failed | interrupted}`; a failed or
/// interrupted run may transition back to running via resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Interrupted,
}

impl RunStatus {
    /// Whether the run has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Interrupted)
    }

    /// Whether the run is still in flight (worth polling).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Whether resume is permitted from this status.
    pub fn can_resume(&self) -> bool {
        matches!(self, Self::Failed | Self::Interrupted)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        };
        f.write_str(label)
    }
}

/// What kind of execution a run supervises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// A pipeline definition file.
    Pipeline,
    /// A standalone prompt file.
    Prompt,
}

/// Durable per-run record, persisted to `metadata.json` on every status
/// transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    /// Opaque unique id.
    pub id: String,
    /// Kind of execution.
    pub kind: RunKind,
    /// Path of the pipeline or prompt file to execute.
    pub pipeline_path: PathBuf,
    /// Display name of the pipeline, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_name: Option<String>,
    /// Prompt supplied by the user when the run was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
    /// Working directory the run executes in. Needed to replay the run.
    pub working_directory: PathBuf,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// When the run was queued.
    pub created_at: DateTime<Utc>,
    /// When execution first started. Set exactly once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure description when status is failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Directory holding this run's logs and metadata.
    pub artifacts_dir: PathBuf,
}

impl RunMetadata {
    /// Create a fresh queued record.
    pub fn new(
        id: impl Into<String>,
        kind: RunKind,
        pipeline_path: impl Into<PathBuf>,
        pipeline_name: Option<String>,
        user_prompt: Option<String>,
        working_directory: impl Into<PathBuf>,
        artifacts_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            pipeline_path: pipeline_path.into(),
            pipeline_name,
            user_prompt,
            working_directory: working_directory.into(),
            status: RunStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            artifacts_dir: artifacts_dir.into(),
        }
    }

    /// Transition to running. `started_at` is set exactly once; repeat
    /// calls (resume) keep the original timestamp.
    pub fn mark_running(&mut self) {
        self.status = RunStatus::Running;
        self.started_at.get_or_insert_with(Utc::now);
        self.error = None;
    }

    /// Transition to completed.
    pub fn mark_completed(&mut self) {
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Transition to failed with a description.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    /// Transition to interrupted (orphaned `running` record found on
    /// restart).
    pub fn mark_interrupted(&mut self) {
        self.status = RunStatus::Interrupted;
        self.completed_at = Some(Utc::now());
    }
}
