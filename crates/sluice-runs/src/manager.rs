//! Background run supervision.
//!
//! The manager owns the run store and a registry of in-flight task handles.
//! Creating a run persists a `queued` record before any work is spawned, so
//! a crash between creation and execution leaves an observable record.
//! Every status transition is persisted before the in-flight registry is
//! touched, and the run's log queue is flushed before the terminal status
//! lands, so a poller that sees a terminal status also sees complete logs.
//!
//! Resume replays the whole run: the stored pipeline or prompt path is
//! re-executed from the top under the original run id, appending to the
//! original log files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use sluice_agent::{AgentLoop, LoopConfig, PromptFile, ToolContext, ToolRegistry};
use sluice_llm::SharedBackend;
use sluice_pipeline::{Engine, Pipeline, RunContext};
use sluice_types::SharedLogSink;

use crate::error::{Result, RunError};
use crate::logger::RunLogger;
use crate::meta::{RunKind, RunMetadata};
use crate::store::RunStore;

/// Supervises background runs: creation, execution, resume, observation.
#[derive(Clone)]
pub struct RunManager {
    store: RunStore,
    backend: Option<SharedBackend>,
    registry: ToolRegistry,
    loop_config: LoopConfig,
    handles: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
}

impl RunManager {
    /// Create a manager over the given store, without LLM support. Agent
    /// nodes and prompt runs will fail until a backend is attached.
    pub fn new(store: RunStore) -> Self {
        Self {
            store,
            backend: None,
            registry: ToolRegistry::new(),
            loop_config: LoopConfig::for_agent_node(),
            handles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Attach an LLM backend and tool registry.
    pub fn with_agent_support(mut self, backend: SharedBackend, registry: ToolRegistry) -> Self {
        self.backend = Some(backend);
        self.registry = registry;
        self
    }

    /// Override the agent loop configuration used by pipeline agent nodes.
    pub fn with_loop_config(mut self, config: LoopConfig) -> Self {
        self.loop_config = config;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &RunStore {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Creation
    // ─────────────────────────────────────────────────────────────────────────

    /// Queue and start a pipeline run. Returns the new run id.
    ///
    /// The pipeline file is loaded and validated before anything is
    /// persisted; a malformed definition never produces a run record.
    pub async fn create_pipeline_run(
        &self,
        pipeline_path: impl Into<PathBuf>,
        working_directory: impl Into<PathBuf>,
        user_prompt: Option<String>,
    ) -> Result<String> {
        let pipeline_path = pipeline_path.into();
        let pipeline = Pipeline::load(&pipeline_path)?;

        let id = Uuid::new_v4().to_string();
        let artifacts_dir = self.store.create_run_dir(&id)?;
        let meta = RunMetadata::new(
            &id,
            RunKind::Pipeline,
            pipeline_path,
            pipeline.name.clone(),
            user_prompt,
            working_directory,
            artifacts_dir,
        );
        self.store.save(&meta)?;

        tracing::info!(run = %id, pipeline = ?pipeline.name, "Queued pipeline run");
        self.spawn(meta);
        Ok(id)
    }

    /// Queue and start a standalone prompt run. Returns the new run id.
    ///
    /// Only prompts whose front-matter status is `active` are runnable.
    pub async fn create_prompt_run(
        &self,
        prompt_path: impl Into<PathBuf>,
        working_directory: impl Into<PathBuf>,
    ) -> Result<String> {
        let prompt_path = prompt_path.into();
        let prompt = load_prompt(&prompt_path)?;
        if !prompt.is_runnable() {
            return Err(RunError::Prompt(sluice_agent::AgentError::Prompt(
                "prompt is not runnable: front-matter status must be 'active'".to_string(),
            )));
        }

        let id = Uuid::new_v4().to_string();
        let artifacts_dir = self.store.create_run_dir(&id)?;
        let meta = RunMetadata::new(
            &id,
            RunKind::Prompt,
            prompt_path,
            None,
            Some(prompt.body.clone()),
            working_directory,
            artifacts_dir,
        );
        self.store.save(&meta)?;

        tracing::info!(run = %id, "Queued prompt run");
        self.spawn(meta);
        Ok(id)
    }

    /// Resume a failed or interrupted run by replaying it from the top.
    ///
    /// The run keeps its id and artifact directory; new log entries append
    /// after the earlier attempt's.
    pub async fn resume_run(&self, id: &str) -> Result<()> {
        let meta = self.store.load(id)?;
        if !meta.status.can_resume() {
            return Err(RunError::NotResumable {
                id: id.to_string(),
                status: meta.status,
            });
        }

        tracing::info!(run = %id, from = %meta.status, "Resuming run");
        self.spawn(meta);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Observation
    // ─────────────────────────────────────────────────────────────────────────

    /// Current metadata for a run.
    pub fn get(&self, id: &str) -> Result<RunMetadata> {
        self.store.load(id)
    }

    /// All known runs, newest first.
    pub fn list(&self) -> Result<Vec<RunMetadata>> {
        self.store.list()
    }

    /// Wait for an in-flight run to finish and return its final metadata.
    /// Returns immediately for runs that are not in flight.
    pub async fn wait(&self, id: &str) -> Result<RunMetadata> {
        let handle = self.handles.write().remove(id);
        if let Some(handle) = handle {
            // The run task never panics by contract; a join error still
            // leaves the persisted record authoritative.
            let _ = handle.await;
        }
        self.store.load(id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────────

    fn spawn(&self, meta: RunMetadata) {
        let id = meta.id.clone();
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let run_id = meta.id.clone();
            manager.drive(meta).await;
            manager.handles.write().remove(&run_id);
        });
        self.handles.write().insert(id, handle);
    }

    /// Execute one run to a terminal status. Infallible by design: every
    /// failure mode becomes a `failed` record rather than a lost run.
    async fn drive(&self, mut meta: RunMetadata) {
        let logger = match RunLogger::create(&meta.artifacts_dir) {
            Ok(logger) => logger,
            Err(e) => {
                tracing::error!(run = %meta.id, error = %e, "Failed to open run log files");
                meta.mark_failed(format!("failed to open run log files: {e}"));
                self.persist(&meta);
                return;
            }
        };
        let sink: SharedLogSink = Arc::new(logger.clone());

        meta.mark_running();
        self.persist(&meta);

        let result = match meta.kind {
            RunKind::Pipeline => self.drive_pipeline(&meta, Arc::clone(&sink)).await,
            RunKind::Prompt => self.drive_prompt(&meta, Arc::clone(&sink)).await,
        };

        // Logs land before the terminal status does.
        logger.flush().await;

        match result {
            Ok(()) => meta.mark_completed(),
            Err(message) => meta.mark_failed(message),
        }
        self.persist(&meta);
        tracing::info!(run = %meta.id, status = %meta.status, "Run finished");
    }

    async fn drive_pipeline(&self, meta: &RunMetadata, sink: SharedLogSink) -> std::result::Result<(), String> {
        let pipeline = Pipeline::load(&meta.pipeline_path).map_err(|e| e.to_string())?;

        let mut engine = Engine::new().with_loop_config(self.loop_config.clone());
        if let Some(backend) = &self.backend {
            engine = engine.with_agent_support(Arc::clone(backend), self.registry.clone());
        }

        let mut ctx = RunContext::new(&meta.working_directory).with_sink(sink);
        if let Some(prompt) = &meta.user_prompt {
            ctx = ctx.with_user_prompt(prompt);
        }

        let result = engine.execute(&pipeline, &ctx).await;
        if result.success {
            Ok(())
        } else {
            let failed = result.outcomes.iter().rev().find(|o| !o.success);
            Err(match failed {
                Some(outcome) => format!(
                    "node '{}' failed: {}",
                    outcome.node_id,
                    outcome.error.as_deref().unwrap_or("unknown error")
                ),
                None => "pipeline failed".to_string(),
            })
        }
    }

    async fn drive_prompt(&self, meta: &RunMetadata, sink: SharedLogSink) -> std::result::Result<(), String> {
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| "no model backend configured for prompt runs".to_string())?;

        let prompt = load_prompt(&meta.pipeline_path).map_err(|e| e.to_string())?;
        let mut config = LoopConfig::for_prompt();
        if let Some(model) = &prompt.front_matter.model {
            config = config.with_model(model);
        }

        let agent = AgentLoop::new(Arc::clone(backend), self.registry.clone(), config);
        let ctx = ToolContext::new(&meta.working_directory).with_sink(sink);
        let outcome = agent
            .run_prompt(&prompt.body, &ctx)
            .await
            .map_err(|e| e.to_string())?;

        tracing::debug!(
            run = %meta.id,
            iterations = outcome.iterations,
            actions = outcome.actions_executed,
            "Prompt run reached its terminal action"
        );
        Ok(())
    }

    fn persist(&self, meta: &RunMetadata) {
        if let Err(e) = self.store.save(meta) {
            tracing::error!(run = %meta.id, error = %e, "Failed to persist run metadata");
        }
    }
}

fn load_prompt(path: &Path) -> Result<PromptFile> {
    let source = std::fs::read_to_string(path).map_err(|e| RunError::io(path, e))?;
    Ok(PromptFile::parse(&source)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    use sluice_llm::MockBackend;

    use crate::meta::RunStatus;

    fn write_pipeline(dir: &Path, yaml: &str) -> PathBuf {
        let path = dir.join("pipeline.yaml");
        std::fs::write(&path, yaml).unwrap();
        path
    }

    fn manager_in(dir: &Path) -> RunManager {
        RunManager::new(RunStore::open(dir.join("runs")).unwrap())
    }

    #[tokio::test]
    async fn test_pipeline_run_completes_with_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pipeline(
            dir.path(),
            "name: smoke\nnodes:\n  - id: hello\n    type: task\n    command: echo hi\n",
        );
        let manager = manager_in(dir.path());

        let id = manager
            .create_pipeline_run(&path, dir.path(), None)
            .await
            .unwrap();
        let meta = manager.wait(&id).await.unwrap();

        assert_eq!(meta.status, RunStatus::Completed);
        assert_eq!(meta.pipeline_name.as_deref(), Some("smoke"));
        assert!(meta.started_at.is_some());
        assert!(meta.completed_at.is_some());

        let logs = std::fs::read_to_string(meta.artifacts_dir.join("logs.jsonl")).unwrap();
        assert!(logs.contains("pipeline 'smoke' started"));
        assert!(meta.artifacts_dir.join("logs.txt").exists());
    }

    #[tokio::test]
    async fn test_failed_node_marks_run_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pipeline(
            dir.path(),
            "nodes:\n  - id: boom\n    type: task\n    command: \"exit 3\"\n",
        );
        let manager = manager_in(dir.path());

        let id = manager
            .create_pipeline_run(&path, dir.path(), None)
            .await
            .unwrap();
        let meta = manager.wait(&id).await.unwrap();

        assert_eq!(meta.status, RunStatus::Failed);
        let error = meta.error.unwrap();
        assert!(error.contains("boom"), "unexpected error: {error}");
    }

    #[tokio::test]
    async fn test_invalid_pipeline_never_creates_a_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pipeline(dir.path(), "nodes: []\n");
        let manager = manager_in(dir.path());

        let err = manager
            .create_pipeline_run(&path, dir.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Pipeline(_)));
        assert!(manager.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_replays_failed_run() {
        let dir = tempfile::tempdir().unwrap();
        // Fails on the first attempt, succeeds once the marker file exists.
        let path = write_pipeline(
            dir.path(),
            "nodes:\n  - id: flaky\n    type: task\n    command: \"test -f marker || { touch marker; exit 1; }\"\n",
        );
        let manager = manager_in(dir.path());

        let id = manager
            .create_pipeline_run(&path, dir.path(), None)
            .await
            .unwrap();
        let failed = manager.wait(&id).await.unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        let started_at = failed.started_at.unwrap();

        manager.resume_run(&id).await.unwrap();
        let resumed = manager.wait(&id).await.unwrap();

        assert_eq!(resumed.status, RunStatus::Completed);
        assert!(resumed.error.is_none());
        // The original start timestamp survives the resume.
        assert_eq!(resumed.started_at.unwrap(), started_at);

        // Both attempts share one log stream.
        let logs = std::fs::read_to_string(resumed.artifacts_dir.join("logs.jsonl")).unwrap();
        assert!(logs.matches("pipeline '").count() >= 2);
    }

    #[tokio::test]
    async fn test_resume_rejected_for_completed_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pipeline(
            dir.path(),
            "nodes:\n  - id: ok\n    type: task\n    command: \"true\"\n",
        );
        let manager = manager_in(dir.path());

        let id = manager
            .create_pipeline_run(&path, dir.path(), None)
            .await
            .unwrap();
        manager.wait(&id).await.unwrap();

        let err = manager.resume_run(&id).await.unwrap_err();
        assert!(matches!(
            err,
            RunError::NotResumable {
                status: RunStatus::Completed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_prompt_run_requires_active_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.md");
        std::fs::write(&path, "---\nstatus: draft\n---\nDo the thing.").unwrap();
        let manager = manager_in(dir.path());

        let err = manager
            .create_prompt_run(&path, dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not runnable"));
    }

    #[tokio::test]
    async fn test_prompt_run_executes_to_terminal_action() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.md");
        std::fs::write(&path, "---\nstatus: active\n---\nWrite a greeting file.").unwrap();

        let backend = Arc::new(MockBackend::with_text(
            r#"{"action": "write_file", "args": {"path": "greeting.txt", "content": "hi"}}"#,
        ));
        let mut registry = ToolRegistry::new();
        registry.register(sluice_agent::WriteFileTool::new());

        let manager = manager_in(dir.path()).with_agent_support(backend, registry);
        let id = manager
            .create_prompt_run(&path, dir.path())
            .await
            .unwrap();
        let meta = manager.wait(&id).await.unwrap();

        assert_eq!(meta.status, RunStatus::Completed);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("greeting.txt")).unwrap(),
            "hi"
        );
        assert!(meta.artifacts_dir.join("tool-calls.jsonl").exists());
    }

    #[tokio::test]
    async fn test_prompt_run_without_backend_fails_durably() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.md");
        std::fs::write(&path, "---\nstatus: active\n---\nDo the thing.").unwrap();
        let manager = manager_in(dir.path());

        let id = manager
            .create_prompt_run(&path, dir.path())
            .await
            .unwrap();
        let meta = manager.wait(&id).await.unwrap();

        assert_eq!(meta.status, RunStatus::Failed);
        assert!(meta.error.unwrap().contains("no model backend"));
    }
}
