//! The sequential orchestration engine.
//!
//! Walks a validated pipeline in declared order, dispatching each node to
//! its per-kind executor under a uniform outcome contract. The first
//! failing node halts the run; remaining nodes are never invoked. Executor
//! failures are recorded in the node's outcome rather than propagated, so a
//! failed run is data, not a crashed process.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use sluice_agent::{AgentLoop, LoopConfig, ToolContext, ToolRegistry};
use sluice_llm::SharedBackend;
use sluice_template::Schema;
use sluice_types::{LogEntry, NullSink, SharedLogSink};

use crate::changes;
use crate::definition::{Node, NodeKind, Pipeline};
use crate::state::{NodeOutcome, PipelineState};

// ─────────────────────────────────────────────────────────────────────────────
// Run Context and Result
// ─────────────────────────────────────────────────────────────────────────────

/// Per-run inputs to the engine.
#[derive(Clone)]
pub struct RunContext {
    /// Working directory for the run.
    pub working_directory: PathBuf,
    /// Prompt supplied by the user when the run was created.
    pub user_prompt: Option<String>,
    /// Destination for structured log output.
    pub sink: SharedLogSink,
}

impl RunContext {
    /// Create a context that discards log output.
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
            user_prompt: None,
            sink: Arc::new(NullSink),
        }
    }

    /// Attach a user prompt.
    pub fn with_user_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.user_prompt = Some(prompt.into());
        self
    }

    /// Attach a log sink.
    pub fn with_sink(mut self, sink: SharedLogSink) -> Self {
        self.sink = sink;
        self
    }
}

/// The overall result of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Whether every node succeeded.
    pub success: bool,
    /// Outcomes for the nodes actually attempted, in order.
    pub outcomes: Vec<NodeOutcome>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Executes pipelines node by node.
pub struct Engine {
    backend: Option<SharedBackend>,
    registry: ToolRegistry,
    loop_config: LoopConfig,
}

impl Engine {
    /// Create an engine without LLM support; agent nodes will fail.
    pub fn new() -> Self {
        Self {
            backend: None,
            registry: ToolRegistry::new(),
            loop_config: LoopConfig::for_agent_node(),
        }
    }

    /// Attach an LLM backend and tool registry for agent nodes.
    pub fn with_agent_support(mut self, backend: SharedBackend, registry: ToolRegistry) -> Self {
        self.backend = Some(backend);
        self.registry = registry;
        self
    }

    /// Override the agent loop configuration.
    pub fn with_loop_config(mut self, config: LoopConfig) -> Self {
        self.loop_config = config;
        self
    }

    /// Execute a pipeline to completion or first failure.
    pub async fn execute(&self, pipeline: &Pipeline, ctx: &RunContext) -> PipelineResult {
        let mut state = PipelineState::new(
            ctx.working_directory.clone(),
            ctx.user_prompt.clone(),
        );
        let mut outcomes = Vec::new();

        ctx.sink.append(LogEntry::info(
            "engine",
            format!(
                "pipeline '{}' started with {} nodes",
                pipeline.name.as_deref().unwrap_or("unnamed"),
                pipeline.nodes.len()
            ),
        ));

        for node in &pipeline.nodes {
            ctx.sink.append(LogEntry::info(
                "engine",
                format!("node '{}' ({}) started", node.id, node.kind.type_name()),
            ));
            tracing::info!(node = %node.id, kind = node.kind.type_name(), "Executing node");

            let outcome = self.execute_node(node, &state, ctx).await;
            let success = outcome.success;

            if success {
                ctx.sink.append(LogEntry::info(
                    "engine",
                    format!("node '{}' completed in {}ms", node.id, outcome.duration_ms),
                ));
            } else {
                ctx.sink.append(LogEntry::error(
                    "engine",
                    format!(
                        "node '{}' failed: {}",
                        node.id,
                        outcome.error.as_deref().unwrap_or("unknown error")
                    ),
                ));
            }

            state.insert(outcome.clone());
            outcomes.push(outcome);

            if !success {
                ctx.sink.append(LogEntry::error(
                    "engine",
                    format!("pipeline halted at node '{}'", node.id),
                ));
                return PipelineResult {
                    success: false,
                    outcomes,
                };
            }
        }

        ctx.sink
            .append(LogEntry::info("engine", "pipeline completed"));
        PipelineResult {
            success: true,
            outcomes,
        }
    }

    /// Dispatch one node to its executor, wrapping the result in an outcome.
    async fn execute_node(&self, node: &Node, state: &PipelineState, ctx: &RunContext) -> NodeOutcome {
        let started_at = Utc::now();
        let timer = Instant::now();

        let result = match &node.kind {
            NodeKind::Task {
                command,
                cwd,
                env,
                track_changes,
            } => {
                self.execute_task(node, command, cwd.as_deref(), env, *track_changes, state, ctx)
                    .await
            }
            NodeKind::Gate { command, message } => {
                self.execute_gate(command, message.as_deref(), state, ctx).await
            }
            NodeKind::Agent {
                prompt,
                tools,
                output_schema,
                model,
            } => {
                self.execute_agent(prompt, tools, output_schema, model.as_deref(), state, ctx)
                    .await
            }
        };

        let finished_at = Utc::now();
        let duration_ms = timer.elapsed().as_millis() as u64;
        match result {
            Ok(body) => NodeOutcome {
                node_id: node.id.clone(),
                node_type: node.kind.type_name().to_string(),
                success: true,
                output: body.output,
                error: None,
                changed_files: body.changed_files,
                started_at,
                finished_at,
                duration_ms,
            },
            Err(error) => NodeOutcome {
                node_id: node.id.clone(),
                node_type: node.kind.type_name().to_string(),
                success: false,
                output: None,
                error: Some(error),
                changed_files: None,
                started_at,
                finished_at,
                duration_ms,
            },
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Task Executor
    // ─────────────────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    async fn execute_task(
        &self,
        node: &Node,
        command: &str,
        cwd: Option<&std::path::Path>,
        env: &std::collections::BTreeMap<String, String>,
        track_changes: bool,
        state: &PipelineState,
        ctx: &RunContext,
    ) -> std::result::Result<OutcomeBody, String> {
        let command = resolve_template(command, state)?;
        let effective_cwd = match cwd {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) => ctx.working_directory.join(dir),
            None => ctx.working_directory.clone(),
        };

        let before = track_changes.then(|| changes::snapshot(&effective_cwd));

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(&effective_cwd)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn '{command}': {e}"))?;

        // Each stream is forwarded line by line as it arrives, preserving
        // interleaving with other log output.
        let category = format!("task:{}", node.id);
        let stdout_task = stream_lines(child.stdout.take(), ctx.sink.clone(), category.clone(), false);
        let stderr_task = stream_lines(child.stderr.take(), ctx.sink.clone(), category, true);

        let status = child
            .wait()
            .await
            .map_err(|e| format!("failed to wait for '{command}': {e}"))?;
        let stdout = stdout_task.await.unwrap_or_default();
        let _stderr = stderr_task.await.unwrap_or_default();

        let changed_files = before.map(|snap| {
            let after = changes::snapshot(&effective_cwd);
            changes::diff(&snap, &after)
        });

        if !status.success() {
            return Err(format!(
                "command exited with code {}",
                status.code().map(|c| c.to_string()).unwrap_or_else(|| "unknown".into())
            ));
        }

        Ok(OutcomeBody {
            output: Some(Value::String(stdout.trim_end().to_string())),
            changed_files,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Gate Executor
    // ─────────────────────────────────────────────────────────────────────────

    async fn execute_gate(
        &self,
        command: &str,
        message: Option<&str>,
        state: &PipelineState,
        ctx: &RunContext,
    ) -> std::result::Result<OutcomeBody, String> {
        let command = resolve_template(command, state)?;

        // Gates are synchronous pass/fail checks; their output goes straight
        // to the controlling terminal.
        let status = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(&ctx.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| format!("failed to spawn '{command}': {e}"))?;

        if status.success() {
            Ok(OutcomeBody {
                output: None,
                changed_files: None,
            })
        } else {
            Err(message.map(str::to_string).unwrap_or_else(|| {
                format!(
                    "gate command exited with code {}",
                    status.code().map(|c| c.to_string()).unwrap_or_else(|| "unknown".into())
                )
            }))
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Agent Executor
    // ─────────────────────────────────────────────────────────────────────────

    async fn execute_agent(
        &self,
        prompt: &str,
        tools: &[String],
        output_schema: &str,
        model: Option<&str>,
        state: &PipelineState,
        ctx: &RunContext,
    ) -> std::result::Result<OutcomeBody, String> {
        let Some(backend) = &self.backend else {
            return Err("no LLM backend configured for agent nodes".to_string());
        };

        let prompt = resolve_template(prompt, state)?;
        let schema =
            Schema::parse(output_schema).map_err(|e| format!("invalid output schema: {e}"))?;

        let registry = self.registry.filtered_by_names(tools);
        let mut config = self.loop_config.clone();
        if let Some(model) = model {
            config.model = model.to_string();
        }

        let tool_ctx =
            ToolContext::new(&ctx.working_directory).with_sink(ctx.sink.clone());
        let agent = AgentLoop::new(backend.clone(), registry, config);
        let answer = agent
            .run_agent_node(&prompt, &schema, &tool_ctx)
            .await
            .map_err(|e| e.to_string())?;

        Ok(OutcomeBody {
            output: Some(answer),
            changed_files: None,
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Successful executor output before it is wrapped into a [`NodeOutcome`].
struct OutcomeBody {
    output: Option<Value>,
    changed_files: Option<Vec<PathBuf>>,
}

/// Resolve `{{expr}}` references against the accumulated state.
fn resolve_template(template: &str, state: &PipelineState) -> std::result::Result<String, String> {
    sluice_template::resolve(template, &state.template_state()).map_err(|e| e.to_string())
}

/// Spawn a task that forwards a stream to the sink line by line, returning
/// the accumulated text.
fn stream_lines(
    stream: Option<impl AsyncRead + Unpin + Send + 'static>,
    sink: SharedLogSink,
    category: String,
    is_stderr: bool,
) -> tokio::task::JoinHandle<String> {
    tokio::spawn(async move {
        let mut captured = String::new();
        let Some(stream) = stream else {
            return captured;
        };
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            sink.append(if is_stderr {
                LogEntry::warn(&category, &line)
            } else {
                LogEntry::info(&category, &line)
            });
            captured.push_str(&line);
            captured.push('\n');
        }
        captured
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
