//! The bounded tool-calling loop.
//!
//! One algorithm, two call sites. Pipeline agent nodes use model-native
//! tool calling and must produce a final JSON answer matching a declared
//! output schema. Standalone prompt runs use the JSON action protocol
//! (actions parsed from model text) and end at the first terminal action.
//!
//! Loop-fatal conditions are deliberately few: an unsupported action
//! payload shape, iteration-bound exhaustion, schema-retry exhaustion, and
//! backend failure. Everything that goes wrong inside a single tool call is
//! converted into an observation and fed back to the model.

use chrono::Utc;
use serde_json::Value;
use std::time::Instant;

use sluice_llm::{CompletionRequest, Message, SharedBackend, ToolResultBlock, ToolUse};
use sluice_template::Schema;
use sluice_types::{LogEntry, ToolCallRecord};

use crate::action::{ActionRequest, extract_json, normalize_actions};
use crate::error::{AgentError, Result};
use crate::tool::{ToolContext, ToolRegistry, ToolResult};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for one loop execution.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Model identifier sent to the backend.
    pub model: String,
    /// Max tokens per completion.
    pub max_tokens: u32,
    /// Iteration bound; exhaustion is a fatal error.
    pub max_iterations: u32,
    /// At most this many actions execute per model turn; the rest are
    /// discarded with a warning.
    pub max_actions_per_turn: usize,
    /// Permitted schema-validation failures before an agent node fails.
    pub schema_retries: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 4096,
            max_iterations: 10,
            max_actions_per_turn: 2,
            schema_retries: 3,
        }
    }
}

impl LoopConfig {
    /// Defaults for a pipeline agent node.
    pub fn for_agent_node() -> Self {
        Self::default()
    }

    /// Defaults for a standalone prompt run, which gets a tighter bound.
    pub fn for_prompt() -> Self {
        Self {
            max_iterations: 6,
            ..Self::default()
        }
    }

    /// Override the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the iteration bound.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Outcome of a standalone prompt run that reached a terminal action.
#[derive(Debug, Clone)]
pub struct PromptRunOutcome {
    /// Model turns consumed.
    pub iterations: u32,
    /// Actions executed across all turns.
    pub actions_executed: u32,
    /// Observation recorded by the terminal action.
    pub final_observation: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// The Loop
// ─────────────────────────────────────────────────────────────────────────────

/// Drives model/tool iterations against a backend and a tool registry.
pub struct AgentLoop {
    backend: SharedBackend,
    registry: ToolRegistry,
    config: LoopConfig,
}

impl AgentLoop {
    /// Create a loop over the given backend and tools.
    pub fn new(backend: SharedBackend, registry: ToolRegistry, config: LoopConfig) -> Self {
        Self {
            backend,
            registry,
            config,
        }
    }

    /// The loop's configuration.
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Prompt runs (JSON action protocol)
    // ─────────────────────────────────────────────────────────────────────────

    /// Run a standalone prompt to its terminal action.
    pub async fn run_prompt(&self, prompt: &str, ctx: &ToolContext) -> Result<PromptRunOutcome> {
        let system = self.prompt_system(ctx);
        let mut messages = vec![Message::user(prompt)];
        let mut actions_executed = 0u32;

        for iteration in 1..=self.config.max_iterations {
            let request =
                CompletionRequest::new(&self.config.model, messages.clone(), self.config.max_tokens)
                    .with_system(&system);
            let response = self.backend.complete(request).await?;
            let text = response.text();
            messages.push(Message::assistant(&text));

            tracing::debug!(iteration, chars = text.len(), "Prompt run model turn");

            let Some(payload) = extract_json(&text) else {
                ctx.sink.append(LogEntry::warn(
                    "agent",
                    format!("turn {iteration}: reply contained no JSON action"),
                ));
                messages.push(Message::user(
                    "Your reply did not contain a JSON action. Respond with exactly one JSON action, e.g. {\"action\": \"read_file\", \"args\": {\"path\": \"...\"}}.",
                ));
                continue;
            };

            let actions = self.normalize_or_fail(&payload, ctx)?;
            let actions = self.cap_actions(actions, ctx);

            for action in actions {
                let result = self.dispatch(&action, ctx).await;
                actions_executed += 1;

                if action.is_terminal() {
                    ctx.sink.append(LogEntry::info(
                        "agent",
                        format!("terminal action '{}' completed", action.action),
                    ));
                    return Ok(PromptRunOutcome {
                        iterations: iteration,
                        actions_executed,
                        final_observation: result.observation(),
                    });
                }

                messages.push(Message::user(format!(
                    "Observation: {}\nRespond with the next JSON action.",
                    result.observation()
                )));
            }
        }

        ctx.sink.append(LogEntry::error(
            "agent",
            format!(
                "prompt run exceeded {} iterations without a terminal action",
                self.config.max_iterations
            ),
        ));
        Err(AgentError::MaxIterations(self.config.max_iterations))
    }

    /// System prompt describing the JSON action protocol.
    fn prompt_system(&self, ctx: &ToolContext) -> String {
        let mut tools: Vec<_> = self
            .registry
            .names()
            .into_iter()
            .filter_map(|name| self.registry.get(name))
            .collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));

        let mut system = format!(
            "You are an automation agent working in {}.\n\
             Respond with exactly one JSON action per turn, in the form \
             {{\"action\": \"<name>\", \"args\": {{...}}}}.\n\
             Available actions:\n",
            ctx.workdir.display()
        );
        for tool in tools {
            system.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
        }
        system
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Agent nodes (native tool calling + schema-validated answer)
    // ─────────────────────────────────────────────────────────────────────────

    /// Run a pipeline agent node to a schema-conforming final JSON answer.
    pub async fn run_agent_node(
        &self,
        prompt: &str,
        schema: &Schema,
        ctx: &ToolContext,
    ) -> Result<Value> {
        let definitions = self.registry.to_llm_definitions();
        let system = format!(
            "You are an automation agent working in {}. Use the available tools \
             as needed. When finished, reply with only a JSON value matching this \
             schema: {}",
            ctx.workdir.display(),
            schema.describe()
        );
        let mut messages = vec![Message::user(prompt)];
        let mut schema_failures = 0u32;

        for iteration in 1..=self.config.max_iterations {
            let request =
                CompletionRequest::new(&self.config.model, messages.clone(), self.config.max_tokens)
                    .with_system(&system)
                    .with_tools(definitions.clone());
            let response = self.backend.complete(request).await?;

            if response.has_tool_use() {
                let tool_uses = response.tool_uses();
                messages.push(Message::assistant_blocks(response.content.clone()));
                messages.push(Message::tool_results(
                    self.execute_tool_uses(tool_uses, ctx).await,
                ));
                continue;
            }

            let text = response.text();
            messages.push(Message::assistant(&text));

            let Some(payload) = extract_json(&text) else {
                schema_failures += 1;
                if schema_failures > self.config.schema_retries {
                    return Err(AgentError::SchemaRejected {
                        attempts: schema_failures,
                        errors: "final reply was not valid JSON".to_string(),
                    });
                }
                messages.push(Message::user(format!(
                    "Your reply must be a single JSON value matching this schema: {}",
                    schema.describe()
                )));
                continue;
            };

            let validation = schema.validate(&payload);
            if validation.valid {
                tracing::debug!(iteration, "Agent node produced a valid answer");
                return Ok(payload);
            }

            schema_failures += 1;
            let errors = validation.errors.join("; ");
            ctx.sink.append(LogEntry::warn(
                "agent",
                format!("answer failed schema validation (attempt {schema_failures}): {errors}"),
            ));
            if schema_failures > self.config.schema_retries {
                return Err(AgentError::SchemaRejected {
                    attempts: schema_failures,
                    errors,
                });
            }
            messages.push(Message::user(format!(
                "Your answer did not match the required schema: {errors}. \
                 Reply again with only a JSON value matching: {}",
                schema.describe()
            )));
        }

        Err(AgentError::MaxIterations(self.config.max_iterations))
    }

    /// Execute native tool uses with the per-turn cap, returning one result
    /// block per requested use (discarded uses get an error block so the
    /// conversation stays well formed).
    async fn execute_tool_uses(
        &self,
        tool_uses: Vec<ToolUse>,
        ctx: &ToolContext,
    ) -> Vec<ToolResultBlock> {
        let cap = self.config.max_actions_per_turn;
        if tool_uses.len() > cap {
            tracing::warn!(
                requested = tool_uses.len(),
                cap,
                "Discarding extra tool calls in one turn"
            );
            ctx.sink.append(LogEntry::warn(
                "agent",
                format!(
                    "model requested {} tool calls in one turn; executing the first {cap}",
                    tool_uses.len()
                ),
            ));
        }

        let mut results = Vec::with_capacity(tool_uses.len());
        for (index, tool_use) in tool_uses.into_iter().enumerate() {
            if index >= cap {
                results.push(ToolResultBlock::error(
                    tool_use.id,
                    format!("Action discarded: at most {cap} actions execute per turn"),
                ));
                continue;
            }
            let action = ActionRequest::new(&tool_use.name, tool_use.input);
            let result = self.dispatch(&action, ctx).await;
            results.push(match result {
                ToolResult::Text { content } => ToolResultBlock::success(tool_use.id, content),
                ToolResult::Error { message } => ToolResultBlock::error(tool_use.id, message),
            });
        }
        results
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shared plumbing
    // ─────────────────────────────────────────────────────────────────────────

    /// Normalize a payload, logging the raw payload before a shape failure
    /// propagates.
    fn normalize_or_fail(&self, payload: &Value, ctx: &ToolContext) -> Result<Vec<ActionRequest>> {
        normalize_actions(payload).inspect_err(|_| {
            tracing::error!(payload = %payload, "Unsupported agent response shape");
            ctx.sink.append(
                LogEntry::error("agent", "Unsupported agent response shape")
                    .with_data(payload.clone()),
            );
        })
    }

    /// Enforce the per-turn action cap.
    fn cap_actions(&self, mut actions: Vec<ActionRequest>, ctx: &ToolContext) -> Vec<ActionRequest> {
        let cap = self.config.max_actions_per_turn;
        if actions.len() > cap {
            tracing::warn!(
                requested = actions.len(),
                cap,
                "Discarding extra actions in one turn"
            );
            ctx.sink.append(LogEntry::warn(
                "agent",
                format!(
                    "model returned {} actions in one turn; executing the first {cap}",
                    actions.len()
                ),
            ));
            actions.truncate(cap);
        }
        actions
    }

    /// Execute one action with tool-level error isolation, recording the
    /// call to the sink's tool-call stream.
    async fn dispatch(&self, action: &ActionRequest, ctx: &ToolContext) -> ToolResult {
        let started = Instant::now();
        let timestamp = Utc::now();

        let result = match self
            .registry
            .execute(&action.action, action.args.clone(), ctx)
            .await
        {
            Ok(result) => result,
            Err(e) => ToolResult::error(e.to_string()),
        };

        let observation = result.observation();
        ctx.sink.append_tool_call(ToolCallRecord {
            timestamp,
            action: action.action.clone(),
            args: action.args.clone(),
            success: !result.is_error(),
            duration_ms: started.elapsed().as_millis() as u64,
            observation_len: observation.chars().count(),
        });

        tracing::debug!(
            action = %action.action,
            success = !result.is_error(),
            "Executed agent action"
        );
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
