//! Structured log entries and the sink contract.
//!
//! A [`LogEntry`] is one record in a run's append-only `logs.jsonl` stream;
//! the plain-text log is a flattened projection of the same entries. Sinks
//! must accept entries from concurrent producers - ordering within a single
//! sink is the sink's responsibility (the run manager serializes writes
//! through a per-run queue).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Log Entries
// ─────────────────────────────────────────────────────────────────────────────

/// Severity level of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Uppercase label used in the plain-text projection.
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// A single structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was emitted.
    pub timestamp: DateTime<Utc>,
    /// Severity level.
    pub level: LogLevel,
    /// Originating subsystem or node (e.g. "engine", "task:build", "agent").
    pub category: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create an entry at the given level.
    pub fn new(level: LogLevel, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            category: category.into(),
            message: message.into(),
            data: None,
        }
    }

    /// Create an info entry.
    pub fn info(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, category, message)
    }

    /// Create a warning entry.
    pub fn warn(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, category, message)
    }

    /// Create an error entry.
    pub fn error(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, category, message)
    }

    /// Create a debug entry.
    pub fn debug(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Debug, category, message)
    }

    /// Attach a structured payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Render the plain-text projection of this entry.
    pub fn to_plain_text(&self) -> String {
        format!(
            "[{}] [{}] [{}] {}",
            self.timestamp.to_rfc3339(),
            self.level.label(),
            self.category,
            self.message
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Call Records
// ─────────────────────────────────────────────────────────────────────────────

/// A single executed agent action, recorded to `tool-calls.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// When the action started.
    pub timestamp: DateTime<Utc>,
    /// Action name (e.g. "read_file").
    pub action: String,
    /// Arguments as supplied by the model.
    pub args: serde_json::Value,
    /// Whether the action completed without a tool error.
    pub success: bool,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Length of the observation text returned to the model (characters).
    pub observation_len: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Sink Contract
// ─────────────────────────────────────────────────────────────────────────────

/// Destination for structured log entries and tool-call records.
///
/// Implementations must be safe to call from concurrent producers. Appends
/// are fire-and-forget from the producer's point of view; durability and
/// ordering are the sink's concern.
pub trait LogSink: Send + Sync {
    /// Append one structured entry.
    fn append(&self, entry: LogEntry);

    /// Append one tool-call record. Sinks without a tool-call stream may
    /// keep the default no-op.
    fn append_tool_call(&self, _record: ToolCallRecord) {}
}

/// A sink that can be shared across threads.
pub type SharedLogSink = Arc<dyn LogSink>;

/// Sink that discards everything. Useful as a default and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn append(&self, _entry: LogEntry) {}
}

/// Sink that buffers entries in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
    tool_calls: Mutex<Vec<ToolCallRecord>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries appended so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Snapshot of all tool-call records appended so far.
    pub fn tool_calls(&self) -> Vec<ToolCallRecord> {
        self.tool_calls.lock().clone()
    }

    /// Messages of all entries, in append order.
    pub fn messages(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.message.clone()).collect()
    }
}

impl LogSink for MemorySink {
    fn append(&self, entry: LogEntry) {
        self.entries.lock().push(entry);
    }

    fn append_tool_call(&self, record: ToolCallRecord) {
        self.tool_calls.lock().push(record);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
