//! Shared types and contracts for sluice.
//!
//! This is the leaf crate of the workspace. It holds the structured log
//! model and the [`LogSink`] contract that the pipeline engine, the agent
//! loop, and the run manager all funnel through, so that every subsystem
//! emits the same record shape regardless of where the bytes end up.

pub mod log;

pub use log::{
    LogEntry, LogLevel, LogSink, MemorySink, NullSink, SharedLogSink, ToolCallRecord,
};
