//! Per-run log writer.
//!
//! Producers (engine, agent loop, task streamers) append from concurrent
//! tasks; all writes funnel through a single actor task over an unbounded
//! channel, so entries land in the files in the order they were submitted
//! and no two writes interleave. Each run gets three append-only files:
//! `logs.jsonl` (structured), `logs.txt` (plain-text projection of the same
//! entries), and `tool-calls.jsonl`.

use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

use sluice_types::{LogEntry, LogSink, ToolCallRecord};

use crate::error::{Result, RunError};
use crate::store::{LOGS_JSONL_FILE, LOGS_TEXT_FILE, TOOL_CALLS_FILE};

enum LogCommand {
    Entry(LogEntry),
    ToolCall(ToolCallRecord),
    Flush(oneshot::Sender<()>),
}

/// Write-queue log sink for one run.
///
/// Cloning shares the queue; the writer task exits once every clone is
/// dropped and the queue drains.
#[derive(Clone)]
pub struct RunLogger {
    tx: mpsc::UnboundedSender<LogCommand>,
}

impl RunLogger {
    /// Open (or append to) the run's log files and start the writer task.
    pub fn create(run_dir: &Path) -> Result<Self> {
        let jsonl = open_append(&run_dir.join(LOGS_JSONL_FILE))?;
        let text = open_append(&run_dir.join(LOGS_TEXT_FILE))?;
        let tool_calls = open_append(&run_dir.join(TOOL_CALLS_FILE))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_task(rx, jsonl, text, tool_calls));
        Ok(Self { tx })
    }

    /// Wait until every entry submitted so far has been written out.
    ///
    /// Called before a run's final status is reported, so observers never
    /// see a terminal status with logs still in flight.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(LogCommand::Flush(done_tx)).is_ok() {
            // The writer dropping the ack mid-shutdown still means the
            // queue ahead of us was drained.
            let _ = done_rx.await;
        }
    }
}

impl LogSink for RunLogger {
    fn append(&self, entry: LogEntry) {
        let _ = self.tx.send(LogCommand::Entry(entry));
    }

    fn append_tool_call(&self, record: ToolCallRecord) {
        let _ = self.tx.send(LogCommand::ToolCall(record));
    }
}

fn open_append(path: &Path) -> Result<File> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| RunError::io(path, e))?;
    Ok(File::from_std(file))
}

async fn writer_task(
    mut rx: mpsc::UnboundedReceiver<LogCommand>,
    mut jsonl: File,
    mut text: File,
    mut tool_calls: File,
) {
    while let Some(command) = rx.recv().await {
        match command {
            LogCommand::Entry(entry) => {
                match serde_json::to_string(&entry) {
                    Ok(line) => {
                        if let Err(e) = jsonl.write_all(format!("{line}\n").as_bytes()).await {
                            tracing::error!(error = %e, "Failed to write structured log entry");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize log entry");
                    }
                }
                let plain = format!("{}\n", entry.to_plain_text());
                if let Err(e) = text.write_all(plain.as_bytes()).await {
                    tracing::error!(error = %e, "Failed to write plain-text log entry");
                }
            }
            LogCommand::ToolCall(record) => match serde_json::to_string(&record) {
                Ok(line) => {
                    if let Err(e) = tool_calls.write_all(format!("{line}\n").as_bytes()).await {
                        tracing::error!(error = %e, "Failed to write tool-call record");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize tool-call record");
                }
            },
            LogCommand::Flush(done) => {
                let _ = jsonl.flush().await;
                let _ = text.flush().await;
                let _ = tool_calls.flush().await;
                let _ = done.send(());
            }
        }
    }
    let _ = jsonl.flush().await;
    let _ = text.flush().await;
    let _ = tool_calls.flush().await;
}
