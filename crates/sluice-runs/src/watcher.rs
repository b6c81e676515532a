//! Polling run observer.
//!
//! Watches the store on an interval and publishes deltas over a channel:
//! status transitions and new structured log lines. Observation goes
//! through the filesystem rather than in-process state, so a watcher in one
//! process can follow runs executed by another.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::meta::RunStatus;
use crate::store::RunStore;

/// A delta observed by the watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A run's persisted status changed since the last poll.
    StatusChanged {
        /// Run id.
        id: String,
        /// The status now on disk.
        status: RunStatus,
    },
    /// New structured log lines appeared since the last poll.
    LogLines {
        /// Run id.
        id: String,
        /// Raw `logs.jsonl` lines, in file order.
        lines: Vec<String>,
    },
}

/// Polls the store and emits [`RunEvent`]s until the receiver is dropped.
pub struct RunWatcher {
    handle: JoinHandle<()>,
}

impl RunWatcher {
    /// Start watching. Events arrive on the returned receiver; dropping it
    /// stops the poll loop.
    pub fn spawn(store: RunStore, interval: Duration) -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(poll_loop(store, interval, tx));
        (Self { handle }, rx)
    }

    /// Stop the watcher immediately.
    pub fn stop(self) {
        self.handle.abort();
    }
}

#[derive(Default)]
struct Cursor {
    status: Option<RunStatus>,
    log_lines: usize,
}

async fn poll_loop(
    store: RunStore,
    interval: Duration,
    tx: mpsc::UnboundedSender<RunEvent>,
) {
    let mut cursors: HashMap<String, Cursor> = HashMap::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let runs = match store.list() {
            Ok(runs) => runs,
            Err(e) => {
                tracing::warn!(error = %e, "Run store poll failed");
                continue;
            }
        };

        for meta in runs {
            let cursor = cursors.entry(meta.id.clone()).or_default();

            // Once a terminal status and its final log delta have been
            // published, the run's files never change again; stop re-reading
            // them. The tick that observes the transition still runs the log
            // read below, so the last lines are not lost.
            if cursor.status.is_some_and(|status| status.is_terminal()) {
                continue;
            }

            if cursor.status != Some(meta.status) {
                cursor.status = Some(meta.status);
                if tx
                    .send(RunEvent::StatusChanged {
                        id: meta.id.clone(),
                        status: meta.status,
                    })
                    .is_err()
                {
                    return;
                }
            }

            let lines = match store.read_log_lines(&meta.id, cursor.log_lines) {
                Ok(lines) => lines,
                Err(e) => {
                    tracing::warn!(run = %meta.id, error = %e, "Log poll failed");
                    continue;
                }
            };
            if !lines.is_empty() {
                cursor.log_lines += lines.len();
                if tx
                    .send(RunEvent::LogLines {
                        id: meta.id.clone(),
                        lines,
                    })
                    .is_err()
                {
                    return;
                }
            }
        }
    }
}
