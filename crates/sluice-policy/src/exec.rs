//! Bounded script execution.
//!
//! Spawns a resolved invocation, drains stdout and stderr concurrently into
//! fixed-size buffers, and enforces a wall-clock timeout. Streams are
//! consumed to the end even after a buffer fills so the child never blocks
//! on a full pipe.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::{PolicyError, Result};
use crate::policy::ResolvedInvocation;

// ─────────────────────────────────────────────────────────────────────────────
// Capture Buffers
// ─────────────────────────────────────────────────────────────────────────────

/// Per-stream capture limits, in characters.
#[derive(Debug, Clone, Copy)]
pub struct CaptureLimits {
    /// Maximum retained stdout characters.
    pub stdout_chars: usize,
    /// Maximum retained stderr characters.
    pub stderr_chars: usize,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            stdout_chars: 6000,
            stderr_chars: 4000,
        }
    }
}

/// A stream captured up to a fixed character budget.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundedCapture {
    /// Retained text, at most the configured budget.
    pub text: String,
    /// Whether anything was dropped.
    pub truncated: bool,
    /// How many characters past the budget were dropped.
    pub dropped_chars: usize,
}

impl BoundedCapture {
    fn push(&mut self, chunk: &str, budget: usize) {
        let mut retained = self.text.chars().count();
        for ch in chunk.chars() {
            if retained < budget {
                self.text.push(ch);
                retained += 1;
            } else {
                self.truncated = true;
                self.dropped_chars += 1;
            }
        }
    }

    /// The retained text, with an overflow note when truncated.
    pub fn display(&self) -> String {
        if self.truncated {
            format!(
                "{}\n...[truncated {} characters]",
                self.text, self.dropped_chars
            )
        } else {
            self.text.clone()
        }
    }
}

/// Outcome of a supervised script run.
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Whether the run was killed at the timeout.
    pub timed_out: bool,
    /// Captured stdout.
    pub stdout: BoundedCapture,
    /// Captured stderr.
    pub stderr: BoundedCapture,
}

impl ScriptOutput {
    /// Whether the script completed with exit code zero.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────────────────────────────────────

/// Run a resolved invocation to completion with bounded capture.
pub async fn run(invocation: &ResolvedInvocation, limits: CaptureLimits) -> Result<ScriptOutput> {
    tracing::info!(
        program = %invocation.program,
        args = ?invocation.args,
        cwd = %invocation.cwd.display(),
        timeout_secs = invocation.timeout.as_secs(),
        "Running script"
    );

    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .current_dir(&invocation.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| PolicyError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

    // Pipes must drain regardless of the buffer caps; a full pipe would
    // deadlock the child against the timeout.
    let stdout_task = drain(child.stdout.take(), limits.stdout_chars);
    let stderr_task = drain(child.stderr.take(), limits.stderr_chars);

    let waited = tokio::time::timeout(invocation.timeout, child.wait()).await;
    let (exit_code, timed_out) = match waited {
        Ok(status) => (status?.code(), false),
        Err(_) => {
            tracing::warn!(
                script = %invocation.script,
                timeout_secs = invocation.timeout.as_secs(),
                "Script timed out, killing"
            );
            child.start_kill()?;
            let _ = child.wait().await;
            (None, true)
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    tracing::info!(
        script = %invocation.script,
        exit_code = ?exit_code,
        timed_out,
        "Script finished"
    );

    Ok(ScriptOutput {
        exit_code,
        timed_out,
        stdout,
        stderr,
    })
}

/// Spawn a task that reads a stream to EOF, keeping at most `budget` chars.
fn drain(
    stream: Option<impl AsyncRead + Unpin + Send + 'static>,
    budget: usize,
) -> tokio::task::JoinHandle<BoundedCapture> {
    tokio::spawn(async move {
        let mut capture = BoundedCapture::default();
        let Some(mut stream) = stream else {
            return capture;
        };
        let mut buf = vec![0u8; 8192];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]);
                    capture.push(&chunk, budget);
                }
            }
        }
        capture
    })
}
