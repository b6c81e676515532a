//! Durable per-run artifact directories.
//!
//! Layout: `<runs-root>/<run-id>/{metadata.json, logs.jsonl, logs.txt,
//! tool-calls.jsonl}`. Metadata is written via a temp file and rename so a
//! crash mid-write never leaves a truncated record.

use std::path::{Path, PathBuf};

use crate::error::{Result, RunError};
use crate::meta::RunMetadata;

/// File name of the durable metadata record.
pub const METADATA_FILE: &str = "metadata.json";
/// File name of the structured log stream.
pub const LOGS_JSONL_FILE: &str = "logs.jsonl";
/// File name of the plain-text log projection.
pub const LOGS_TEXT_FILE: &str = "logs.txt";
/// File name of the tool-call stream.
pub const TOOL_CALLS_FILE: &str = "tool-calls.jsonl";

/// Filesystem store for run artifacts.
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    /// Create a store rooted at the given directory, creating it if absent.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| RunError::io(&root, e))?;
        Ok(Self { root })
    }

    /// The runs root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The artifact directory for a run.
    pub fn run_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Create a run's artifact directory.
    pub fn create_run_dir(&self, id: &str) -> Result<PathBuf> {
        let dir = self.run_dir(id);
        std::fs::create_dir_all(&dir).map_err(|e| RunError::io(&dir, e))?;
        Ok(dir)
    }

    /// Persist metadata. Status transitions call this before any in-memory
    /// notification fires.
    pub fn save(&self, meta: &RunMetadata) -> Result<()> {
        let dir = self.run_dir(&meta.id);
        let path = dir.join(METADATA_FILE);
        let tmp = dir.join(".metadata.json.tmp");

        let json = serde_json::to_string_pretty(meta)?;
        std::fs::write(&tmp, json).map_err(|e| RunError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| RunError::io(&path, e))?;

        tracing::debug!(run = %meta.id, status = %meta.status, "Persisted run metadata");
        Ok(())
    }

    /// Load a run's metadata.
    pub fn load(&self, id: &str) -> Result<RunMetadata> {
        let path = self.run_dir(id).join(METADATA_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RunError::NotFound(id.to_string())
            } else {
                RunError::io(&path, e)
            }
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// All runs in the store, newest first.
    pub fn list(&self) -> Result<Vec<RunMetadata>> {
        let mut runs = Vec::new();
        let entries = std::fs::read_dir(&self.root).map_err(|e| RunError::io(&self.root, e))?;
        for entry in entries.flatten() {
            let id = entry.file_name().to_string_lossy().into_owned();
            match self.load(&id) {
                Ok(meta) => runs.push(meta),
                // Directories without metadata are not runs.
                Err(RunError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    /// Structured log lines for a run, starting at `from_line`. Used by the
    /// poller to publish incremental deltas.
    pub fn read_log_lines(&self, id: &str, from_line: usize) -> Result<Vec<String>> {
        let path = self.run_dir(id).join(LOGS_JSONL_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RunError::io(&path, e)),
        };
        Ok(raw
            .lines()
            .skip(from_line)
            .map(str::to_string)
            .collect())
    }

    /// Reclassify orphaned `running` records as `interrupted`.
    ///
    /// Called by the embedding application on restart, when a `running`
    /// status with no live process means the run was cut short. Returns the
    /// ids reclassified.
    pub fn classify_interrupted(&self) -> Result<Vec<String>> {
        let mut reclassified = Vec::new();
        for mut meta in self.list()? {
            if meta.status == crate::meta::RunStatus::Running {
                meta.mark_interrupted();
                self.save(&meta)?;
                tracing::warn!(run = %meta.id, "Reclassified orphaned run as interrupted");
                reclassified.push(meta.id);
            }
        }
        Ok(reclassified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{RunKind, RunStatus};

    fn meta(store: &RunStore, id: &str) -> RunMetadata {
        RunMetadata::new(
            id,
            RunKind::Pipeline,
            "/proj/p.yaml",
            None,
            None,
            "/proj",
            store.run_dir(id),
        )
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::open(dir.path()).unwrap();
        store.create_run_dir("r1").unwrap();

        let m = meta(&store, "r1");
        store.save(&m).unwrap();

        let loaded = store.load("r1").unwrap();
        assert_eq!(loaded.id, "r1");
        assert_eq!(loaded.status, RunStatus::Queued);
        // No temp file left behind.
        assert!(!store.run_dir("r1").join(".metadata.json.tmp").exists());
    }

    #[test]
    fn test_load_missing_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load("ghost").unwrap_err(),
            RunError::NotFound(id) if id == "ghost"
        ));
    }

    #[test]
    fn test_list_sorted_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::open(dir.path()).unwrap();

        for id in ["a", "b"] {
            store.create_run_dir(id).unwrap();
            let mut m = meta(&store, id);
            m.created_at = chrono::Utc::now();
            store.save(&m).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let runs = store.list().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, "b");
    }

    #[test]
    fn test_read_log_lines_incremental() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::open(dir.path()).unwrap();
        let run_dir = store.create_run_dir("r1").unwrap();
        std::fs::write(run_dir.join(LOGS_JSONL_FILE), "one\ntwo\nthree\n").unwrap();

        assert_eq!(store.read_log_lines("r1", 0).unwrap().len(), 3);
        assert_eq!(store.read_log_lines("r1", 2).unwrap(), vec!["three"]);
        assert!(store.read_log_lines("r1", 3).unwrap().is_empty());
        // A run with no log file yet reads as empty.
        assert!(store.read_log_lines("r2", 0).unwrap().is_empty());
    }

    #[test]
    fn test_classify_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::open(dir.path()).unwrap();

        store.create_run_dir("orphan").unwrap();
        let mut orphan = meta(&store, "orphan");
        orphan.mark_running();
        store.save(&orphan).unwrap();

        store.create_run_dir("done").unwrap();
        let mut done = meta(&store, "done");
        done.mark_running();
        done.mark_completed();
        store.save(&done).unwrap();

        let reclassified = store.classify_interrupted().unwrap();
        assert_eq!(reclassified, vec!["orphan"]);
        assert_eq!(
            store.load("orphan").unwrap().status,
            RunStatus::Interrupted
        );
        assert_eq!(store.load("done").unwrap().status, RunStatus::Completed);
    }
}
