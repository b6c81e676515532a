//! File-change tracking for tasks.
//!
//! A tracked task snapshots file modification times under its working
//! directory immediately before and after the command. Any file whose
//! timestamp advanced, or that is newly present, is reported as changed.
//! Dot-entries and dependency caches are skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

/// Directory names never descended into.
const SKIPPED_DIRS: [&str; 3] = ["node_modules", "target", ".git"];

/// A point-in-time map of file path to modification time.
pub type Snapshot = BTreeMap<PathBuf, SystemTime>;

fn skip(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || (entry.file_type().is_dir() && SKIPPED_DIRS.contains(&name.as_ref()))
}

/// Snapshot modification times for all regular files under `root`.
///
/// Entries that vanish or error mid-walk are ignored; the snapshot is
/// best-effort by design.
pub fn snapshot(root: impl AsRef<Path>) -> Snapshot {
    let root = root.as_ref();
    let mut snap = Snapshot::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !skip(e))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(meta) = entry.metadata()
            && let Ok(mtime) = meta.modified()
        {
            snap.insert(entry.into_path(), mtime);
        }
    }
    snap
}

/// Files present in `after` that are new or whose timestamp advanced.
pub fn diff(before: &Snapshot, after: &Snapshot) -> Vec<PathBuf> {
    after
        .iter()
        .filter(|(path, mtime)| match before.get(*path) {
            Some(previous) => mtime > &previous,
            None => true,
        })
        .map(|(path, _)| path.clone())
        .collect()
}
