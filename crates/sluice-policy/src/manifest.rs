//! Project manifest script table.
//!
//! The manifest is read from `package.json` once at startup and injected
//! into the [`ScriptPolicy`](crate::policy::ScriptPolicy); the process
//! assumes it does not change for the process lifetime.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PolicyError, Result};

/// The scripts table of a project manifest.
#[derive(Debug, Clone)]
pub struct ScriptManifest {
    /// Project root the manifest was loaded from.
    root: PathBuf,
    /// Script name to command line, as declared.
    scripts: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct PackageJson {
    #[serde(default)]
    scripts: BTreeMap<String, String>,
}

impl ScriptManifest {
    /// Load `package.json` from a project root.
    ///
    /// A manifest without a `scripts` table loads successfully and declares
    /// no scripts.
    pub fn load(project_root: impl AsRef<Path>) -> Result<Self> {
        let root = project_root.as_ref().to_path_buf();
        let path = root.join("package.json");
        let raw = std::fs::read_to_string(&path).map_err(|source| PolicyError::ManifestRead {
            path: path.clone(),
            source,
        })?;
        let parsed: PackageJson = serde_json::from_str(&raw)
            .map_err(|source| PolicyError::ManifestParse { path, source })?;

        tracing::debug!(
            root = %root.display(),
            scripts = parsed.scripts.len(),
            "Loaded project manifest"
        );

        Ok(Self {
            root,
            scripts: parsed.scripts,
        })
    }

    /// Build a manifest from an explicit script table (tests, embedders).
    pub fn from_scripts(
        root: impl Into<PathBuf>,
        scripts: BTreeMap<String, String>,
    ) -> Self {
        Self {
            root: root.into(),
            scripts,
        }
    }

    /// Project root this manifest belongs to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a script is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }

    /// The declared command line for a script.
    pub fn command(&self, name: &str) -> Option<&str> {
        self.scripts.get(name).map(String::as_str)
    }

    /// Declared script names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.scripts.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reads_scripts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name": "proj", "scripts": {"test": "vitest run", "lint": "eslint ."}}"#,
        )
        .unwrap();

        let manifest = ScriptManifest::load(dir.path()).unwrap();
        assert!(manifest.contains("test"));
        assert!(manifest.contains("lint"));
        assert!(!manifest.contains("deploy"));
        assert_eq!(manifest.command("test"), Some("vitest run"));
        assert_eq!(manifest.names(), vec!["lint", "test"]);
    }

    #[test]
    fn test_load_without_scripts_table() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), r#"{"name": "bare"}"#).unwrap();

        let manifest = ScriptManifest::load(dir.path()).unwrap();
        assert!(manifest.names().is_empty());
    }

    #[test]
    fn test_load_missing_file_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = ScriptManifest::load(dir.path()).unwrap_err();
        match err {
            PolicyError::ManifestRead { path, .. } => {
                assert!(path.ends_with("package.json"));
            }
            other => panic!("expected ManifestRead, got: {other:?}"),
        }
    }

    #[test]
    fn test_load_invalid_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{not json").unwrap();
        let err = ScriptManifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, PolicyError::ManifestParse { .. }));
    }
}
