//! Configuration for sluice.
//!
//! Configuration is a plain YAML file, `sluice.yaml`. Resolution order:
//! an explicit path wins, then a project-local `sluice.yaml`, then the
//! user-level file under the platform config directory. A missing file is
//! not an error; every field has a built-in default, so an absent or
//! partial file always yields a complete [`SluiceConfig`].

pub mod error;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sluice_policy::{PolicyDefaults, ScriptOverride};

pub use error::{ConfigError, Result};

/// Name of the config file, in both project and user locations.
pub const CONFIG_FILE: &str = "sluice.yaml";

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// Where run artifacts live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunsConfig {
    /// Root directory for per-run artifact directories.
    pub root: PathBuf,
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".sluice/runs"),
        }
    }
}

/// Model defaults for agent execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelConfig {
    /// Model identifier sent to the backend.
    pub model: String,
    /// Max tokens per completion.
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 4096,
        }
    }
}

/// Bounds on the tool-calling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentConfig {
    /// Iteration bound for pipeline agent nodes.
    pub max_iterations: u32,
    /// Iteration bound for standalone prompt runs.
    pub prompt_max_iterations: u32,
    /// Permitted schema-validation failures before an agent node fails.
    pub schema_retries: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            prompt_max_iterations: 6,
            schema_retries: 3,
        }
    }
}

/// Script execution policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptsConfig {
    /// Project root holding `package.json`. Defaults to the working
    /// directory of the run.
    pub project_root: Option<PathBuf>,
    /// Policy defaults applied to every script.
    pub defaults: PolicyDefaults,
    /// Per-script overrides, keyed by requested script name.
    pub overrides: BTreeMap<String, ScriptOverride>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Top level
// ─────────────────────────────────────────────────────────────────────────────

/// Complete sluice configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SluiceConfig {
    /// Run artifact storage.
    pub runs: RunsConfig,
    /// Model defaults.
    pub model: ModelConfig,
    /// Tool-calling loop bounds.
    pub agent: AgentConfig,
    /// Script execution policy.
    pub scripts: ScriptsConfig,
}

impl SluiceConfig {
    /// Load configuration, resolving the file location.
    ///
    /// An explicit path must exist and parse. Otherwise the project
    /// directory is checked for `sluice.yaml`, then the user config
    /// directory; if neither has one, defaults are returned.
    pub fn load(explicit: Option<&Path>, project_dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        let project_file = project_dir.join(CONFIG_FILE);
        if project_file.exists() {
            return Self::load_file(&project_file);
        }

        if let Some(user_file) = Self::user_config_path()
            && user_file.exists()
        {
            return Self::load_file(&user_file);
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load and parse one config file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_yaml::from_str(&source).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// The user-level config file path (`<config-dir>/sluice/sluice.yaml`).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sluice").join(CONFIG_FILE))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
