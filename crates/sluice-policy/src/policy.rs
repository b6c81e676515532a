//! Policy resolution: script name + flag map to a validated argument vector.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, Result};
use crate::manifest::ScriptManifest;

// ─────────────────────────────────────────────────────────────────────────────
// Flag Specifications
// ─────────────────────────────────────────────────────────────────────────────

/// A flag value supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    /// Boolean switch.
    Bool(bool),
    /// String-valued flag.
    Str(String),
}

/// Kind of value an allowed flag accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagKind {
    /// Flag takes a string value, emitted as `--switch value`.
    #[default]
    String,
    /// Flag is a boolean switch, emitted only when true.
    Bool,
}

/// Declaration of one allowed flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlagSpec {
    /// Value kind.
    pub kind: FlagKind,
    /// CLI switch to emit instead of one derived from the flag name.
    pub switch: Option<String>,
    /// Whether a string flag may carry an empty value.
    pub allow_empty: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Overrides and Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Per-script policy override record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptOverride {
    /// Underlying manifest script to run instead of the requested name.
    pub script: Option<String>,
    /// Working directory for the invocation.
    pub cwd: Option<PathBuf>,
    /// Allowed-flag table. When present, every requested flag is checked
    /// against it.
    pub flags: Option<BTreeMap<String, FlagSpec>>,
    /// Whether flags absent from the table pass through.
    pub allow_unknown_flags: Option<bool>,
    /// Wall-clock timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// Process-wide policy defaults, used where an override is silent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicyDefaults {
    /// Whether unknown flags pass through by default.
    pub allow_unknown_flags: bool,
    /// Default wall-clock timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            allow_unknown_flags: false,
            timeout_secs: 300,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────────────────────────────────────

/// A fully validated script invocation, ready to spawn.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInvocation {
    /// Program to spawn (normally `npm`).
    pub program: String,
    /// Full argument vector.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: PathBuf,
    /// Wall-clock timeout.
    pub timeout: Duration,
    /// The underlying manifest script being run.
    pub script: String,
}

/// The policy engine: manifest + overrides + defaults.
#[derive(Debug, Clone)]
pub struct ScriptPolicy {
    manifest: ScriptManifest,
    overrides: BTreeMap<String, ScriptOverride>,
    defaults: PolicyDefaults,
}

impl ScriptPolicy {
    /// Create a policy engine.
    pub fn new(
        manifest: ScriptManifest,
        overrides: BTreeMap<String, ScriptOverride>,
        defaults: PolicyDefaults,
    ) -> Self {
        Self {
            manifest,
            overrides,
            defaults,
        }
    }

    /// Create a policy engine with no overrides and default policy.
    pub fn with_manifest(manifest: ScriptManifest) -> Self {
        Self::new(manifest, BTreeMap::new(), PolicyDefaults::default())
    }

    /// The injected manifest.
    pub fn manifest(&self) -> &ScriptManifest {
        &self.manifest
    }

    /// Resolve a requested script and flag map into a validated invocation.
    ///
    /// The resolved underlying script must be declared in the manifest -
    /// no override configuration can bypass that check.
    pub fn resolve(
        &self,
        name: &str,
        flags: &BTreeMap<String, FlagValue>,
    ) -> Result<ResolvedInvocation> {
        let override_rec = self.overrides.get(name);

        let underlying = override_rec
            .and_then(|o| o.script.as_deref())
            .unwrap_or(name)
            .to_string();

        if !self.manifest.contains(&underlying) {
            return Err(PolicyError::ScriptNotDefined(underlying));
        }

        let allow_unknown = override_rec
            .and_then(|o| o.allow_unknown_flags)
            .unwrap_or(self.defaults.allow_unknown_flags);
        let flag_table = override_rec.and_then(|o| o.flags.as_ref());

        let mut flag_args = Vec::new();
        for (flag, value) in flags {
            match flag_table.and_then(|t| t.get(flag)) {
                Some(spec) => {
                    self.apply_spec(name, flag, spec, value, &mut flag_args)?;
                }
                None if allow_unknown => {
                    apply_passthrough(flag, value, &mut flag_args);
                }
                None => {
                    return Err(PolicyError::UnknownFlag {
                        flag: flag.clone(),
                        script: name.to_string(),
                    });
                }
            }
        }

        let mut args = vec!["run".to_string(), underlying.clone()];
        if !flag_args.is_empty() {
            args.push("--".to_string());
            args.extend(flag_args);
        }

        let cwd = override_rec
            .and_then(|o| o.cwd.clone())
            .unwrap_or_else(|| self.manifest.root().to_path_buf());
        let timeout_secs = override_rec
            .and_then(|o| o.timeout_secs)
            .unwrap_or(self.defaults.timeout_secs);

        tracing::debug!(
            requested = name,
            script = %underlying,
            args = ?args,
            "Resolved script invocation"
        );

        Ok(ResolvedInvocation {
            program: "npm".to_string(),
            args,
            cwd,
            timeout: Duration::from_secs(timeout_secs),
            script: underlying,
        })
    }

    fn apply_spec(
        &self,
        script: &str,
        flag: &str,
        spec: &FlagSpec,
        value: &FlagValue,
        out: &mut Vec<String>,
    ) -> Result<()> {
        let switch = spec
            .switch
            .clone()
            .unwrap_or_else(|| derive_switch(flag));

        match (spec.kind, value) {
            (FlagKind::Bool, FlagValue::Bool(true)) => {
                out.push(switch);
                Ok(())
            }
            (FlagKind::Bool, FlagValue::Bool(false)) => Ok(()),
            (FlagKind::Bool, FlagValue::Str(_)) => Err(PolicyError::FlagType {
                flag: flag.to_string(),
                script: script.to_string(),
                expected: "boolean",
            }),
            (FlagKind::String, FlagValue::Str(s)) => {
                if s.is_empty() && !spec.allow_empty {
                    return Err(PolicyError::EmptyFlagValue {
                        flag: flag.to_string(),
                        script: script.to_string(),
                    });
                }
                out.push(switch);
                out.push(s.clone());
                Ok(())
            }
            (FlagKind::String, FlagValue::Bool(_)) => Err(PolicyError::FlagType {
                flag: flag.to_string(),
                script: script.to_string(),
                expected: "string",
            }),
        }
    }
}

/// Emit a passed-through unknown flag with the literal switch convention.
fn apply_passthrough(flag: &str, value: &FlagValue, out: &mut Vec<String>) {
    let switch = derive_switch(flag);
    match value {
        FlagValue::Bool(true) => out.push(switch),
        FlagValue::Bool(false) => {}
        FlagValue::Str(s) => {
            out.push(switch);
            out.push(s.clone());
        }
    }
}

/// `-x` for single-character names, `--long` otherwise.
fn derive_switch(flag: &str) -> String {
    if flag.chars().count() == 1 {
        format!("-{flag}")
    } else {
        format!("--{flag}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> ScriptManifest {
        let scripts = BTreeMap::from([
            ("test".to_string(), "vitest run".to_string()),
            ("lint".to_string(), "eslint .".to_string()),
            ("check".to_string(), "tsc --noEmit".to_string()),
        ]);
        ScriptManifest::from_scripts("/proj", scripts)
    }

    fn flags(pairs: &[(&str, FlagValue)]) -> BTreeMap<String, FlagValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_undeclared_script_rejected() {
        let policy = ScriptPolicy::with_manifest(manifest());
        let err = policy.resolve("deploy", &BTreeMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "Script deploy is not defined");
    }

    #[test]
    fn test_undeclared_underlying_script_rejected_despite_override() {
        let overrides = BTreeMap::from([(
            "release".to_string(),
            ScriptOverride {
                script: Some("publish".to_string()),
                ..Default::default()
            },
        )]);
        let policy = ScriptPolicy::new(manifest(), overrides, PolicyDefaults::default());
        let err = policy.resolve("release", &BTreeMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "Script publish is not defined");
    }

    #[test]
    fn test_plain_resolution() {
        let policy = ScriptPolicy::with_manifest(manifest());
        let inv = policy.resolve("test", &BTreeMap::new()).unwrap();
        assert_eq!(inv.program, "npm");
        assert_eq!(inv.args, vec!["run", "test"]);
        assert_eq!(inv.cwd, PathBuf::from("/proj"));
        assert_eq!(inv.timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_unknown_flag_rejected_by_default() {
        let policy = ScriptPolicy::with_manifest(manifest());
        let err = policy
            .resolve("test", &flags(&[("force", FlagValue::Bool(true))]))
            .unwrap_err();
        assert!(matches!(err, PolicyError::UnknownFlag { .. }));
    }

    #[test]
    fn test_unknown_flag_passthrough_when_allowed() {
        let overrides = BTreeMap::from([(
            "test".to_string(),
            ScriptOverride {
                allow_unknown_flags: Some(true),
                ..Default::default()
            },
        )]);
        let policy = ScriptPolicy::new(manifest(), overrides, PolicyDefaults::default());
        let inv = policy
            .resolve(
                "test",
                &flags(&[
                    ("q", FlagValue::Bool(true)),
                    ("reporter", FlagValue::Str("json".into())),
                ]),
            )
            .unwrap();
        assert_eq!(
            inv.args,
            vec!["run", "test", "--", "-q", "--reporter", "json"]
        );
    }

    #[test]
    fn test_bool_flag_only_emitted_when_true() {
        let overrides = BTreeMap::from([(
            "test".to_string(),
            ScriptOverride {
                flags: Some(BTreeMap::from([(
                    "watch".to_string(),
                    FlagSpec {
                        kind: FlagKind::Bool,
                        ..Default::default()
                    },
                )])),
                ..Default::default()
            },
        )]);
        let policy = ScriptPolicy::new(manifest(), overrides, PolicyDefaults::default());

        let on = policy
            .resolve("test", &flags(&[("watch", FlagValue::Bool(true))]))
            .unwrap();
        assert_eq!(on.args, vec!["run", "test", "--", "--watch"]);

        let off = policy
            .resolve("test", &flags(&[("watch", FlagValue::Bool(false))]))
            .unwrap();
        assert_eq!(off.args, vec!["run", "test"]);
    }

    #[test]
    fn test_bool_flag_rejects_string_value() {
        let overrides = BTreeMap::from([(
            "test".to_string(),
            ScriptOverride {
                flags: Some(BTreeMap::from([(
                    "watch".to_string(),
                    FlagSpec {
                        kind: FlagKind::Bool,
                        ..Default::default()
                    },
                )])),
                ..Default::default()
            },
        )]);
        let policy = ScriptPolicy::new(manifest(), overrides, PolicyDefaults::default());
        let err = policy
            .resolve("test", &flags(&[("watch", FlagValue::Str("yes".into()))]))
            .unwrap_err();
        assert!(matches!(
            err,
            PolicyError::FlagType {
                expected: "boolean",
                ..
            }
        ));
    }

    #[test]
    fn test_string_flag_rename_and_empty_rules() {
        let overrides = BTreeMap::from([(
            "lint".to_string(),
            ScriptOverride {
                flags: Some(BTreeMap::from([
                    (
                        "pattern".to_string(),
                        FlagSpec {
                            kind: FlagKind::String,
                            switch: Some("--ext".to_string()),
                            allow_empty: false,
                        },
                    ),
                    (
                        "note".to_string(),
                        FlagSpec {
                            kind: FlagKind::String,
                            switch: None,
                            allow_empty: true,
                        },
                    ),
                ])),
                ..Default::default()
            },
        )]);
        let policy = ScriptPolicy::new(manifest(), overrides, PolicyDefaults::default());

        let inv = policy
            .resolve("lint", &flags(&[("pattern", FlagValue::Str(".ts".into()))]))
            .unwrap();
        assert_eq!(inv.args, vec!["run", "lint", "--", "--ext", ".ts"]);

        let err = policy
            .resolve("lint", &flags(&[("pattern", FlagValue::Str("".into()))]))
            .unwrap_err();
        assert!(matches!(err, PolicyError::EmptyFlagValue { .. }));

        let empty_ok = policy
            .resolve("lint", &flags(&[("note", FlagValue::Str("".into()))]))
            .unwrap();
        assert_eq!(empty_ok.args, vec!["run", "lint", "--", "--note", ""]);
    }

    #[test]
    fn test_override_cwd_and_timeout() {
        let overrides = BTreeMap::from([(
            "check".to_string(),
            ScriptOverride {
                cwd: Some(PathBuf::from("/proj/packages/core")),
                timeout_secs: Some(30),
                ..Default::default()
            },
        )]);
        let policy = ScriptPolicy::new(manifest(), overrides, PolicyDefaults::default());
        let inv = policy.resolve("check", &BTreeMap::new()).unwrap();
        assert_eq!(inv.cwd, PathBuf::from("/proj/packages/core"));
        assert_eq!(inv.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_flag_value_deserializes_both_kinds() {
        let value: BTreeMap<String, FlagValue> =
            serde_json::from_str(r#"{"watch": true, "reporter": "json"}"#).unwrap();
        assert_eq!(value["watch"], FlagValue::Bool(true));
        assert_eq!(value["reporter"], FlagValue::Str("json".into()));
    }
}
