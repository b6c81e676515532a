//! Script execution policy engine.
//!
//! Turns a declarative allow/deny policy into a safe, validated command
//! line. The flow is: load the project manifest once ([`ScriptManifest`]),
//! construct a [`ScriptPolicy`] from override records and defaults, resolve
//! a requested script + flag map into a [`ResolvedInvocation`], and run it
//! with bounded output collection and a wall-clock timeout ([`exec::run`]).
//!
//! The manifest is an explicitly constructed, injected value - never a
//! process-wide cache - so "load once" is a property of construction, not
//! of hidden global state.

pub mod error;
pub mod exec;
pub mod manifest;
pub mod policy;

pub use error::{PolicyError, Result};
pub use exec::{BoundedCapture, CaptureLimits, ScriptOutput, run};
pub use manifest::ScriptManifest;
pub use policy::{
    FlagKind, FlagSpec, FlagValue, PolicyDefaults, ResolvedInvocation, ScriptOverride,
    ScriptPolicy,
};
