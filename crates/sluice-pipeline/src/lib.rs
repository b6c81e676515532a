//! Declarative pipeline definition and the sequential orchestration engine.
//!
//! A pipeline is an ordered list of task, gate, and agent nodes. The engine
//! executes them strictly in declared order under a uniform outcome
//! contract: every node produces exactly one [`NodeOutcome`], a failing
//! node halts the run, and tracked tasks report the files they changed.

pub mod changes;
pub mod definition;
pub mod engine;
pub mod error;
pub mod state;

pub use definition::{Node, NodeKind, Pipeline};
pub use engine::{Engine, PipelineResult, RunContext};
pub use error::{PipelineError, Result};
pub use state::{NodeOutcome, PipelineState};
