//! Background run supervision for sluice.
//!
//! A run is one supervised execution of a pipeline or standalone prompt,
//! with a durable artifact directory holding its metadata record and three
//! append-only log streams. The [`RunManager`] creates, executes, and
//! resumes runs; the [`RunWatcher`] observes progress by polling the store,
//! so observation works across processes.

pub mod error;
pub mod logger;
pub mod manager;
pub mod meta;
pub mod store;
pub mod watcher;

pub use error::{Result, RunError};
pub use logger::RunLogger;
pub use manager::RunManager;
pub use meta::{RunKind, RunMetadata, RunStatus};
pub use store::RunStore;
pub use watcher::{RunEvent, RunWatcher};
