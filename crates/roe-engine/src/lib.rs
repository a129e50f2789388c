//! ROE Engine - phase-gated recovery orchestration
//!
//! Instantiates a recovery plan for an incident and drives its tasks through
//! five fixed phases:
//! - dependency gating within a phase, unmet dependencies skip the task
//! - bounded concurrent execution of independent tasks
//! - write-through persistence of every task transition
//! - reverse-order rollback of completed tasks
//!
//! See [`Engine`] for the entry points.

mod callbacks;
pub mod config;
mod engine;
pub mod error;
pub mod instance;
mod persistence;
pub mod rollback;
pub mod state_machine;
pub mod status;
mod supervisor;
pub mod telemetry;
mod worker;

pub use callbacks::{TaskCallback, TaskEvent};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, IllegalTransition};
pub use instance::{RecoveryInstance, RecoveryStatus};
pub use rollback::{RollbackOutcome, RollbackReport, TaskRollbackResult};
pub use status::{EngineStatistics, RecoverySnapshot, TaskSummary};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
