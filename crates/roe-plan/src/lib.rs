//! ROE Plan - recovery plan templates and the task model
//!
//! Provides:
//! - [`RecoveryTask`]: a unit of remediation work with its runtime state
//! - [`SystemRecoveryPlan`]: an immutable, validated plan template
//! - [`PlanRegistry`]: lookup of templates by system type
//!
//! # Example
//!
//! ```rust
//! use roe_plan::{Action, Criticality, Phase, PlanRegistry, RecoveryTask, SystemRecoveryPlan};
//!
//! let plan = SystemRecoveryPlan::new("RECOVERY-CACHE-001", "Cache", Criticality::Medium)
//!     .with_task(
//!         RecoveryTask::new("CACHE-FLUSH", "Flush cache", Phase::Eradication)
//!             .with_action(Action::shell("redis-cli FLUSHALL")),
//!     );
//!
//! let mut registry = PlanRegistry::with_builtin_plans();
//! registry.register("cache", plan).unwrap();
//! assert!(registry.lookup("cache").is_some());
//! ```

mod builtin;
pub mod error;
pub mod plan;
pub mod registry;
pub mod task;
pub mod types;

pub use error::PlanError;
pub use plan::SystemRecoveryPlan;
pub use registry::PlanRegistry;
pub use task::{
    RecoveryTask, META_INTERRUPTED, META_ROLLBACK_FAILED, META_ROLLED_BACK_AT, META_TIMED_OUT,
};
pub use types::{Action, Criticality, Phase, Priority, TaskStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
