//! Error types for plan definition and lookup

use crate::types::Phase;

/// Plan validation and registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// No plan registered for the requested system type
    #[error("unknown system type: {0}")]
    UnknownSystemType(String),

    /// A plan is already registered under this system type
    #[error("plan already registered for system type: {0}")]
    DuplicateSystemType(String),

    /// Two tasks in one plan share an id
    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    /// A dependency points at a task the plan does not contain
    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency {
        /// Dependent task
        task: String,
        /// Missing dependency
        dependency: String,
    },

    /// A dependency lives in a later phase than its dependent
    #[error("task {task} ({task_phase}) depends on {dependency} in later phase {dependency_phase}")]
    ForwardPhaseDependency {
        /// Dependent task
        task: String,
        /// Phase of the dependent task
        task_phase: Phase,
        /// Dependency task
        dependency: String,
        /// Phase of the dependency
        dependency_phase: Phase,
    },

    /// The dependency graph contains a cycle
    #[error("dependency cycle involving task {0}")]
    DependencyCycle(String),
}

impl PlanError {
    /// Whether the error comes from the caller asking for something absent
    #[inline]
    #[must_use]
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, Self::UnknownSystemType(_))
    }
}
