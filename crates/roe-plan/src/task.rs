//! Recovery task: template fields plus runtime state
//!
//! A plan holds tasks in their pristine `Pending` form. The engine deep-copies
//! them into each recovery instance, so runtime state (status, timestamps,
//! logs, metadata) is never shared between instances.

use crate::types::{Action, Phase, Priority, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata key: rollback ran but at least one rollback action failed
pub const META_ROLLBACK_FAILED: &str = "rollback_failed";
/// Metadata key: an action exceeded its deadline
pub const META_TIMED_OUT: &str = "timed_out";
/// Metadata key: timestamp of the last successful rollback
pub const META_ROLLED_BACK_AT: &str = "rolled_back_at";
/// Metadata key: execution was cut short by engine shutdown
pub const META_INTERRUPTED: &str = "interrupted";

/// A unit of remediation work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryTask {
    /// Unique within a plan
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// What the task does
    pub description: String,
    /// Phase the task belongs to
    pub phase: Phase,
    /// Ordering tier within the phase
    pub priority: Priority,
    /// Operator estimate, informational only
    pub estimated_duration_minutes: u32,
    /// Task ids that must be `Completed` before this task starts
    pub dependencies: Vec<String>,
    /// Forward actions, run in order, fail-fast
    pub actions: Vec<Action>,
    /// Undo actions; empty means the task is not reversible
    pub rollback_actions: Vec<Action>,
    /// Lifecycle state
    pub status: TaskStatus,
    /// Owning team or person
    pub assigned_to: String,
    /// When the task was instantiated
    pub created_at: DateTime<Utc>,
    /// When forward execution started
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Append-only output log
    pub logs: Vec<String>,
    /// Append-only error log
    pub error_logs: Vec<String>,
    /// Engine and operator annotations
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RecoveryTask {
    /// Create a pending task with no actions
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, phase: Phase) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            phase,
            priority: Priority::default(),
            estimated_duration_minutes: 0,
            dependencies: Vec::new(),
            actions: Vec::new(),
            rollback_actions: Vec::new(),
            status: TaskStatus::Pending,
            assigned_to: String::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            logs: Vec::new(),
            error_logs: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// With priority tier
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// With estimated duration in minutes
    #[inline]
    #[must_use]
    pub fn with_estimate(mut self, minutes: u32) -> Self {
        self.estimated_duration_minutes = minutes;
        self
    }

    /// Add a dependency
    #[inline]
    #[must_use]
    pub fn depends_on(mut self, task_id: impl Into<String>) -> Self {
        self.dependencies.push(task_id.into());
        self
    }

    /// Append a forward action
    #[inline]
    #[must_use]
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Append a rollback action
    #[inline]
    #[must_use]
    pub fn with_rollback(mut self, action: Action) -> Self {
        self.rollback_actions.push(action);
        self
    }

    /// With assignee
    #[inline]
    #[must_use]
    pub fn assigned_to(mut self, assignee: impl Into<String>) -> Self {
        self.assigned_to = assignee.into();
        self
    }

    /// Fresh runtime copy of a template
    ///
    /// Keeps the declarative fields and resets every runtime field. The
    /// creation timestamp is taken from `created_at` so rollback ordering
    /// follows instantiation order.
    #[must_use]
    pub fn instantiate(&self, created_at: DateTime<Utc>) -> Self {
        Self {
            status: TaskStatus::Pending,
            created_at,
            started_at: None,
            completed_at: None,
            logs: Vec::new(),
            error_logs: Vec::new(),
            metadata: BTreeMap::new(),
            ..self.clone()
        }
    }

    /// Whether rollback actions exist
    #[inline]
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        !self.rollback_actions.is_empty()
    }

    /// Boolean metadata flag, `false` when absent
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.metadata
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Set a boolean metadata flag
    pub fn set_flag(&mut self, key: &str, value: bool) {
        self.metadata
            .insert(key.to_string(), serde_json::Value::Bool(value));
    }
}
