//! Read-only views handed to callers

use crate::instance::{RecoveryInstance, RecoveryStatus};
use chrono::{DateTime, Utc};
use roe_plan::{Phase, RecoveryTask, TaskStatus, META_ROLLBACK_FAILED, META_TIMED_OUT};
use serde::Serialize;

/// Per-task summary; log counts instead of log text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    /// Task id
    pub id: String,
    /// Task name
    pub name: String,
    /// Phase
    pub phase: Phase,
    /// Lifecycle state
    pub status: TaskStatus,
    /// Assignee
    pub assigned_to: String,
    /// Number of output log lines
    pub logs_count: usize,
    /// Number of error log lines
    pub error_logs_count: usize,
    /// Rollback was attempted and failed
    pub rollback_failed: bool,
    /// An action exceeded its deadline
    pub timed_out: bool,
}

impl From<&RecoveryTask> for TaskSummary {
    fn from(task: &RecoveryTask) -> Self {
        Self {
            id: task.id.clone(),
            name: task.name.clone(),
            phase: task.phase,
            status: task.status,
            assigned_to: task.assigned_to.clone(),
            logs_count: task.logs.len(),
            error_logs_count: task.error_logs.len(),
            rollback_failed: task.flag(META_ROLLBACK_FAILED),
            timed_out: task.flag(META_TIMED_OUT),
        }
    }
}

/// Point-in-time status of a recovery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoverySnapshot {
    /// Recovery id
    pub recovery_id: String,
    /// Triggering incident
    pub incident_id: String,
    /// System type of the plan
    pub system_type: String,
    /// Overall status
    pub status: RecoveryStatus,
    /// `completed / total * 100`, 0 for an empty plan
    pub progress_percentage: f64,
    /// Number of tasks
    pub total_tasks: usize,
    /// Tasks that completed
    pub completed_tasks: usize,
    /// Tasks that failed
    pub failed_tasks: usize,
    /// Tasks skipped on unmet dependencies
    pub skipped_tasks: usize,
    /// Phase currently (or last) executing
    pub current_phase: Option<Phase>,
    /// Start time
    pub started_at: Option<DateTime<Utc>>,
    /// Completion time
    pub completed_at: Option<DateTime<Utc>>,
    /// A store write was abandoned
    pub persistence_degraded: bool,
    /// Rollback ran and awaits an operator decision
    pub awaiting_operator: bool,
    /// Task summaries in creation order
    pub tasks: Vec<TaskSummary>,
}

impl From<&RecoveryInstance> for RecoverySnapshot {
    #[allow(clippy::cast_precision_loss)]
    fn from(instance: &RecoveryInstance) -> Self {
        let total = instance.tasks.len();
        let completed = instance.count(TaskStatus::Completed);
        let progress_percentage = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Self {
            recovery_id: instance.recovery_id.clone(),
            incident_id: instance.incident_id.clone(),
            system_type: instance.system_type.clone(),
            status: instance.status,
            progress_percentage,
            total_tasks: total,
            completed_tasks: completed,
            failed_tasks: instance.count(TaskStatus::Failed),
            skipped_tasks: instance.count(TaskStatus::Skipped),
            current_phase: instance.current_phase,
            started_at: instance.started_at,
            completed_at: instance.completed_at,
            persistence_degraded: instance.persistence_degraded,
            awaiting_operator: instance.awaiting_operator,
            tasks: instance.tasks.iter().map(TaskSummary::from).collect(),
        }
    }
}

impl RecoverySnapshot {
    /// Summary of one task
    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<&TaskSummary> {
        self.tasks.iter().find(|t| t.id == task_id)
    }
}

/// Engine-wide counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatistics {
    /// Recoveries initiated
    pub total_recoveries: usize,
    /// Recoveries that completed
    pub completed_recoveries: usize,
    /// Recoveries that failed
    pub failed_recoveries: usize,
    /// Recoveries still executing
    pub in_progress_recoveries: usize,
    /// `completed / total * 100`, 0 when nothing ran
    pub success_rate: f64,
    /// Number of registered plans
    pub available_plans: usize,
    /// Registered system types, sorted
    pub system_types: Vec<String>,
}
