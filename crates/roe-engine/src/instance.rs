//! One execution of a plan against one incident

use crate::error::IllegalTransition;
use crate::state_machine;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use roe_plan::{Phase, RecoveryTask, SystemRecoveryPlan, TaskStatus};
use roe_store::TaskRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall status of a recovery instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    /// Created, not started
    Pending,
    /// Phases are executing
    InProgress,
    /// Every phase ran and no task failed
    Completed,
    /// Every phase ran and at least one task failed, or execution was interrupted
    Failed,
}

impl RecoveryStatus {
    /// Whether the instance has finished executing
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RecoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Runtime state of one recovery
///
/// Owned by the engine. Only the supervisor (or a rollback holding the
/// recovery's lease) mutates it.
#[derive(Debug, Clone)]
pub struct RecoveryInstance {
    /// Recovery id
    pub recovery_id: String,
    /// Incident that triggered the recovery
    pub incident_id: String,
    /// System type the plan was resolved for
    pub system_type: String,
    /// Id of the plan template
    pub plan_id: String,
    /// Overall status
    pub status: RecoveryStatus,
    /// When execution started
    pub started_at: Option<DateTime<Utc>>,
    /// When the instance reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    /// Phase currently (or last) executing
    pub current_phase: Option<Phase>,
    /// Task instances in creation order
    pub tasks: Vec<RecoveryTask>,
    /// Task id to status; kept in sync with `tasks`
    pub task_status: IndexMap<String, TaskStatus>,
    /// A store write was given up on; durable state may be stale
    pub persistence_degraded: bool,
    /// Rollback ran; an operator must decide how to continue
    pub awaiting_operator: bool,
}

impl RecoveryInstance {
    /// Deep-copy the plan's task templates into a fresh pending instance
    #[must_use]
    pub fn instantiate(
        recovery_id: impl Into<String>,
        incident_id: impl Into<String>,
        system_type: impl Into<String>,
        plan: &SystemRecoveryPlan,
        now: DateTime<Utc>,
    ) -> Self {
        let tasks: Vec<RecoveryTask> = plan.tasks.iter().map(|t| t.instantiate(now)).collect();
        let task_status = tasks.iter().map(|t| (t.id.clone(), t.status)).collect();
        Self {
            recovery_id: recovery_id.into(),
            incident_id: incident_id.into(),
            system_type: system_type.into(),
            plan_id: plan.id.clone(),
            status: RecoveryStatus::Pending,
            started_at: None,
            completed_at: None,
            current_phase: None,
            tasks,
            task_status,
            persistence_degraded: false,
            awaiting_operator: false,
        }
    }

    /// Position of a task in creation order
    #[must_use]
    pub fn position(&self, task_id: &str) -> Option<usize> {
        self.task_status.get_index_of(task_id)
    }

    /// Task by id
    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<&RecoveryTask> {
        self.position(task_id).map(|i| &self.tasks[i])
    }

    /// Ids of the tasks in `phase`, in dispatch order
    ///
    /// Lower priority value first; ties keep creation order.
    #[must_use]
    pub fn phase_members(&self, phase: Phase) -> Vec<String> {
        let mut members: Vec<&RecoveryTask> =
            self.tasks.iter().filter(|t| t.phase == phase).collect();
        members.sort_by_key(|t| t.priority.value());
        members.into_iter().map(|t| t.id.clone()).collect()
    }

    /// Replace a task with its new state after checking the transition
    ///
    /// # Errors
    /// `IllegalTransition` if the status change is not a forward lifecycle
    /// move. The instance is left untouched.
    pub fn commit(&mut self, task: RecoveryTask) -> Result<TaskRecord, IllegalTransition> {
        let Some(index) = self.position(&task.id) else {
            return Err(IllegalTransition {
                from: task.status,
                to: task.status,
            });
        };
        let from = self.tasks[index].status;
        if from != task.status {
            state_machine::validate_transition(from, task.status)?;
        }
        Ok(self.replace(index, task))
    }

    /// Replace a task after a successful rollback reset
    ///
    /// # Errors
    /// `IllegalTransition` unless the stored task is `Completed`
    pub fn commit_rollback(&mut self, task: RecoveryTask) -> Result<TaskRecord, IllegalTransition> {
        let Some(index) = self.position(&task.id) else {
            return Err(IllegalTransition {
                from: task.status,
                to: task.status,
            });
        };
        let from = self.tasks[index].status;
        if task.status == TaskStatus::Pending {
            state_machine::validate_rollback_reset(from)?;
        } else if from != task.status {
            return Err(IllegalTransition {
                from,
                to: task.status,
            });
        }
        Ok(self.replace(index, task))
    }

    fn replace(&mut self, index: usize, task: RecoveryTask) -> TaskRecord {
        self.task_status.insert(task.id.clone(), task.status);
        self.tasks[index] = task;
        self.record(index)
    }

    /// Durable record of the task at `index`
    #[must_use]
    pub fn record(&self, index: usize) -> TaskRecord {
        TaskRecord::new(
            self.recovery_id.clone(),
            u32::try_from(index).unwrap_or(u32::MAX),
            self.tasks[index].clone(),
        )
    }

    /// Durable records of every task
    #[must_use]
    pub fn records(&self) -> Vec<TaskRecord> {
        (0..self.tasks.len()).map(|i| self.record(i)).collect()
    }

    /// Number of tasks in `status`
    #[must_use]
    pub fn count(&self, status: TaskStatus) -> usize {
        self.task_status.values().filter(|s| **s == status).count()
    }

    /// Whether any task ended `Failed`
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.count(TaskStatus::Failed) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roe_plan::{Criticality, Priority};

    fn plan() -> SystemRecoveryPlan {
        SystemRecoveryPlan::new("P", "sys", Criticality::High)
            .with_task(RecoveryTask::new("low", "l", Phase::Recovery).with_priority(Priority::Low))
            .with_task(RecoveryTask::new("first", "f", Phase::Recovery))
            .with_task(RecoveryTask::new("urgent", "u", Phase::Recovery).with_priority(Priority::Immediate))
            .with_task(RecoveryTask::new("second", "s", Phase::Recovery))
            .with_task(RecoveryTask::new("assess", "a", Phase::Assessment))
    }

    #[test]
    fn members_sorted_by_priority_then_creation() {
        let instance = RecoveryInstance::instantiate("R", "I", "sys", &plan(), Utc::now());
        assert_eq!(
            instance.phase_members(Phase::Recovery),
            vec!["urgent", "first", "second", "low"]
        );
        assert_eq!(instance.phase_members(Phase::Assessment), vec!["assess"]);
        assert!(instance.phase_members(Phase::PostIncident).is_empty());
    }

    #[test]
    fn commit_rejects_backward_moves() {
        let mut instance = RecoveryInstance::instantiate("R", "I", "sys", &plan(), Utc::now());
        let mut task = instance.task("first").cloned().unwrap();

        task.status = TaskStatus::Completed;
        assert!(instance.commit(task.clone()).is_err());

        task.status = TaskStatus::InProgress;
        let record = instance.commit(task.clone()).unwrap();
        assert_eq!(record.seq, 1);
        assert_eq!(instance.task_status["first"], TaskStatus::InProgress);

        task.status = TaskStatus::Pending;
        assert!(instance.commit(task).is_err());
        assert_eq!(instance.task("first").unwrap().status, TaskStatus::InProgress);
    }

    #[test]
    fn instances_do_not_share_state() {
        let plan = plan();
        let mut a = RecoveryInstance::instantiate("A", "I", "sys", &plan, Utc::now());
        let b = RecoveryInstance::instantiate("B", "I", "sys", &plan, Utc::now());
        a.tasks[0].logs.push("only in a".into());
        assert!(b.tasks[0].logs.is_empty());
        assert!(plan.tasks[0].logs.is_empty());
    }
}
