//! Task lifecycle rules and the dependency gate

use crate::error::IllegalTransition;
use indexmap::IndexMap;
use roe_plan::{RecoveryTask, TaskStatus};

/// Validates a forward state transition
///
/// # Errors
/// `IllegalTransition` when `to` is not reachable from `from`
pub fn validate_transition(from: TaskStatus, to: TaskStatus) -> Result<(), IllegalTransition> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(IllegalTransition { from, to })
    }
}

/// Forward transitions out of `from`
#[must_use]
pub fn allowed_transitions(from: TaskStatus) -> Vec<TaskStatus> {
    use TaskStatus::*;
    match from {
        Pending => vec![InProgress, Skipped],
        InProgress => vec![Completed, Failed],
        Completed | Failed | Skipped => vec![],
    }
}

/// The one backward move: a successfully rolled-back task returns to `Pending`
///
/// # Errors
/// `IllegalTransition` unless the task is `Completed`
pub fn validate_rollback_reset(from: TaskStatus) -> Result<(), IllegalTransition> {
    if from == TaskStatus::Completed {
        Ok(())
    } else {
        Err(IllegalTransition {
            from,
            to: TaskStatus::Pending,
        })
    }
}

/// Result of evaluating a task's dependencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// Every dependency is `Completed`
    Ready,
    /// Some dependency has not finished yet
    Waiting,
    /// A dependency can never complete
    Unsatisfiable {
        /// The blocking dependency
        dependency: String,
        /// Its status, `None` if it is not part of the instance
        status: Option<TaskStatus>,
    },
}

/// Evaluate the dependency gate of `task` against the instance status map
#[must_use]
pub fn gate(task: &RecoveryTask, statuses: &IndexMap<String, TaskStatus>) -> Gate {
    let mut waiting = false;
    for dep in &task.dependencies {
        match statuses.get(dep) {
            Some(TaskStatus::Completed) => {}
            Some(s @ (TaskStatus::Failed | TaskStatus::Skipped)) => {
                return Gate::Unsatisfiable {
                    dependency: dep.clone(),
                    status: Some(*s),
                }
            }
            Some(_) => waiting = true,
            None => {
                return Gate::Unsatisfiable {
                    dependency: dep.clone(),
                    status: None,
                }
            }
        }
    }
    if waiting {
        Gate::Waiting
    } else {
        Gate::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roe_plan::Phase;

    #[test]
    fn terminal_states_have_no_exits() {
        for s in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Skipped] {
            assert!(allowed_transitions(s).is_empty());
        }
        assert!(validate_transition(TaskStatus::Pending, TaskStatus::Completed).is_err());
        assert!(validate_transition(TaskStatus::InProgress, TaskStatus::Skipped).is_err());
    }

    #[test]
    fn only_completed_tasks_reset() {
        assert!(validate_rollback_reset(TaskStatus::Completed).is_ok());
        assert!(validate_rollback_reset(TaskStatus::Failed).is_err());
    }

    #[test]
    fn gate_waits_then_opens() {
        let task = RecoveryTask::new("B", "b", Phase::Containment).depends_on("A");
        let mut statuses = IndexMap::new();
        statuses.insert("A".to_string(), TaskStatus::InProgress);
        assert_eq!(gate(&task, &statuses), Gate::Waiting);

        statuses.insert("A".to_string(), TaskStatus::Completed);
        assert_eq!(gate(&task, &statuses), Gate::Ready);

        statuses.insert("A".to_string(), TaskStatus::Skipped);
        assert!(matches!(gate(&task, &statuses), Gate::Unsatisfiable { .. }));
    }

    #[test]
    fn missing_dependency_is_unsatisfiable() {
        let task = RecoveryTask::new("B", "b", Phase::Containment).depends_on("ghost");
        assert_eq!(
            gate(&task, &IndexMap::new()),
            Gate::Unsatisfiable {
                dependency: "ghost".into(),
                status: None
            }
        );
    }
}
