//! Task completion and failure hooks
//!
//! Callbacks run on the worker that produced the result. Tasks cancelled by
//! a shutdown or a mid-run rollback report their failure from the recovery's
//! supervisor instead. A callback that returns an error or panics is logged
//! and otherwise ignored.

use parking_lot::RwLock;
use roe_plan::{RecoveryTask, TaskStatus};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// A task reached `Completed` or `Failed`
#[derive(Debug, Clone)]
pub struct TaskEvent {
    /// Owning recovery
    pub recovery_id: String,
    /// Triggering incident
    pub incident_id: String,
    /// System type of the plan
    pub system_type: String,
    /// Task in its final state
    pub task: RecoveryTask,
}

impl TaskEvent {
    /// Whether the task failed
    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.task.status == TaskStatus::Failed
    }
}

/// Observer hook
pub type TaskCallback = Arc<dyn Fn(&TaskEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
pub(crate) struct Callbacks {
    completed: RwLock<Vec<TaskCallback>>,
    failed: RwLock<Vec<TaskCallback>>,
}

impl Callbacks {
    pub(crate) fn on_completed(&self, callback: TaskCallback) {
        self.completed.write().push(callback);
    }

    pub(crate) fn on_failed(&self, callback: TaskCallback) {
        self.failed.write().push(callback);
    }

    /// Invoke the hooks matching the event's task status
    pub(crate) fn dispatch(&self, event: &TaskEvent) {
        let hooks = match event.task.status {
            TaskStatus::Completed => self.completed.read().clone(),
            TaskStatus::Failed => self.failed.read().clone(),
            _ => return,
        };
        for hook in hooks {
            match catch_unwind(AssertUnwindSafe(|| hook(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(
                    recovery_id = %event.recovery_id,
                    task_id = %event.task.id,
                    error = %e,
                    "task callback returned an error"
                ),
                Err(panic) => tracing::error!(
                    recovery_id = %event.recovery_id,
                    task_id = %event.task.id,
                    panic = %panic_message(panic.as_ref()),
                    "task callback panicked"
                ),
            }
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("completed", &self.completed.read().len())
            .field("failed", &self.failed.read().len())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
