//! Executes one task's forward actions off the supervisor

use crate::callbacks::{panic_message, TaskEvent};
use crate::engine::EngineInner;
use chrono::Utc;
use futures::FutureExt;
use roe_plan::{RecoveryTask, TaskStatus, META_TIMED_OUT};
use roe_runner::{execute_sequence, SequenceKind, SequenceOutcome};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit};

/// Identity of the recovery a worker reports to
#[derive(Debug, Clone)]
pub(crate) struct WorkerContext {
    pub(crate) recovery_id: String,
    pub(crate) incident_id: String,
    pub(crate) system_type: String,
}

impl WorkerContext {
    /// Hook event for `task` in its final state
    pub(crate) fn event(&self, task: RecoveryTask) -> TaskEvent {
        TaskEvent {
            recovery_id: self.recovery_id.clone(),
            incident_id: self.incident_id.clone(),
            system_type: self.system_type.clone(),
            task,
        }
    }
}

/// Run `task` (already `InProgress`), fire hooks, report back
///
/// The pool permit is held only while actions execute.
pub(crate) async fn run(
    inner: Arc<EngineInner>,
    ctx: WorkerContext,
    mut task: RecoveryTask,
    permit: OwnedSemaphorePermit,
    results: mpsc::UnboundedSender<RecoveryTask>,
) {
    let timeout = inner.config.action_timeout();
    let outcome = AssertUnwindSafe(execute_sequence(
        inner.runner.as_ref(),
        &task.actions,
        timeout,
        SequenceKind::Forward,
    ))
    .catch_unwind()
    .await;
    drop(permit);

    apply_outcome(&mut task, outcome);
    if task.status == TaskStatus::Completed {
        tracing::info!(recovery_id = %ctx.recovery_id, task_id = %task.id, "task completed");
    } else {
        tracing::warn!(
            recovery_id = %ctx.recovery_id,
            task_id = %task.id,
            timed_out = task.flag(META_TIMED_OUT),
            errors = task.error_logs.len(),
            "task failed"
        );
    }

    let event = ctx.event(task);
    inner.callbacks.dispatch(&event);

    // Closed only when the supervisor was cancelled
    let _ = results.send(event.task);
}

/// Fold a sequence result into the task
pub(crate) fn apply_outcome(
    task: &mut RecoveryTask,
    outcome: Result<SequenceOutcome, Box<dyn Any + Send>>,
) {
    match outcome {
        Ok(outcome) => {
            let success = outcome.success();
            if outcome.timed_out() {
                task.set_flag(META_TIMED_OUT, true);
            }
            task.logs.extend(outcome.logs);
            task.error_logs.extend(outcome.error_logs);
            task.status = if success {
                TaskStatus::Completed
            } else {
                TaskStatus::Failed
            };
        }
        Err(panic) => {
            task.error_logs.push(format!(
                "Action runner panicked: {}",
                panic_message(panic.as_ref())
            ));
            task.status = TaskStatus::Failed;
        }
    }
    task.completed_at = Some(Utc::now());
}
