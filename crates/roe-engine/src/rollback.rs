//! Reverse-order undo of completed tasks
//!
//! Rollback walks `Completed` tasks from the most recently created to the
//! oldest, one at a time. A failing task never stops the rollback of the
//! others. A rolled-back task returns to `Pending`; re-running it assumes its
//! forward actions are idempotent.

use crate::callbacks::panic_message;
use crate::engine::{EngineInner, RecoveryEntry};
use crate::telemetry;
use chrono::{SecondsFormat, Utc};
use futures::FutureExt;
use roe_plan::{RecoveryTask, TaskStatus, META_ROLLBACK_FAILED, META_ROLLED_BACK_AT};
use roe_runner::{execute_sequence, SequenceKind};
use serde::Serialize;
use std::panic::AssertUnwindSafe;

/// What happened to one task during rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// Rollback actions succeeded; the task is `Pending` again
    RolledBack,
    /// The task has no rollback actions and stays `Completed`
    NotReversible,
    /// A rollback action failed; the task stays `Completed` and is flagged
    Failed {
        /// Last error line
        error: String,
    },
}

/// Rollback result of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRollbackResult {
    /// Task id
    pub task_id: String,
    /// Outcome
    #[serde(flatten)]
    pub outcome: RollbackOutcome,
}

/// Aggregate rollback result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    /// Recovery that was rolled back
    pub recovery_id: String,
    /// Every attempted rollback succeeded
    pub success: bool,
    /// Per-task results in the order they were processed
    pub results: Vec<TaskRollbackResult>,
}

impl RollbackReport {
    /// Results of tasks whose rollback failed
    pub fn failures(&self) -> impl Iterator<Item = &TaskRollbackResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, RollbackOutcome::Failed { .. }))
    }

    /// Task ids in processing order
    #[must_use]
    pub fn order(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.task_id.as_str()).collect()
    }
}

/// Roll back `entry`; the caller holds its lease
pub(crate) async fn roll_back(inner: &EngineInner, entry: &RecoveryEntry) -> RollbackReport {
    let (recovery_id, mut completed): (String, Vec<(usize, RecoveryTask)>) = {
        let instance = entry.instance.read();
        let tasks = instance
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.status == TaskStatus::Completed)
            .map(|(i, t)| (i, t.clone()))
            .collect();
        (instance.recovery_id.clone(), tasks)
    };
    // Most recently created first
    completed.sort_by(|a, b| b.0.cmp(&a.0));
    tracing::info!(recovery_id = %recovery_id, tasks = completed.len(), "rollback started");

    let timeout = inner.config.action_timeout();
    let mut results = Vec::with_capacity(completed.len());

    for (_, mut task) in completed {
        if !task.is_reversible() {
            tracing::debug!(recovery_id = %recovery_id, task_id = %task.id, "task not reversible");
            telemetry::rollback("not_reversible");
            results.push(TaskRollbackResult {
                task_id: task.id,
                outcome: RollbackOutcome::NotReversible,
            });
            continue;
        }

        let outcome = AssertUnwindSafe(execute_sequence(
            inner.runner.as_ref(),
            &task.rollback_actions,
            timeout,
            SequenceKind::Rollback,
        ))
        .catch_unwind()
        .await;

        let (success, logs, mut error_logs) = match outcome {
            Ok(o) => (o.success(), o.logs, o.error_logs),
            Err(panic) => (
                false,
                Vec::new(),
                vec![format!("Rollback runner panicked: {}", panic_message(panic.as_ref()))],
            ),
        };
        let last_error = error_logs
            .last()
            .cloned()
            .unwrap_or_else(|| "rollback failed".to_string());
        task.logs.extend(logs);
        task.error_logs.append(&mut error_logs);

        let outcome = if success {
            task.status = TaskStatus::Pending;
            task.started_at = None;
            task.completed_at = None;
            task.metadata.remove(META_ROLLBACK_FAILED);
            task.metadata.insert(
                META_ROLLED_BACK_AT.to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
            tracing::info!(recovery_id = %recovery_id, task_id = %task.id, "task rolled back");
            telemetry::rollback("rolled_back");
            RollbackOutcome::RolledBack
        } else {
            task.set_flag(META_ROLLBACK_FAILED, true);
            tracing::warn!(recovery_id = %recovery_id, task_id = %task.id, error = %last_error, "task rollback failed");
            telemetry::rollback("failed");
            RollbackOutcome::Failed { error: last_error }
        };

        let task_id = task.id.clone();
        if let Err(e) = entry.commit_rollback(&inner.persister, task).await {
            tracing::error!(recovery_id = %recovery_id, task_id = %task_id, error = %e, "rejected rollback update");
        }
        results.push(TaskRollbackResult { task_id, outcome });
    }

    entry.instance.write().awaiting_operator = true;
    let success = results
        .iter()
        .all(|r| !matches!(r.outcome, RollbackOutcome::Failed { .. }));
    tracing::info!(recovery_id = %recovery_id, success, "rollback finished, awaiting operator");

    RollbackReport {
        recovery_id,
        success,
        results,
    }
}
