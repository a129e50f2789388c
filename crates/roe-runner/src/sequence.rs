//! Ordered, fail-fast execution of an action sequence
//!
//! Every action gets its own wall-clock deadline. A timed-out action is
//! cancelled (its future is dropped) and recorded with the
//! [`ACTION_TIMEOUT_MARKER`] so operators can tell it apart from an action
//! that ran and failed.

use crate::runner::ActionRunner;
use roe_plan::Action;
use std::time::Duration;

/// Prefix of the error log line written for a timed-out action
pub const ACTION_TIMEOUT_MARKER: &str = "[ActionTimeout]";

/// Which action list of a task is being run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    /// The task's forward actions
    Forward,
    /// The task's rollback actions
    Rollback,
}

/// Why a sequence stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionFailure {
    /// The action ran and reported failure
    Failed {
        /// Position in the sequence
        index: usize,
        /// Exit code or HTTP status, if any
        exit_code: Option<i32>,
    },
    /// The action exceeded its deadline and was cancelled
    TimedOut {
        /// Position in the sequence
        index: usize,
        /// Deadline that was exceeded
        after: Duration,
    },
    /// The runner could not execute the action
    Error {
        /// Position in the sequence
        index: usize,
        /// Runner error text
        message: String,
    },
}

impl ActionFailure {
    /// Whether the failure was a deadline overrun
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Index of the failing action
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Failed { index, .. } | Self::TimedOut { index, .. } | Self::Error { index, .. } => {
                *index
            }
        }
    }
}

/// Outcome of running an action sequence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceOutcome {
    /// Output log lines, in order
    pub logs: Vec<String>,
    /// Error log lines, in order
    pub error_logs: Vec<String>,
    /// Number of actions that were started
    pub actions_run: usize,
    /// First failure, `None` if every action succeeded
    pub failure: Option<ActionFailure>,
}

impl SequenceOutcome {
    /// Whether every action succeeded
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    /// Whether the sequence stopped on a timeout
    #[inline]
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.failure.as_ref().is_some_and(ActionFailure::is_timeout)
    }
}

/// Run `actions` in order, stopping at the first unsuccessful one
///
/// An empty sequence succeeds trivially.
pub async fn execute_sequence(
    runner: &dyn ActionRunner,
    actions: &[Action],
    timeout: Duration,
    kind: SequenceKind,
) -> SequenceOutcome {
    let mut outcome = SequenceOutcome::default();

    for (index, action) in actions.iter().enumerate() {
        outcome.actions_run += 1;
        let result = tokio::time::timeout(timeout, runner.run(action)).await;

        let failure = match result {
            Err(_) => {
                let ms = timeout.as_millis();
                outcome.error_logs.push(format!(
                    "{ACTION_TIMEOUT_MARKER} action `{action}` exceeded {ms}ms and was cancelled"
                ));
                Some(ActionFailure::TimedOut {
                    index,
                    after: timeout,
                })
            }
            Ok(Err(e)) => {
                outcome.error_logs.push(match kind {
                    SequenceKind::Forward => format!("Command execution error: {e}"),
                    SequenceKind::Rollback => format!("Rollback command error: {e}"),
                });
                Some(ActionFailure::Error {
                    index,
                    message: e.to_string(),
                })
            }
            Ok(Ok(output)) => {
                if !output.stdout.is_empty() {
                    outcome.logs.push(format!("STDOUT: {}", output.stdout));
                }
                if !output.stderr.is_empty() {
                    outcome.error_logs.push(format!("STDERR: {}", output.stderr));
                }
                if output.success {
                    outcome.logs.push(match kind {
                        SequenceKind::Forward => "Command completed successfully".to_string(),
                        SequenceKind::Rollback => format!("Rollback command completed: {action}"),
                    });
                    None
                } else {
                    outcome.error_logs.push(match (kind, output.exit_code) {
                        (SequenceKind::Forward, Some(code)) => {
                            format!("Command failed with exit code {code}")
                        }
                        (SequenceKind::Forward, None) => "Command failed".to_string(),
                        (SequenceKind::Rollback, _) => format!("Rollback command failed: {action}"),
                    });
                    Some(ActionFailure::Failed {
                        index,
                        exit_code: output.exit_code,
                    })
                }
            }
        };

        if let Some(failure) = failure {
            tracing::debug!(%action, index, ?failure, "action sequence stopped");
            outcome.failure = Some(failure);
            break;
        }
    }

    outcome
}
