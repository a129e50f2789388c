//! Error types for the recovery engine
//!
//! Only caller errors surface here. Task-local failures (action errors,
//! timeouts, unmet dependencies, rollback failures) are recorded on the task
//! and never returned from engine calls.

use roe_plan::TaskStatus;
use roe_store::StoreError;

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No plan is registered for the requested system type
    #[error("unknown system type: {0}")]
    UnknownSystemType(String),

    /// No recovery with this id exists
    #[error("recovery not found: {0}")]
    RecoveryNotFound(String),

    /// Waiting for completion exceeded its deadline
    #[error("recovery {recovery_id} did not finish within {timeout_ms}ms")]
    WaitTimeout {
        /// Recovery that was awaited
        recovery_id: String,
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// The engine is shutting down
    #[error("engine is shutting down")]
    ShuttingDown,

    /// Configuration error
    #[error("configuration error: {0}")]
    InvalidConfig(String),

    /// Reading from the task state store failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Check if the error was caused by the caller's input
    #[inline]
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownSystemType(_) | Self::RecoveryNotFound(_) | Self::InvalidConfig(_)
        )
    }

    /// Check if retrying the call later may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::WaitTimeout { .. } => true,
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// A task status change the lifecycle does not allow
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {from} -> {to}")]
pub struct IllegalTransition {
    /// Current status
    pub from: TaskStatus,
    /// Requested status
    pub to: TaskStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_errors_are_classified() {
        assert!(EngineError::UnknownSystemType("x".into()).is_caller_error());
        assert!(EngineError::RecoveryNotFound("x".into()).is_caller_error());
        let timeout = EngineError::WaitTimeout {
            recovery_id: "x".into(),
            timeout_ms: 10,
        };
        assert!(!timeout.is_caller_error());
        assert!(timeout.is_retryable());
        assert!(!EngineError::ShuttingDown.is_retryable());
    }
}
