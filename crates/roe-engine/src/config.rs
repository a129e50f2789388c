//! Engine configuration

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Recovery engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker pool size shared by every recovery of the engine
    pub max_concurrent_tasks: usize,
    /// Wall-clock deadline of a single action, in milliseconds
    pub action_timeout_ms: u64,
    /// Retries of a failed store write before the instance is degraded
    pub persist_retry_attempts: u32,
    /// Base of the exponential backoff between store retries, in milliseconds
    pub persist_backoff_ms: u64,
    /// Roll back automatically when a recovery finishes `Failed`
    pub auto_rollback: bool,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With worker pool size
    #[inline]
    #[must_use]
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    /// With per-action deadline
    #[inline]
    #[must_use]
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With store retry policy
    #[inline]
    #[must_use]
    pub fn with_persist_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.persist_retry_attempts = attempts;
        self.persist_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With automatic rollback of failed recoveries
    #[inline]
    #[must_use]
    pub fn with_auto_rollback(mut self, enabled: bool) -> Self {
        self.auto_rollback = enabled;
        self
    }

    /// Per-action deadline
    #[inline]
    #[must_use]
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    /// Base backoff between store retries
    #[inline]
    #[must_use]
    pub fn persist_backoff(&self) -> Duration {
        Duration::from_millis(self.persist_backoff_ms)
    }

    /// Reject settings the engine cannot run with
    ///
    /// # Errors
    /// `EngineError::InvalidConfig` for a zero pool size or a zero timeout
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_concurrent_tasks == 0 {
            return Err(EngineError::InvalidConfig(
                "max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        if self.action_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "action_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 5,
            action_timeout_ms: 3_600_000,
            persist_retry_attempts: 3,
            persist_backoff_ms: 50,
            auto_rollback: false,
        }
    }
}
