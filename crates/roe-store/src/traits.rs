//! Store contract and the record it persists
//!
//! Backends are synchronous; callers that must not block run them on a
//! blocking pool.

use crate::error::StoreError;
use roe_plan::{RecoveryTask, TaskStatus};
use serde::{Deserialize, Serialize};

/// One durable record per task instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Owning recovery instance
    pub recovery_id: String,
    /// Creation order of the task within its recovery
    pub seq: u32,
    /// Full task state
    pub task: RecoveryTask,
}

impl TaskRecord {
    /// Build a record
    #[inline]
    #[must_use]
    pub fn new(recovery_id: impl Into<String>, seq: u32, task: RecoveryTask) -> Self {
        Self {
            recovery_id: recovery_id.into(),
            seq,
            task,
        }
    }
}

/// Durable source of truth for task lifecycle state
///
/// Writes are idempotent last-writer-wins upserts keyed by
/// `(recovery_id, task.id)`. Loads return records in creation order.
pub trait TaskStateStore: Send + Sync {
    /// Insert or replace a record
    fn upsert(&self, record: &TaskRecord) -> Result<(), StoreError>;

    /// Fetch one record
    fn load(&self, recovery_id: &str, task_id: &str) -> Result<Option<TaskRecord>, StoreError>;

    /// All records of one recovery, in creation order
    fn load_by_recovery(&self, recovery_id: &str) -> Result<Vec<TaskRecord>, StoreError>;

    /// All records currently in `status`, across recoveries
    fn load_by_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>, StoreError>;
}
