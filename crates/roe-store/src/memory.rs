//! In-memory store, for tests and ephemeral deployments

use crate::error::StoreError;
use crate::traits::{TaskRecord, TaskStateStore};
use parking_lot::RwLock;
use roe_plan::TaskStatus;
use std::collections::HashMap;

/// Task state store backed by a map
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(String, String), TaskRecord>>,
}

impl MemoryStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn collect_sorted<F>(&self, keep: F) -> Vec<TaskRecord>
    where
        F: Fn(&TaskRecord) -> bool,
    {
        let mut out: Vec<TaskRecord> = self
            .records
            .read()
            .values()
            .filter(|r| keep(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.recovery_id.cmp(&b.recovery_id).then(a.seq.cmp(&b.seq)));
        out
    }
}

impl TaskStateStore for MemoryStore {
    fn upsert(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.records.write().insert(
            (record.recovery_id.clone(), record.task.id.clone()),
            record.clone(),
        );
        Ok(())
    }

    fn load(&self, recovery_id: &str, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .get(&(recovery_id.to_string(), task_id.to_string()))
            .cloned())
    }

    fn load_by_recovery(&self, recovery_id: &str) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.collect_sorted(|r| r.recovery_id == recovery_id))
    }

    fn load_by_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.collect_sorted(|r| r.task.status == status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roe_plan::{Phase, RecoveryTask};

    #[test]
    fn upsert_replaces_by_key() {
        let store = MemoryStore::new();
        let mut task = RecoveryTask::new("T1", "task", Phase::Assessment);
        store.upsert(&TaskRecord::new("R1", 0, task.clone())).unwrap();

        task.status = TaskStatus::Completed;
        store.upsert(&TaskRecord::new("R1", 0, task)).unwrap();

        assert_eq!(store.len(), 1);
        let loaded = store.load("R1", "T1").unwrap().unwrap();
        assert_eq!(loaded.task.status, TaskStatus::Completed);
    }

    #[test]
    fn loads_are_in_creation_order() {
        let store = MemoryStore::new();
        for (seq, id) in [(2, "C"), (0, "A"), (1, "B")] {
            let task = RecoveryTask::new(id, id, Phase::Recovery);
            store.upsert(&TaskRecord::new("R1", seq, task)).unwrap();
        }
        let ids: Vec<_> = store
            .load_by_recovery("R1")
            .unwrap()
            .into_iter()
            .map(|r| r.task.id)
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(store.load_by_status(TaskStatus::Pending).unwrap().len(), 3);
        assert!(store.load_by_recovery("R2").unwrap().is_empty());
    }
}
