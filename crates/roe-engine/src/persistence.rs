//! Write-through to the task state store with bounded retries

use crate::telemetry;
use roe_store::{StoreError, TaskRecord, TaskStateStore};
use std::sync::Arc;
use std::time::Duration;

/// Retrying writer in front of a [`TaskStateStore`]
///
/// Store calls are blocking, so every attempt runs on the blocking pool.
#[derive(Clone)]
pub(crate) struct Persister {
    store: Arc<dyn TaskStateStore>,
    retry_attempts: u32,
    backoff: Duration,
}

impl Persister {
    pub(crate) fn new(store: Arc<dyn TaskStateStore>, retry_attempts: u32, backoff: Duration) -> Self {
        Self {
            store,
            retry_attempts,
            backoff,
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn TaskStateStore> {
        &self.store
    }

    /// Upsert `record`, retrying retryable failures with exponential backoff
    ///
    /// Returns `false` once retries are exhausted or the error is permanent;
    /// the caller then degrades the instance.
    pub(crate) async fn write(&self, record: TaskRecord) -> bool {
        let mut attempt = 0u32;
        loop {
            let store = Arc::clone(&self.store);
            let rec = record.clone();
            let result = tokio::task::spawn_blocking(move || store.upsert(&rec))
                .await
                .unwrap_or_else(|e| Err(StoreError::Unavailable(format!("store task aborted: {e}"))));

            match result {
                Ok(()) => return true,
                Err(e) if e.is_retryable() && attempt < self.retry_attempts => {
                    let delay = self.backoff.saturating_mul(2u32.saturating_pow(attempt));
                    tracing::debug!(
                        recovery_id = %record.recovery_id,
                        task_id = %record.task.id,
                        attempt = attempt + 1,
                        error = %e,
                        "store write failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(
                        recovery_id = %record.recovery_id,
                        task_id = %record.task.id,
                        attempts = attempt + 1,
                        error = %e,
                        "store write abandoned, continuing with in-memory state"
                    );
                    telemetry::persistence_failure();
                    return false;
                }
            }
        }
    }

    /// Write several records, `false` if any write was abandoned
    pub(crate) async fn write_all(&self, records: Vec<TaskRecord>) -> bool {
        let mut ok = true;
        for record in records {
            ok &= self.write(record).await;
        }
        ok
    }
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister")
            .field("retry_attempts", &self.retry_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
