//! The recovery engine handle
//!
//! An [`Engine`] owns every recovery instance it started. It is cheap to
//! clone; all clones share the same state.

use crate::callbacks::{Callbacks, TaskCallback, TaskEvent};
use crate::config::EngineConfig;
use crate::error::{EngineError, IllegalTransition};
use crate::instance::{RecoveryInstance, RecoveryStatus};
use crate::persistence::Persister;
use crate::rollback::{self, RollbackReport};
use crate::status::{EngineStatistics, RecoverySnapshot};
use crate::supervisor::{self, RollbackRequest};
use crate::telemetry;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use roe_plan::{PlanRegistry, RecoveryTask, TaskStatus};
use roe_runner::ActionRunner;
use roe_store::{TaskRecord, TaskStateStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio::task::JoinHandle;
use ulid::Ulid;

/// Shared engine state
pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) registry: PlanRegistry,
    pub(crate) runner: Arc<dyn ActionRunner>,
    pub(crate) persister: Persister,
    pub(crate) callbacks: Callbacks,
    /// Worker pool shared by all recoveries
    pub(crate) pool: Arc<Semaphore>,
    pub(crate) recoveries: DashMap<String, Arc<RecoveryEntry>>,
    /// Recovery ids in initiation order
    order: Mutex<Vec<String>>,
    pub(crate) shutdown: watch::Sender<bool>,
}

/// One tracked recovery
pub(crate) struct RecoveryEntry {
    pub(crate) instance: RwLock<RecoveryInstance>,
    /// Held by whoever mutates the instance: the supervisor while it runs,
    /// a caller's rollback afterwards
    pub(crate) lease: tokio::sync::Mutex<()>,
    /// Published once the instance reaches a terminal status
    pub(crate) status_tx: watch::Sender<RecoveryStatus>,
    /// Rollback requests for the supervisor while phases run
    rollback_tx: mpsc::UnboundedSender<RollbackRequest>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl RecoveryEntry {
    pub(crate) fn snapshot(&self) -> RecoverySnapshot {
        RecoverySnapshot::from(&*self.instance.read())
    }

    /// Apply a forward transition and write it through
    pub(crate) async fn commit(
        &self,
        persister: &Persister,
        task: RecoveryTask,
    ) -> Result<(), IllegalTransition> {
        let record = self.instance.write().commit(task)?;
        self.persist(persister, record).await;
        Ok(())
    }

    /// Apply a rollback result and write it through
    pub(crate) async fn commit_rollback(
        &self,
        persister: &Persister,
        task: RecoveryTask,
    ) -> Result<(), IllegalTransition> {
        let record = self.instance.write().commit_rollback(task)?;
        self.persist(persister, record).await;
        Ok(())
    }

    pub(crate) async fn persist(&self, persister: &Persister, record: TaskRecord) {
        if !persister.write(record).await {
            self.mark_degraded();
        }
    }

    pub(crate) fn mark_degraded(&self) {
        let mut instance = self.instance.write();
        if !instance.persistence_degraded {
            tracing::warn!(recovery_id = %instance.recovery_id, "persistence degraded");
        }
        instance.persistence_degraded = true;
    }
}

/// Recovery orchestration engine
///
/// # Example
///
/// ```no_run
/// use roe_engine::{Engine, EngineConfig};
/// use roe_plan::PlanRegistry;
/// use roe_runner::DispatchRunner;
/// use roe_store::MemoryStore;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn run() -> Result<(), roe_engine::EngineError> {
/// let engine = Engine::new(
///     EngineConfig::default(),
///     PlanRegistry::with_builtin_plans(),
///     Arc::new(DispatchRunner::new()),
///     Arc::new(MemoryStore::new()),
/// )?;
///
/// let id = engine.initiate_recovery("INC-42", "database").await?;
/// let status = engine.wait_for_completion(&id, Duration::from_secs(600)).await?;
/// println!("{} finished {}", id, status.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("recoveries", &self.inner.recoveries.len())
            .field("callbacks", &self.inner.callbacks)
            .field("persister", &self.inner.persister)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine
    ///
    /// # Errors
    /// `EngineError::InvalidConfig` if `config` does not validate
    pub fn new(
        config: EngineConfig,
        registry: PlanRegistry,
        runner: Arc<dyn ActionRunner>,
        store: Arc<dyn TaskStateStore>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let persister = Persister::new(store, config.persist_retry_attempts, config.persist_backoff());
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(EngineInner {
                pool: Arc::new(Semaphore::new(config.max_concurrent_tasks)),
                config,
                registry,
                runner,
                persister,
                callbacks: Callbacks::default(),
                recoveries: DashMap::new(),
                order: Mutex::new(Vec::new()),
                shutdown,
            }),
        })
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Plan registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &PlanRegistry {
        &self.inner.registry
    }

    /// Register a hook for tasks reaching `Completed`
    pub fn on_task_completed<F>(&self, callback: F)
    where
        F: Fn(&TaskEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback: TaskCallback = Arc::new(callback);
        self.inner.callbacks.on_completed(callback);
    }

    /// Register a hook for tasks reaching `Failed`
    ///
    /// Also fires for running tasks cancelled by [`Engine::shutdown`] or a
    /// mid-run [`Engine::rollback_recovery`].
    pub fn on_task_failed<F>(&self, callback: F)
    where
        F: Fn(&TaskEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback: TaskCallback = Arc::new(callback);
        self.inner.callbacks.on_failed(callback);
    }

    /// Start recovering `system_type` for `incident_id`
    ///
    /// Returns the new id as soon as the recovery's supervisor is spawned.
    /// The supervisor persists the fresh instance and runs its phases in the
    /// background, so dropping this future never leaves an unowned recovery.
    ///
    /// # Errors
    /// - `UnknownSystemType` if no plan is registered for the type
    /// - `ShuttingDown` after [`Engine::shutdown`]
    #[allow(clippy::unused_async)]
    pub async fn initiate_recovery(
        &self,
        incident_id: &str,
        system_type: &str,
    ) -> Result<String, EngineError> {
        if *self.inner.shutdown.borrow() {
            return Err(EngineError::ShuttingDown);
        }
        let plan = self
            .inner
            .registry
            .lookup(system_type)
            .ok_or_else(|| EngineError::UnknownSystemType(system_type.to_string()))?;

        let now = Utc::now();
        let recovery_id = format!(
            "RECOVERY-{incident_id}-{}-{}-{}",
            system_type.to_uppercase(),
            now.timestamp(),
            Ulid::new()
        );
        let mut instance =
            RecoveryInstance::instantiate(&recovery_id, incident_id, system_type, plan, now);
        instance.status = RecoveryStatus::InProgress;
        instance.started_at = Some(now);
        let records = instance.records();

        let (status_tx, _) = watch::channel(RecoveryStatus::InProgress);
        let (rollback_tx, rollback_rx) = mpsc::unbounded_channel();
        let entry = Arc::new(RecoveryEntry {
            instance: RwLock::new(instance),
            lease: tokio::sync::Mutex::new(()),
            status_tx,
            rollback_tx,
            supervisor: Mutex::new(None),
        });

        // No await between here and registration
        let handle = tokio::spawn(supervisor::supervise(
            Arc::clone(&self.inner),
            Arc::clone(&entry),
            records,
            rollback_rx,
        ));
        *entry.supervisor.lock() = Some(handle);
        self.inner.recoveries.insert(recovery_id.clone(), entry);
        self.inner.order.lock().push(recovery_id.clone());

        telemetry::recovery_started(system_type);
        tracing::info!(
            recovery_id = %recovery_id,
            incident_id = %incident_id,
            system_type = %system_type,
            plan_id = %plan.id,
            tasks = plan.tasks.len(),
            "recovery initiated"
        );
        Ok(recovery_id)
    }

    fn entry(&self, recovery_id: &str) -> Result<Arc<RecoveryEntry>, EngineError> {
        self.inner
            .recoveries
            .get(recovery_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| EngineError::RecoveryNotFound(recovery_id.to_string()))
    }

    /// Snapshot of a recovery's progress
    ///
    /// # Errors
    /// `RecoveryNotFound` for an unknown id
    pub fn get_status(&self, recovery_id: &str) -> Result<RecoverySnapshot, EngineError> {
        Ok(self.entry(recovery_id)?.snapshot())
    }

    /// Full state of one task, logs included
    ///
    /// # Errors
    /// `RecoveryNotFound` for an unknown recovery id
    pub fn task(&self, recovery_id: &str, task_id: &str) -> Result<Option<RecoveryTask>, EngineError> {
        let entry = self.entry(recovery_id)?;
        let task = entry.instance.read().task(task_id).cloned();
        Ok(task)
    }

    /// Undo every `Completed` task, most recently created first
    ///
    /// A recovery whose phases are still running is stopped first: no further
    /// task is dispatched, running actions are cancelled and their tasks end
    /// `Failed` with the `interrupted` flag. The recovery then finalizes as
    /// `Failed` once the rollback is done.
    ///
    /// # Errors
    /// `RecoveryNotFound` for an unknown id
    pub async fn rollback_recovery(&self, recovery_id: &str) -> Result<RollbackReport, EngineError> {
        let entry = self.entry(recovery_id)?;
        let running = !entry.instance.read().status.is_terminal();
        if running {
            let (reply_tx, reply_rx) = oneshot::channel();
            if entry.rollback_tx.send(reply_tx).is_ok() {
                if let Ok(report) = reply_rx.await {
                    return Ok(report);
                }
            }
            // The supervisor finished before it saw the request
        }
        let _lease = entry.lease.lock().await;
        Ok(rollback::roll_back(&self.inner, &entry).await)
    }

    /// Wait until a recovery reaches `Completed` or `Failed`
    ///
    /// # Errors
    /// - `RecoveryNotFound` for an unknown id
    /// - `WaitTimeout` if `timeout` passes first
    pub async fn wait_for_completion(
        &self,
        recovery_id: &str,
        timeout: Duration,
    ) -> Result<RecoverySnapshot, EngineError> {
        let entry = self.entry(recovery_id)?;
        let mut rx = entry.status_tx.subscribe();
        let terminal = async move { rx.wait_for(|s| s.is_terminal()).await.map(|_| ()) };

        match tokio::time::timeout(timeout, terminal).await {
            Ok(Ok(())) => Ok(entry.snapshot()),
            Ok(Err(_)) => Err(EngineError::RecoveryNotFound(recovery_id.to_string())),
            Err(_) => Err(EngineError::WaitTimeout {
                recovery_id: recovery_id.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Recovery ids in initiation order
    #[must_use]
    pub fn list_recoveries(&self) -> Vec<String> {
        self.inner.order.lock().clone()
    }

    /// Engine-wide counters
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn statistics(&self) -> EngineStatistics {
        let mut stats = EngineStatistics {
            total_recoveries: 0,
            completed_recoveries: 0,
            failed_recoveries: 0,
            in_progress_recoveries: 0,
            success_rate: 0.0,
            available_plans: self.inner.registry.len(),
            system_types: self
                .inner
                .registry
                .system_types()
                .into_iter()
                .map(str::to_string)
                .collect(),
        };
        for entry in &self.inner.recoveries {
            stats.total_recoveries += 1;
            match entry.instance.read().status {
                RecoveryStatus::Completed => stats.completed_recoveries += 1,
                RecoveryStatus::Failed => stats.failed_recoveries += 1,
                RecoveryStatus::InProgress | RecoveryStatus::Pending => {
                    stats.in_progress_recoveries += 1;
                }
            }
        }
        if stats.total_recoveries > 0 {
            stats.success_rate =
                stats.completed_recoveries as f64 / stats.total_recoveries as f64 * 100.0;
        }
        stats
    }

    /// Stored `InProgress` tasks that no running recovery of this engine owns
    ///
    /// After a restart these are tasks whose execution was lost; their real
    /// world effect must be checked before they are trusted or re-run.
    ///
    /// # Errors
    /// `Store` if the store cannot be queried
    pub fn orphaned_tasks(&self) -> Result<Vec<TaskRecord>, EngineError> {
        let records = self
            .inner
            .persister
            .store()
            .load_by_status(TaskStatus::InProgress)?;
        Ok(records
            .into_iter()
            .filter(|r| match self.inner.recoveries.get(&r.recovery_id) {
                Some(entry) => entry.instance.read().status.is_terminal(),
                None => true,
            })
            .collect())
    }

    /// Stop all recoveries
    ///
    /// Running actions are cancelled and their tasks recorded as `Failed`
    /// with the `interrupted` flag. New recoveries are refused.
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        let handles: Vec<JoinHandle<()>> = self
            .inner
            .recoveries
            .iter()
            .filter_map(|e| e.supervisor.lock().take())
            .collect();
        tracing::info!(supervisors = handles.len(), "engine shutting down");
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "recovery supervisor ended abnormally");
            }
        }
    }
}
