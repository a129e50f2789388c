//! Testing utilities for ROE workspace
//!
//! Shared runners, stores and plan fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use roe_plan::{Action, Criticality, Phase, PlanRegistry, RecoveryTask, SystemRecoveryPlan, TaskStatus};
use roe_runner::{ActionOutput, ActionRunner, RunnerError};
use roe_store::{MemoryStore, StoreError, TaskRecord, TaskStateStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What a scripted action does when run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    Succeed,
    Fail(i32),
    /// Sleep, then succeed
    Sleep(Duration),
    /// Sleep, then fail with the code
    SleepThenFail(Duration, i32),
    /// Runner-level error
    Error,
}

/// Runner whose behavior is keyed by action text
///
/// The key is the shell command, the HTTP url or the no-op label. Unknown
/// keys succeed immediately. Every start is recorded, and the highest
/// number of simultaneously running actions is tracked.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<String, Script>>,
    started: Mutex<Vec<String>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl ScriptedRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on(self, key: impl Into<String>, script: Script) -> Self {
        self.scripts.lock().insert(key.into(), script);
        self
    }

    /// Keys of started actions, in start order
    #[must_use]
    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn key(action: &Action) -> String {
        match action {
            Action::Shell { command } => command.clone(),
            Action::Http { url, .. } => url.clone(),
            Action::Noop { label } => label.clone(),
        }
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ActionRunner for ScriptedRunner {
    async fn run(&self, action: &Action) -> Result<ActionOutput, RunnerError> {
        let key = Self::key(action);
        let script = self
            .scripts
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or(Script::Succeed);
        self.started.lock().push(key.clone());

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let _guard = RunningGuard(&self.running);

        match script {
            Script::Succeed => Ok(ActionOutput::ok().with_stdout(key)),
            Script::Fail(code) => Ok(ActionOutput::failed(code).with_stderr(format!("{key} failed"))),
            Script::Sleep(d) => {
                tokio::time::sleep(d).await;
                Ok(ActionOutput::ok())
            }
            Script::SleepThenFail(d, code) => {
                tokio::time::sleep(d).await;
                Ok(ActionOutput::failed(code))
            }
            Script::Error => Err(RunnerError::Unsupported("scripted error")),
        }
    }
}

/// Store that rejects the first `n` writes, then delegates to memory
#[derive(Debug)]
pub struct FlakyStore {
    inner: MemoryStore,
    remaining_failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyStore {
    #[must_use]
    pub fn failing_first(n: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            remaining_failures: AtomicUsize::new(n),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Store where every write fails
    #[must_use]
    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    /// Total upsert calls, failed ones included
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

impl TaskStateStore for FlakyStore {
    fn upsert(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        self.inner.upsert(record)
    }

    fn load(&self, recovery_id: &str, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        self.inner.load(recovery_id, task_id)
    }

    fn load_by_recovery(&self, recovery_id: &str) -> Result<Vec<TaskRecord>, StoreError> {
        self.inner.load_by_recovery(recovery_id)
    }

    fn load_by_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>, StoreError> {
        self.inner.load_by_status(status)
    }
}

/// Task with one shell action whose command is the task id
#[must_use]
pub fn shell_task(id: &str, phase: Phase) -> RecoveryTask {
    RecoveryTask::new(id, format!("task {id}"), phase).with_action(Action::shell(id))
}

/// Reversible variant of [`shell_task`]; the rollback command is `undo-<id>`
#[must_use]
pub fn reversible_task(id: &str, phase: Phase) -> RecoveryTask {
    shell_task(id, phase).with_rollback(Action::shell(format!("undo-{id}")))
}

#[must_use]
pub fn plan_with(tasks: impl IntoIterator<Item = RecoveryTask>) -> SystemRecoveryPlan {
    tasks.into_iter().fold(
        SystemRecoveryPlan::new("RECOVERY-TEST-001", "Test System", Criticality::High),
        SystemRecoveryPlan::with_task,
    )
}

/// Empty registry holding a single plan under `system_type`
///
/// # Panics
/// Panics if the plan does not validate.
#[must_use]
pub fn registry_with(system_type: &str, plan: SystemRecoveryPlan) -> PlanRegistry {
    let mut registry = PlanRegistry::new();
    registry.register(system_type, plan).unwrap();
    registry
}

/// B depends on A, both in Containment, followed by an independent
/// Recovery task C
#[must_use]
pub fn failing_dependency_plan() -> SystemRecoveryPlan {
    plan_with([
        shell_task("A", Phase::Containment),
        shell_task("B", Phase::Containment).depends_on("A"),
        shell_task("C", Phase::Recovery),
    ])
}
