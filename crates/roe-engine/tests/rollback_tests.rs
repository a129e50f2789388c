//! Rollback ordering, partial failure and persistence

use pretty_assertions::assert_eq;
use roe_engine::{Engine, EngineConfig, EngineError, RecoveryStatus, RollbackOutcome};
use roe_plan::{Phase, SystemRecoveryPlan, TaskStatus, META_INTERRUPTED, META_ROLLED_BACK_AT};
use roe_store::{MemoryStore, SqliteStore, TaskStateStore};
use roe_test_utils::{plan_with, registry_with, reversible_task, shell_task, Script, ScriptedRunner};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

fn engine_for(plan: SystemRecoveryPlan, runner: Arc<ScriptedRunner>, config: EngineConfig) -> Engine {
    Engine::new(config, registry_with("test", plan), runner, Arc::new(MemoryStore::new())).unwrap()
}

async fn wait_for_start(runner: &ScriptedRunner, key: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !runner.started().iter().any(|k| k == key) {
        assert!(Instant::now() < deadline, "{key} never started");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn three_reversible() -> SystemRecoveryPlan {
    plan_with([
        reversible_task("A", Phase::Assessment),
        reversible_task("B", Phase::Containment),
        reversible_task("C", Phase::Recovery),
    ])
}

#[tokio::test]
async fn completed_tasks_roll_back_in_reverse_creation_order() {
    let runner = Arc::new(ScriptedRunner::new());
    let engine = engine_for(three_reversible(), runner.clone(), EngineConfig::default());

    let id = engine.initiate_recovery("INC-100", "test").await.unwrap();
    engine.wait_for_completion(&id, WAIT).await.unwrap();

    let report = engine.rollback_recovery(&id).await.unwrap();
    assert!(report.success);
    assert_eq!(report.order(), vec!["C", "B", "A"]);
    assert_eq!(
        runner.started(),
        vec!["A", "B", "C", "undo-C", "undo-B", "undo-A"]
    );

    let status = engine.get_status(&id).unwrap();
    // Rollback leaves the overall status to the operator
    assert_eq!(status.status, RecoveryStatus::Completed);
    assert!(status.awaiting_operator);
    assert!(status.tasks.iter().all(|t| t.status == TaskStatus::Pending));

    let a = engine.task(&id, "A").unwrap().unwrap();
    assert!(a.metadata.contains_key(META_ROLLED_BACK_AT));
    assert!(a.completed_at.is_none());
    assert!(a
        .logs
        .iter()
        .any(|l| l == "Rollback command completed: undo-A"));
}

#[tokio::test]
async fn rollback_failure_is_flagged_and_others_continue() {
    let runner = Arc::new(ScriptedRunner::new().on("undo-B", Script::Fail(1)));
    let engine = engine_for(three_reversible(), runner.clone(), EngineConfig::default());

    let id = engine.initiate_recovery("INC-101", "test").await.unwrap();
    engine.wait_for_completion(&id, WAIT).await.unwrap();

    let report = engine.rollback_recovery(&id).await.unwrap();
    assert!(!report.success);
    assert_eq!(report.failures().count(), 1);
    assert_eq!(report.results[1].task_id, "B");
    assert!(matches!(report.results[1].outcome, RollbackOutcome::Failed { .. }));
    assert_eq!(report.results[2].outcome, RollbackOutcome::RolledBack);

    let status = engine.get_status(&id).unwrap();
    let b = status.task("B").unwrap();
    assert_eq!(b.status, TaskStatus::Completed);
    assert!(b.rollback_failed);
    assert_eq!(status.task("A").unwrap().status, TaskStatus::Pending);
    assert_eq!(status.task("C").unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn irreversible_and_unfinished_tasks_are_left_alone() {
    let plan = plan_with([
        shell_task("assess", Phase::Assessment),
        reversible_task("isolate", Phase::Containment),
        reversible_task("broken", Phase::Eradication),
    ]);
    let runner = Arc::new(ScriptedRunner::new().on("broken", Script::Fail(3)));
    let engine = engine_for(plan, runner.clone(), EngineConfig::default());

    let id = engine.initiate_recovery("INC-102", "test").await.unwrap();
    let status = engine.wait_for_completion(&id, WAIT).await.unwrap();
    assert_eq!(status.status, RecoveryStatus::Failed);

    let report = engine.rollback_recovery(&id).await.unwrap();
    assert!(report.success);
    assert_eq!(report.order(), vec!["isolate", "assess"]);
    assert_eq!(report.results[1].outcome, RollbackOutcome::NotReversible);
    assert!(!runner.started().contains(&"undo-broken".to_string()));

    let status = engine.get_status(&id).unwrap();
    assert_eq!(status.status, RecoveryStatus::Failed);
    assert_eq!(status.task("assess").unwrap().status, TaskStatus::Completed);
    assert_eq!(status.task("broken").unwrap().status, TaskStatus::Failed);
}

#[tokio::test]
async fn rollback_of_a_running_recovery_stops_it_first() {
    let plan = plan_with([
        reversible_task("A", Phase::Assessment),
        reversible_task("B", Phase::Assessment).depends_on("A"),
        reversible_task("hang", Phase::Containment),
        reversible_task("C", Phase::Recovery),
    ]);
    let runner = Arc::new(ScriptedRunner::new().on("hang", Script::Sleep(Duration::from_secs(30))));
    let engine = engine_for(plan, runner.clone(), EngineConfig::default());

    let id = engine.initiate_recovery("INC-103", "test").await.unwrap();
    wait_for_start(&runner, "hang").await;

    let started = Instant::now();
    let report = engine.rollback_recovery(&id).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.success);
    assert_eq!(report.order(), vec!["B", "A"]);
    assert_eq!(runner.started(), vec!["A", "B", "hang", "undo-B", "undo-A"]);

    let status = engine.wait_for_completion(&id, WAIT).await.unwrap();
    assert_eq!(status.status, RecoveryStatus::Failed);
    assert!(status.awaiting_operator);
    assert_eq!(status.task("A").unwrap().status, TaskStatus::Pending);
    assert_eq!(status.task("B").unwrap().status, TaskStatus::Pending);
    assert_eq!(status.task("C").unwrap().status, TaskStatus::Pending);

    let hang = engine.task(&id, "hang").unwrap().unwrap();
    assert_eq!(hang.status, TaskStatus::Failed);
    assert!(hang.flag(META_INTERRUPTED));
}

#[tokio::test]
async fn rollback_of_unknown_recovery_is_a_caller_error() {
    let engine = engine_for(three_reversible(), Arc::new(ScriptedRunner::new()), EngineConfig::default());
    let err = engine.rollback_recovery("RECOVERY-NOPE").await.unwrap_err();
    assert!(matches!(err, EngineError::RecoveryNotFound(_)));
}

#[tokio::test]
async fn auto_rollback_runs_when_recovery_fails() {
    let plan = plan_with([
        reversible_task("A", Phase::Assessment),
        reversible_task("B", Phase::Containment),
    ]);
    let runner = Arc::new(ScriptedRunner::new().on("B", Script::Fail(1)));
    let engine = engine_for(plan, runner.clone(), EngineConfig::default().with_auto_rollback(true));

    let id = engine.initiate_recovery("INC-104", "test").await.unwrap();
    let status = engine.wait_for_completion(&id, WAIT).await.unwrap();

    assert_eq!(status.status, RecoveryStatus::Failed);
    assert!(status.awaiting_operator);
    assert_eq!(status.task("A").unwrap().status, TaskStatus::Pending);
    assert_eq!(status.task("B").unwrap().status, TaskStatus::Failed);
    assert_eq!(runner.started(), vec!["A", "B", "undo-A"]);
}

#[tokio::test]
async fn rollback_is_persisted_to_sqlite() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("recovery.db")).unwrap());
    let engine = Engine::new(
        EngineConfig::default(),
        registry_with("test", three_reversible()),
        Arc::new(ScriptedRunner::new().on("undo-A", Script::Fail(1))),
        store.clone(),
    )
    .unwrap();

    let id = engine.initiate_recovery("INC-105", "test").await.unwrap();
    engine.wait_for_completion(&id, WAIT).await.unwrap();
    engine.rollback_recovery(&id).await.unwrap();

    let records = store.load_by_recovery(&id).unwrap();
    let statuses: Vec<_> = records.iter().map(|r| (r.task.id.as_str(), r.task.status)).collect();
    assert_eq!(
        statuses,
        vec![
            ("A", TaskStatus::Completed),
            ("B", TaskStatus::Pending),
            ("C", TaskStatus::Pending),
        ]
    );
    assert!(records[0].task.flag(roe_plan::META_ROLLBACK_FAILED));
    assert!(records[1].task.metadata.contains_key(META_ROLLED_BACK_AT));
}
