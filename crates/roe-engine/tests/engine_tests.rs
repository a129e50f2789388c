//! End-to-end orchestration scenarios

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use roe_engine::{Engine, EngineConfig, EngineError, RecoveryStatus};
use roe_plan::{
    Action, Phase, PlanRegistry, Priority, RecoveryTask, SystemRecoveryPlan, TaskStatus,
    META_INTERRUPTED,
};
use roe_runner::{NoopRunner, ACTION_TIMEOUT_MARKER};
use roe_store::{MemoryStore, TaskRecord, TaskStateStore};
use roe_test_utils::{
    failing_dependency_plan, plan_with, registry_with, shell_task, FlakyStore, Script,
    ScriptedRunner,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(10);

fn engine_for(
    plan: SystemRecoveryPlan,
    runner: Arc<ScriptedRunner>,
    config: EngineConfig,
) -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(config, registry_with("test", plan), runner, store.clone()).unwrap();
    (engine, store)
}

async fn wait_until_running(engine: &Engine, id: &str, task_id: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = engine.get_status(id).unwrap();
        if status.task(task_id).map(|t| t.status) == Some(TaskStatus::InProgress) {
            return;
        }
        assert!(Instant::now() < deadline, "{task_id} never started");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn builtin_plans_run_to_completion() {
    let engine = Engine::new(
        EngineConfig::default(),
        PlanRegistry::with_builtin_plans(),
        Arc::new(NoopRunner),
        Arc::new(MemoryStore::new()),
    )
    .unwrap();

    for system_type in ["database", "webapp", "network"] {
        let id = engine.initiate_recovery("INC-001", system_type).await.unwrap();
        assert!(id.starts_with(&format!("RECOVERY-INC-001-{}-", system_type.to_uppercase())));

        let status = engine.wait_for_completion(&id, WAIT).await.unwrap();
        assert_eq!(status.status, RecoveryStatus::Completed);
        assert_eq!(status.completed_tasks, status.total_tasks);
        assert!((status.progress_percentage - 100.0).abs() < f64::EPSILON);
        assert!(status.completed_at.is_some());
        assert!(!status.persistence_degraded);
    }
    assert_eq!(engine.list_recoveries().len(), 3);
}

#[tokio::test]
async fn failed_dependency_skips_dependent_and_phase_advances() {
    let runner = Arc::new(ScriptedRunner::new().on("A", Script::Fail(1)));
    let (engine, _) = engine_for(failing_dependency_plan(), runner.clone(), EngineConfig::default());

    let failed = Arc::new(Mutex::new(Vec::new()));
    let f = failed.clone();
    engine.on_task_failed(move |event| {
        f.lock().push(event.task.id.clone());
        Ok(())
    });

    let id = engine.initiate_recovery("INC-002", "test").await.unwrap();
    let status = engine.wait_for_completion(&id, WAIT).await.unwrap();

    assert_eq!(status.status, RecoveryStatus::Failed);
    assert_eq!(status.task("A").unwrap().status, TaskStatus::Failed);
    assert_eq!(status.task("B").unwrap().status, TaskStatus::Skipped);
    assert_eq!(status.task("C").unwrap().status, TaskStatus::Completed);
    assert_eq!(status.failed_tasks, 1);
    assert_eq!(status.skipped_tasks, 1);
    assert!((status.progress_percentage - 100.0 / 3.0).abs() < 1e-9);

    // B never reached the runner
    assert_eq!(runner.started(), vec!["A", "C"]);
    assert_eq!(*failed.lock(), vec!["A".to_string()]);

    let a = engine.task(&id, "A").unwrap().unwrap();
    assert!(a.error_logs.iter().any(|l| l == "Command failed with exit code 1"));
    let b = engine.task(&id, "B").unwrap().unwrap();
    assert!(b.started_at.is_none());
    assert!(b.logs.iter().any(|l| l.starts_with("DependencyUnmet")));
}

#[tokio::test]
async fn independent_tasks_run_concurrently() {
    let plan = plan_with([shell_task("X", Phase::Containment), shell_task("Y", Phase::Containment)]);
    let runner = Arc::new(
        ScriptedRunner::new()
            .on("X", Script::Sleep(Duration::from_millis(300)))
            .on("Y", Script::Sleep(Duration::from_millis(300))),
    );
    let (engine, _) = engine_for(plan, runner.clone(), EngineConfig::default());

    let id = engine.initiate_recovery("INC-003", "test").await.unwrap();
    let status = engine.wait_for_completion(&id, WAIT).await.unwrap();

    assert_eq!(status.status, RecoveryStatus::Completed);
    assert_eq!(runner.max_concurrency(), 2);
}

#[tokio::test]
async fn pool_size_bounds_concurrency() {
    let plan = plan_with([
        shell_task("X", Phase::Eradication),
        shell_task("Y", Phase::Eradication),
        shell_task("Z", Phase::Eradication),
    ]);
    let sleep = Script::Sleep(Duration::from_millis(50));
    let runner = Arc::new(
        ScriptedRunner::new()
            .on("X", sleep.clone())
            .on("Y", sleep.clone())
            .on("Z", sleep),
    );
    let config = EngineConfig::default().with_max_concurrent_tasks(1);
    let (engine, _) = engine_for(plan, runner.clone(), config);

    let id = engine.initiate_recovery("INC-004", "test").await.unwrap();
    engine.wait_for_completion(&id, WAIT).await.unwrap();
    assert_eq!(runner.max_concurrency(), 1);
    assert_eq!(runner.started().len(), 3);
}

#[tokio::test]
async fn priority_orders_dispatch_within_a_phase() {
    let plan = plan_with([
        shell_task("low", Phase::Recovery).with_priority(Priority::Low),
        shell_task("normal", Phase::Recovery),
        shell_task("urgent", Phase::Recovery).with_priority(Priority::Immediate),
        shell_task("normal-2", Phase::Recovery),
    ]);
    let runner = Arc::new(ScriptedRunner::new());
    let config = EngineConfig::default().with_max_concurrent_tasks(1);
    let (engine, _) = engine_for(plan, runner.clone(), config);

    let id = engine.initiate_recovery("INC-005", "test").await.unwrap();
    engine.wait_for_completion(&id, WAIT).await.unwrap();
    assert_eq!(runner.started(), vec!["urgent", "normal", "normal-2", "low"]);
}

#[tokio::test]
async fn dependencies_and_phases_gate_starts() {
    let plan = plan_with([
        shell_task("assess", Phase::Assessment),
        shell_task("A", Phase::Containment),
        shell_task("B", Phase::Containment).depends_on("A"),
    ]);
    let runner = Arc::new(
        ScriptedRunner::new()
            .on("assess", Script::Sleep(Duration::from_millis(100)))
            .on("A", Script::Sleep(Duration::from_millis(100))),
    );
    let (engine, _) = engine_for(plan, runner.clone(), EngineConfig::default());

    let id = engine.initiate_recovery("INC-006", "test").await.unwrap();
    engine.wait_for_completion(&id, WAIT).await.unwrap();

    let task = |t: &str| engine.task(&id, t).unwrap().unwrap();
    let (assess, a, b) = (task("assess"), task("A"), task("B"));
    assert!(a.started_at.unwrap() >= assess.completed_at.unwrap());
    assert!(b.started_at.unwrap() >= a.completed_at.unwrap());
    assert_eq!(runner.started(), vec!["assess", "A", "B"]);
}

#[tokio::test]
async fn action_timeout_fails_task_with_marker() {
    let plan = plan_with([shell_task("slow", Phase::Eradication)]);
    let runner = Arc::new(ScriptedRunner::new().on("slow", Script::Sleep(Duration::from_secs(5))));
    let config = EngineConfig::default().with_action_timeout(Duration::from_secs(1));
    let (engine, _) = engine_for(plan, runner, config);

    let started = Instant::now();
    let id = engine.initiate_recovery("INC-007", "test").await.unwrap();
    let status = engine.wait_for_completion(&id, WAIT).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
    assert_eq!(status.status, RecoveryStatus::Failed);
    let summary = status.task("slow").unwrap();
    assert_eq!(summary.status, TaskStatus::Failed);
    assert!(summary.timed_out);

    let task = engine.task(&id, "slow").unwrap().unwrap();
    assert!(task.error_logs.iter().any(|l| l.starts_with(ACTION_TIMEOUT_MARKER)));
}

#[tokio::test]
async fn runner_errors_stay_with_the_task() {
    let plan = plan_with([
        RecoveryTask::new("broken", "broken", Phase::Assessment)
            .with_action(Action::shell("explode"))
            .with_action(Action::shell("never")),
        shell_task("next", Phase::Containment),
    ]);
    let runner = Arc::new(ScriptedRunner::new().on("explode", Script::Error));
    let (engine, _) = engine_for(plan, runner.clone(), EngineConfig::default());

    let id = engine.initiate_recovery("INC-008", "test").await.unwrap();
    let status = engine.wait_for_completion(&id, WAIT).await.unwrap();

    assert_eq!(status.task("broken").unwrap().status, TaskStatus::Failed);
    assert_eq!(status.task("next").unwrap().status, TaskStatus::Completed);
    // Fail-fast within the task
    assert_eq!(runner.started(), vec!["explode", "next"]);
}

#[tokio::test]
async fn status_queries_are_idempotent() {
    let (engine, _) = engine_for(
        failing_dependency_plan(),
        Arc::new(ScriptedRunner::new()),
        EngineConfig::default(),
    );
    let id = engine.initiate_recovery("INC-009", "test").await.unwrap();
    engine.wait_for_completion(&id, WAIT).await.unwrap();

    let first = engine.get_status(&id).unwrap();
    let second = engine.get_status(&id).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.tasks.len(), 3);
}

#[tokio::test]
async fn caller_errors_are_typed() {
    let (engine, _) = engine_for(
        failing_dependency_plan(),
        Arc::new(ScriptedRunner::new()),
        EngineConfig::default(),
    );

    let err = engine.initiate_recovery("INC-010", "mainframe").await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownSystemType(ref t) if t == "mainframe"));
    assert!(err.is_caller_error());

    assert!(matches!(
        engine.get_status("RECOVERY-NOPE"),
        Err(EngineError::RecoveryNotFound(_))
    ));
    assert!(matches!(
        engine.rollback_recovery("RECOVERY-NOPE").await,
        Err(EngineError::RecoveryNotFound(_))
    ));
    assert!(engine.list_recoveries().is_empty());
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let result = Engine::new(
        EngineConfig::default().with_max_concurrent_tasks(0),
        PlanRegistry::new(),
        Arc::new(NoopRunner),
        Arc::new(MemoryStore::new()),
    );
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[tokio::test]
async fn every_transition_is_written_through() {
    let (engine, store) = engine_for(
        failing_dependency_plan(),
        Arc::new(ScriptedRunner::new().on("A", Script::Fail(2))),
        EngineConfig::default(),
    );
    let id = engine.initiate_recovery("INC-011", "test").await.unwrap();
    let status = engine.wait_for_completion(&id, WAIT).await.unwrap();

    let stored: Vec<(String, TaskStatus)> = store
        .load_by_recovery(&id)
        .unwrap()
        .into_iter()
        .map(|r| (r.task.id, r.task.status))
        .collect();
    let live: Vec<(String, TaskStatus)> =
        status.tasks.iter().map(|t| (t.id.clone(), t.status)).collect();
    assert_eq!(stored, live);
    assert!(store.load_by_status(TaskStatus::InProgress).unwrap().is_empty());
}

#[tokio::test]
async fn transient_store_failures_are_retried() {
    let store = Arc::new(FlakyStore::failing_first(2));
    let config = EngineConfig::default().with_persist_retry(3, Duration::from_millis(1));
    let engine = Engine::new(
        config,
        registry_with("test", failing_dependency_plan()),
        Arc::new(ScriptedRunner::new()),
        store.clone(),
    )
    .unwrap();

    let id = engine.initiate_recovery("INC-012", "test").await.unwrap();
    let status = engine.wait_for_completion(&id, WAIT).await.unwrap();

    assert!(!status.persistence_degraded);
    assert_eq!(store.inner().load_by_status(TaskStatus::Completed).unwrap().len(), 3);
    assert!(store.attempts() > 3);
}

#[tokio::test]
async fn exhausted_store_retries_degrade_instance() {
    let store = Arc::new(FlakyStore::always_failing());
    let config = EngineConfig::default().with_persist_retry(1, Duration::from_millis(1));
    let engine = Engine::new(
        config,
        registry_with("test", failing_dependency_plan()),
        Arc::new(ScriptedRunner::new()),
        store.clone(),
    )
    .unwrap();

    let id = engine.initiate_recovery("INC-013", "test").await.unwrap();
    let status = engine.wait_for_completion(&id, WAIT).await.unwrap();

    // Execution carries on with in-memory state
    assert_eq!(status.status, RecoveryStatus::Completed);
    assert!(status.persistence_degraded);
    assert!(store.inner().is_empty());
}

#[tokio::test]
async fn initiation_does_not_wait_on_the_store() {
    let store = Arc::new(FlakyStore::always_failing());
    let config = EngineConfig::default().with_persist_retry(1, Duration::from_millis(200));
    let engine = Engine::new(
        config,
        registry_with("test", plan_with([shell_task("A", Phase::Assessment)])),
        Arc::new(ScriptedRunner::new()),
        store,
    )
    .unwrap();

    // A caller that gives up quickly still gets a recovery that finishes
    let id = tokio::time::timeout(
        Duration::from_millis(50),
        engine.initiate_recovery("INC-019", "test"),
    )
    .await
    .expect("initiation returned before the store gave up")
    .unwrap();

    let status = engine.wait_for_completion(&id, WAIT).await.unwrap();
    assert_eq!(status.status, RecoveryStatus::Completed);
    assert!(status.persistence_degraded);
    assert_eq!(engine.list_recoveries(), vec![id]);
    assert_eq!(engine.statistics().in_progress_recoveries, 0);
}

#[tokio::test]
async fn faulty_callbacks_do_not_abort_the_engine() {
    let (engine, _) = engine_for(
        plan_with([shell_task("A", Phase::Assessment), shell_task("B", Phase::Recovery)]),
        Arc::new(ScriptedRunner::new()),
        EngineConfig::default(),
    );
    let seen = Arc::new(AtomicUsize::new(0));

    engine.on_task_completed(|_| panic!("observer bug"));
    engine.on_task_completed(|_| Err(anyhow::anyhow!("observer unavailable")));
    let s = seen.clone();
    engine.on_task_completed(move |event| {
        assert_eq!(event.task.status, TaskStatus::Completed);
        s.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let id = engine.initiate_recovery("INC-014", "test").await.unwrap();
    let status = engine.wait_for_completion(&id, WAIT).await.unwrap();

    assert_eq!(status.status, RecoveryStatus::Completed);
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn shutdown_interrupts_running_tasks() {
    let plan = plan_with([shell_task("hang", Phase::Assessment), shell_task("later", Phase::Recovery)]);
    let runner = Arc::new(ScriptedRunner::new().on("hang", Script::Sleep(Duration::from_secs(30))));
    let (engine, store) = engine_for(plan, runner, EngineConfig::default());
    let failures = Arc::new(Mutex::new(Vec::new()));
    let f = failures.clone();
    engine.on_task_failed(move |event| {
        f.lock().push((event.task.id.clone(), event.task.flag(META_INTERRUPTED)));
        Ok(())
    });

    let id = engine.initiate_recovery("INC-015", "test").await.unwrap();
    wait_until_running(&engine, &id, "hang").await;

    let started = Instant::now();
    engine.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(*failures.lock(), vec![("hang".to_string(), true)]);

    let status = engine.get_status(&id).unwrap();
    assert_eq!(status.status, RecoveryStatus::Failed);
    assert_eq!(status.task("hang").unwrap().status, TaskStatus::Failed);
    assert_eq!(status.task("later").unwrap().status, TaskStatus::Pending);

    let record = store.load(&id, "hang").unwrap().unwrap();
    assert_eq!(record.task.status, TaskStatus::Failed);
    assert!(record.task.flag(META_INTERRUPTED));
    assert!(engine.orphaned_tasks().unwrap().is_empty());

    assert!(matches!(
        engine.initiate_recovery("INC-016", "test").await,
        Err(EngineError::ShuttingDown)
    ));
}

#[tokio::test]
async fn orphaned_tasks_are_surfaced_at_startup() {
    let store = Arc::new(MemoryStore::new());
    let mut task = shell_task("DB-003", Phase::Recovery);
    task.status = TaskStatus::InProgress;
    store
        .upsert(&TaskRecord::new("RECOVERY-OLD-DATABASE-1", 2, task))
        .unwrap();

    let engine = Engine::new(
        EngineConfig::default(),
        PlanRegistry::with_builtin_plans(),
        Arc::new(NoopRunner),
        store,
    )
    .unwrap();

    let orphans = engine.orphaned_tasks().unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].recovery_id, "RECOVERY-OLD-DATABASE-1");
}

#[tokio::test]
async fn statistics_summarize_recoveries() {
    let runner = Arc::new(ScriptedRunner::new().on("A", Script::Fail(1)));
    let mut registry = registry_with("test", failing_dependency_plan());
    registry
        .register("healthy", plan_with([shell_task("ok", Phase::Assessment)]))
        .unwrap();
    let engine = Engine::new(
        EngineConfig::default(),
        registry,
        runner,
        Arc::new(MemoryStore::new()),
    )
    .unwrap();

    let failing = engine.initiate_recovery("INC-017", "test").await.unwrap();
    let healthy = engine.initiate_recovery("INC-017", "healthy").await.unwrap();
    engine.wait_for_completion(&failing, WAIT).await.unwrap();
    engine.wait_for_completion(&healthy, WAIT).await.unwrap();

    let stats = engine.statistics();
    assert_eq!(stats.total_recoveries, 2);
    assert_eq!(stats.completed_recoveries, 1);
    assert_eq!(stats.failed_recoveries, 1);
    assert_eq!(stats.in_progress_recoveries, 0);
    assert!((stats.success_rate - 50.0).abs() < f64::EPSILON);
    assert_eq!(stats.available_plans, 2);
    assert_eq!(stats.system_types, vec!["healthy", "test"]);
    assert_eq!(engine.list_recoveries(), vec![failing, healthy]);
}

#[tokio::test]
async fn waiting_times_out_while_running() {
    let plan = plan_with([shell_task("hang", Phase::Assessment)]);
    let runner = Arc::new(ScriptedRunner::new().on("hang", Script::Sleep(Duration::from_secs(30))));
    let (engine, _) = engine_for(plan, runner, EngineConfig::default());

    let id = engine.initiate_recovery("INC-018", "test").await.unwrap();
    let err = engine
        .wait_for_completion(&id, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WaitTimeout { .. }));
    assert!(err.is_retryable());

    engine.shutdown().await;
    let status = engine.wait_for_completion(&id, WAIT).await.unwrap();
    assert_eq!(status.status, RecoveryStatus::Failed);
}
