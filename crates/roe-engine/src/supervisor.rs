//! Per-recovery phase sequencer
//!
//! One supervisor task owns each recovery while its phases run. It is the
//! only writer of the instance: workers execute actions on their own copy of
//! a task and send the finished task back over a channel. A rollback
//! requested while phases run is served here too.

use crate::engine::{EngineInner, RecoveryEntry};
use crate::instance::RecoveryStatus;
use crate::rollback::RollbackReport;
use crate::state_machine::{self, Gate};
use crate::worker::{self, WorkerContext};
use crate::{rollback, telemetry};
use chrono::Utc;
use roe_plan::{Phase, RecoveryTask, TaskStatus, META_INTERRUPTED};
use roe_store::TaskRecord;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Request to stop a running recovery and roll it back
pub(crate) type RollbackRequest = oneshot::Sender<RollbackReport>;

/// Why phase execution stopped before the last phase
enum Stop {
    Shutdown,
    Rollback(RollbackRequest),
}

impl Stop {
    fn reason(&self) -> &'static str {
        match self {
            Stop::Shutdown => "engine shut down",
            Stop::Rollback(_) => "rollback requested",
        }
    }
}

struct Supervisor {
    inner: Arc<EngineInner>,
    entry: Arc<RecoveryEntry>,
    recovery_id: String,
    worker_ctx: WorkerContext,
    results_tx: mpsc::UnboundedSender<RecoveryTask>,
    results_rx: mpsc::UnboundedReceiver<RecoveryTask>,
    rollback_rx: mpsc::UnboundedReceiver<RollbackRequest>,
    shutdown: watch::Receiver<bool>,
    in_flight: HashMap<String, JoinHandle<()>>,
}

/// Persist the fresh instance, drive it through every phase, then finalize it
///
/// The lease is released before the terminal status is published so that a
/// caller woken by it can immediately roll back.
pub(crate) async fn supervise(
    inner: Arc<EngineInner>,
    entry: Arc<RecoveryEntry>,
    initial: Vec<TaskRecord>,
    rollback_rx: mpsc::UnboundedReceiver<RollbackRequest>,
) {
    let status = {
        let _lease = entry.lease.lock().await;
        if !inner.persister.write_all(initial).await {
            entry.mark_degraded();
        }
        let mut supervisor = Supervisor::new(inner, Arc::clone(&entry), rollback_rx);
        supervisor.run().await
    };
    entry.status_tx.send_replace(status);
}

impl Supervisor {
    fn new(
        inner: Arc<EngineInner>,
        entry: Arc<RecoveryEntry>,
        rollback_rx: mpsc::UnboundedReceiver<RollbackRequest>,
    ) -> Self {
        let (recovery_id, worker_ctx) = {
            let instance = entry.instance.read();
            (
                instance.recovery_id.clone(),
                WorkerContext {
                    recovery_id: instance.recovery_id.clone(),
                    incident_id: instance.incident_id.clone(),
                    system_type: instance.system_type.clone(),
                },
            )
        };
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let shutdown = inner.shutdown.subscribe();
        Self {
            inner,
            entry,
            recovery_id,
            worker_ctx,
            results_tx,
            results_rx,
            rollback_rx,
            shutdown,
            in_flight: HashMap::new(),
        }
    }

    async fn run(&mut self) -> RecoveryStatus {
        let mut stop = None;
        for phase in Phase::ALL {
            if let ControlFlow::Break(s) = self.run_phase(phase).await {
                stop = Some(s);
                break;
            }
        }
        let interrupted = stop.is_some();
        if let Some(stop) = stop {
            self.interrupt(stop.reason()).await;
            if let Stop::Rollback(reply) = stop {
                let report = rollback::roll_back(&self.inner, &self.entry).await;
                // The caller may have stopped waiting
                let _ = reply.send(report);
            }
        }

        let status = {
            let mut instance = self.entry.instance.write();
            let failed = interrupted || instance.has_failures();
            instance.status = if failed {
                RecoveryStatus::Failed
            } else {
                RecoveryStatus::Completed
            };
            instance.completed_at = Some(Utc::now());
            instance.status
        };
        tracing::info!(recovery_id = %self.recovery_id, status = %status, interrupted, "recovery finished");

        if status == RecoveryStatus::Failed && !interrupted && self.inner.config.auto_rollback {
            tracing::info!(recovery_id = %self.recovery_id, "auto rollback triggered");
            let report = rollback::roll_back(&self.inner, &self.entry).await;
            if !report.success {
                tracing::warn!(
                    recovery_id = %self.recovery_id,
                    failures = report.failures().count(),
                    "auto rollback incomplete"
                );
            }
        }
        status
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn run_phase(&mut self, phase: Phase) -> ControlFlow<Stop> {
        let members = {
            let mut instance = self.entry.instance.write();
            instance.current_phase = Some(phase);
            instance.phase_members(phase)
        };
        if members.is_empty() {
            return ControlFlow::Continue(());
        }
        tracing::info!(recovery_id = %self.recovery_id, phase = %phase, tasks = members.len(), "phase started");

        // Ranks into `members`, so ready tasks dispatch in priority order
        let mut pending: Vec<usize> = (0..members.len()).collect();
        let mut ready: Vec<usize> = Vec::new();

        loop {
            if self.shutdown_requested() {
                return ControlFlow::Break(Stop::Shutdown);
            }
            self.resolve_gates(&members, &mut pending, &mut ready).await;

            if ready.is_empty() && self.in_flight.is_empty() {
                if !pending.is_empty() {
                    // Only reachable through a dependency cycle, which plan
                    // validation rejects
                    for rank in pending.drain(..) {
                        self.skip(&members[rank], "unresolvable dependency").await;
                    }
                }
                break;
            }

            let pool = Arc::clone(&self.inner.pool);
            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        return ControlFlow::Break(Stop::Shutdown);
                    }
                }
                Some(reply) = self.rollback_rx.recv() => {
                    tracing::info!(recovery_id = %self.recovery_id, phase = %phase, "rollback requested mid-run");
                    return ControlFlow::Break(Stop::Rollback(reply));
                }
                Some(task) = self.results_rx.recv(), if !self.in_flight.is_empty() => {
                    self.on_result(task).await;
                }
                permit = pool.acquire_owned(), if !ready.is_empty() => {
                    let Ok(permit) = permit else {
                        return ControlFlow::Break(Stop::Shutdown);
                    };
                    let rank = ready.remove(0);
                    self.dispatch(&members[rank], permit).await;
                }
            }
        }

        tracing::info!(recovery_id = %self.recovery_id, phase = %phase, "phase complete");
        ControlFlow::Continue(())
    }

    /// Move pending tasks to `ready` or `Skipped` until nothing changes
    async fn resolve_gates(&mut self, members: &[String], pending: &mut Vec<usize>, ready: &mut Vec<usize>) {
        loop {
            let decisions: Vec<(usize, Gate)> = {
                let instance = self.entry.instance.read();
                pending
                    .iter()
                    .filter_map(|&rank| {
                        instance
                            .task(&members[rank])
                            .map(|t| (rank, state_machine::gate(t, &instance.task_status)))
                    })
                    .collect()
            };

            let mut skipped_any = false;
            for (rank, gate) in decisions {
                match gate {
                    Gate::Waiting => continue,
                    Gate::Ready => {
                        tracing::debug!(recovery_id = %self.recovery_id, task_id = %members[rank], "task ready");
                        ready.push(rank);
                    }
                    Gate::Unsatisfiable { dependency, status } => {
                        let reason = match status {
                            Some(s) => format!("dependency {dependency} is {s}"),
                            None => format!("dependency {dependency} is not part of the recovery"),
                        };
                        self.skip(&members[rank], &reason).await;
                        skipped_any = true;
                    }
                }
                pending.retain(|r| *r != rank);
            }
            ready.sort_unstable();

            if !skipped_any {
                break;
            }
        }
    }

    async fn skip(&self, task_id: &str, reason: &str) {
        let Some(mut task) = self.entry.instance.read().task(task_id).cloned() else {
            return;
        };
        task.status = TaskStatus::Skipped;
        task.completed_at = Some(Utc::now());
        task.logs.push(format!("DependencyUnmet: skipped, {reason}"));
        tracing::info!(recovery_id = %self.recovery_id, task_id = %task_id, reason = %reason, "task skipped");
        telemetry::task_finished("skipped");
        self.commit(task).await;
    }

    async fn dispatch(&mut self, task_id: &str, permit: tokio::sync::OwnedSemaphorePermit) {
        let Some(mut task) = self.entry.instance.read().task(task_id).cloned() else {
            return;
        };
        task.status = TaskStatus::InProgress;
        task.started_at = Some(Utc::now());
        tracing::info!(recovery_id = %self.recovery_id, task_id = %task_id, phase = %task.phase, "task started");
        self.commit(task.clone()).await;

        let handle = tokio::spawn(worker::run(
            Arc::clone(&self.inner),
            self.worker_ctx.clone(),
            task,
            permit,
            self.results_tx.clone(),
        ));
        self.in_flight.insert(task_id.to_string(), handle);
    }

    async fn on_result(&mut self, task: RecoveryTask) {
        self.in_flight.remove(&task.id);
        let outcome = if task.status == TaskStatus::Completed {
            "completed"
        } else {
            "failed"
        };
        telemetry::task_finished(outcome);
        self.commit(task).await;
    }

    async fn commit(&self, task: RecoveryTask) {
        let task_id = task.id.clone();
        if let Err(e) = self.entry.commit(&self.inner.persister, task).await {
            tracing::error!(recovery_id = %self.recovery_id, task_id = %task_id, error = %e, "rejected task update");
        }
    }

    /// Cancel running workers and fail the tasks they owned
    async fn interrupt(&mut self, reason: &str) {
        tracing::warn!(
            recovery_id = %self.recovery_id,
            running = self.in_flight.len(),
            reason = %reason,
            "recovery interrupted"
        );
        let handles: Vec<JoinHandle<()>> = self.in_flight.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }
        // Results that arrived before cancellation still count
        while let Ok(task) = self.results_rx.try_recv() {
            self.on_result(task).await;
        }

        let running: Vec<RecoveryTask> = self
            .entry
            .instance
            .read()
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .cloned()
            .collect();
        for mut task in running {
            task.status = TaskStatus::Failed;
            task.completed_at = Some(Utc::now());
            task.error_logs
                .push(format!("Interrupted: {reason} while the task was running"));
            task.set_flag(META_INTERRUPTED, true);
            telemetry::task_finished("interrupted");

            // Its worker is gone, so the failure hooks fire from here
            let event = self.worker_ctx.event(task);
            self.inner.callbacks.dispatch(&event);
            self.commit(event.task).await;
        }
    }
}
