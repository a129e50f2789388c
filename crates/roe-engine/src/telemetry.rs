//! Tracing setup and metric names

use tracing_subscriber::EnvFilter;

/// Counter: recoveries initiated
pub const RECOVERIES_STARTED: &str = "roe_recoveries_started_total";
/// Counter: tasks reaching a terminal status, labelled by `outcome`
pub const TASKS_FINISHED: &str = "roe_tasks_finished_total";
/// Counter: per-task rollback attempts, labelled by `outcome`
pub const ROLLBACKS: &str = "roe_rollbacks_total";
/// Counter: store writes abandoned after retries
pub const PERSISTENCE_FAILURES: &str = "roe_persistence_failures_total";

/// Install a fmt subscriber filtered by `RUST_LOG`, or `default_directive`
/// when it is unset
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

pub(crate) fn recovery_started(system_type: &str) {
    metrics::counter!(RECOVERIES_STARTED, "system_type" => system_type.to_string()).increment(1);
}

pub(crate) fn task_finished(outcome: &'static str) {
    metrics::counter!(TASKS_FINISHED, "outcome" => outcome).increment(1);
}

pub(crate) fn rollback(outcome: &'static str) {
    metrics::counter!(ROLLBACKS, "outcome" => outcome).increment(1);
}

pub(crate) fn persistence_failure() {
    metrics::counter!(PERSISTENCE_FAILURES).increment(1);
}
