//! The action runner seam
//!
//! Implement [`ActionRunner`] to define how a single action is carried out.
//! Sequencing, fail-fast and deadlines live in [`crate::execute_sequence`],
//! so every runner gets the same semantics.

use crate::error::RunnerError;
use crate::http::HttpRunner;
use crate::shell::ShellRunner;
use roe_plan::Action;

/// Captured result of one action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
    /// Whether the action reported success
    pub success: bool,
    /// Process exit code or HTTP status, when there is one
    pub exit_code: Option<i32>,
    /// Captured standard output / response body
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ActionOutput {
    /// Successful output with no captured text
    #[inline]
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            ..Self::default()
        }
    }

    /// Failed output with an exit code
    #[inline]
    #[must_use]
    pub fn failed(exit_code: i32) -> Self {
        Self {
            success: false,
            exit_code: Some(exit_code),
            ..Self::default()
        }
    }

    /// With captured stdout
    #[inline]
    #[must_use]
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// With captured stderr
    #[inline]
    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }
}

/// Executes a single side-effecting action
#[async_trait::async_trait]
pub trait ActionRunner: Send + Sync {
    /// Run `action` to completion
    ///
    /// Implementations must be cancel-safe: the caller drops the future when
    /// the action deadline passes.
    async fn run(&self, action: &Action) -> Result<ActionOutput, RunnerError>;
}

/// Runner that succeeds without doing anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRunner;

#[async_trait::async_trait]
impl ActionRunner for NoopRunner {
    async fn run(&self, _action: &Action) -> Result<ActionOutput, RunnerError> {
        Ok(ActionOutput::ok())
    }
}

/// Routes each action kind to the runner that handles it
#[derive(Debug, Clone, Default)]
pub struct DispatchRunner {
    shell: ShellRunner,
    http: HttpRunner,
}

impl DispatchRunner {
    /// Create with default shell and HTTP runners
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom runners
    #[inline]
    #[must_use]
    pub fn with_runners(shell: ShellRunner, http: HttpRunner) -> Self {
        Self { shell, http }
    }
}

#[async_trait::async_trait]
impl ActionRunner for DispatchRunner {
    async fn run(&self, action: &Action) -> Result<ActionOutput, RunnerError> {
        match action {
            Action::Shell { .. } => self.shell.run(action).await,
            Action::Http { .. } => self.http.run(action).await,
            Action::Noop { .. } => Ok(ActionOutput::ok()),
        }
    }
}
