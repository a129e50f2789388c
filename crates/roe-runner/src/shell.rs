//! Shell command runner

use crate::error::RunnerError;
use crate::runner::{ActionOutput, ActionRunner};
use roe_plan::Action;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Runs `Action::Shell` through `sh -c`
///
/// The child is killed when the future is dropped, which is how an action
/// deadline cancels a running command.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: PathBuf,
    workdir: Option<PathBuf>,
}

impl ShellRunner {
    /// Runner using `/bin/sh`
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
            workdir: None,
        }
    }

    /// Use another POSIX shell
    #[inline]
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Run commands from `dir`
    #[inline]
    #[must_use]
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ActionRunner for ShellRunner {
    async fn run(&self, action: &Action) -> Result<ActionOutput, RunnerError> {
        let Action::Shell { command } = action else {
            return Err(RunnerError::Unsupported(action.kind()));
        };

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        tracing::debug!(command = %command, "spawning shell action");
        let output = cmd.output().await?;

        Ok(ActionOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
