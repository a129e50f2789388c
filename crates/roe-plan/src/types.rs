//! Core enums of the recovery model
//!
//! Defines the fixed vocabulary shared by every crate:
//! - Recovery phases and their total order
//! - Priority and criticality tiers
//! - Task lifecycle states
//! - Action kinds executed by an action runner

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the five fixed recovery stages
///
/// Variants are declared in execution order, so `Ord` follows the phase
/// sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Establish what is broken
    Assessment,
    /// Stop the damage from spreading
    Containment,
    /// Remove the root cause
    Eradication,
    /// Restore service
    Recovery,
    /// Follow-up and hardening
    PostIncident,
}

impl Phase {
    /// All phases in execution order
    pub const ALL: [Phase; 5] = [
        Phase::Assessment,
        Phase::Containment,
        Phase::Eradication,
        Phase::Recovery,
        Phase::PostIncident,
    ];

    /// Phase that follows this one, `None` after `PostIncident`
    #[inline]
    #[must_use]
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Assessment => Some(Phase::Containment),
            Phase::Containment => Some(Phase::Eradication),
            Phase::Eradication => Some(Phase::Recovery),
            Phase::Recovery => Some(Phase::PostIncident),
            Phase::PostIncident => None,
        }
    }

    /// Stable lowercase name, used for persistence
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Assessment => "assessment",
            Phase::Containment => "containment",
            Phase::Eradication => "eradication",
            Phase::Recovery => "recovery",
            Phase::PostIncident => "post_incident",
        }
    }

    /// Inverse of [`Phase::as_str`]
    #[must_use]
    pub fn parse(s: &str) -> Option<Phase> {
        Phase::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering tier inside a phase (lower value runs first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Tier 1
    Immediate = 1,
    /// Tier 2
    High = 2,
    /// Tier 3
    Normal = 3,
    /// Tier 4
    Low = 4,
}

impl Priority {
    /// Numeric tier
    #[inline]
    #[must_use]
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Build from a numeric tier
    #[must_use]
    pub fn from_value(value: u8) -> Option<Priority> {
        match value {
            1 => Some(Priority::Immediate),
            2 => Some(Priority::High),
            3 => Some(Priority::Normal),
            4 => Some(Priority::Low),
            _ => None,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Business criticality of a recoverable system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Outage stops the business
    Critical,
    /// Major degradation
    High,
    /// Partial degradation
    Medium,
    /// Cosmetic
    Low,
}

/// Lifecycle state of a task instance
///
/// `Completed`, `Failed` and `Skipped` are terminal for forward execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet dispatched
    Pending,
    /// Owned by a worker
    InProgress,
    /// Every forward action succeeded
    Completed,
    /// An action failed or timed out
    Failed,
    /// Not executed because a dependency did not complete
    Skipped,
}

impl TaskStatus {
    /// Whether forward execution of the task has finished
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    /// Stable lowercase name, used for persistence
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }

    /// Inverse of [`TaskStatus::as_str`]
    #[must_use]
    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "skipped" => Some(TaskStatus::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single declarative unit of side-effecting work
///
/// The engine never interprets an action; it hands it to an action runner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Shell command line, run through `sh -c`
    Shell {
        /// Command line
        command: String,
    },
    /// HTTP request whose response status decides success
    Http {
        /// Request method (`GET`, `POST`, ...)
        method: String,
        /// Target URL
        url: String,
        /// Status code that counts as success
        expect_status: u16,
    },
    /// Does nothing and always succeeds
    Noop {
        /// Free-form label shown in logs
        label: String,
    },
}

impl Action {
    /// Shell action shorthand
    #[inline]
    #[must_use]
    pub fn shell(command: impl Into<String>) -> Self {
        Action::Shell {
            command: command.into(),
        }
    }

    /// `GET url` expecting `200`
    #[inline]
    #[must_use]
    pub fn http_get(url: impl Into<String>) -> Self {
        Action::Http {
            method: "GET".to_string(),
            url: url.into(),
            expect_status: 200,
        }
    }

    /// No-op shorthand
    #[inline]
    #[must_use]
    pub fn noop(label: impl Into<String>) -> Self {
        Action::Noop {
            label: label.into(),
        }
    }

    /// Kind tag, for logs and routing
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Shell { .. } => "shell",
            Action::Http { .. } => "http",
            Action::Noop { .. } => "noop",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Shell { command } => f.write_str(command),
            Action::Http { method, url, .. } => write!(f, "{method} {url}"),
            Action::Noop { label } => write!(f, "noop({label})"),
        }
    }
}
