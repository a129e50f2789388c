//! ROE Runner - executes the side effects of recovery tasks
//!
//! The engine treats actions as opaque. This crate provides:
//! - [`ActionRunner`]: the seam for swapping execution backends
//! - [`execute_sequence`]: ordered, fail-fast execution with per-action deadlines
//! - [`ShellRunner`], [`HttpRunner`], [`NoopRunner`] and the routing [`DispatchRunner`]

pub mod error;
pub mod http;
pub mod runner;
pub mod sequence;
pub mod shell;

pub use error::RunnerError;
pub use http::HttpRunner;
pub use runner::{ActionOutput, ActionRunner, DispatchRunner, NoopRunner};
pub use sequence::{
    execute_sequence, ActionFailure, SequenceKind, SequenceOutcome, ACTION_TIMEOUT_MARKER,
};
pub use shell::ShellRunner;
