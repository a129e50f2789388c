//! Error types for action runners

/// Failure to carry out an action at all
///
/// An action that ran and reported an unsuccessful result is not an error;
/// it is an [`crate::ActionOutput`] with `success == false`.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The runner does not handle this action kind
    #[error("unsupported action kind: {0}")]
    Unsupported(&'static str),

    /// The process could not be spawned or awaited
    #[error("spawn failed: {0}")]
    Spawn(#[from] std::io::Error),

    /// The HTTP request could not be built or sent
    #[error("http request failed: {0}")]
    Http(String),
}

impl From<reqwest::Error> for RunnerError {
    fn from(value: reqwest::Error) -> Self {
        RunnerError::Http(value.to_string())
    }
}
