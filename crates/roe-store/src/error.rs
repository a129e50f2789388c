//! Error types for the task state store

/// Task state store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite reported an error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database location could not be prepared
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON column could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row holds a value the model does not know
    #[error("corrupt record {recovery_id}/{task_id}: {reason}")]
    Corrupt {
        /// Owning recovery
        recovery_id: String,
        /// Task id
        task_id: String,
        /// What was wrong
        reason: String,
    },

    /// The backend is temporarily unable to accept writes
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Check if a retry may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_retryable() {
        assert!(StoreError::Unavailable("down".into()).is_retryable());
        let corrupt = StoreError::Corrupt {
            recovery_id: "R".into(),
            task_id: "T".into(),
            reason: "bad phase".into(),
        };
        assert!(!corrupt.is_retryable());
        assert!(corrupt.to_string().contains("R/T"));
    }
}
