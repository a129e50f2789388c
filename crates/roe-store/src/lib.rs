//! ROE Store - durable task lifecycle state
//!
//! Every status change of a recovery task is written through a
//! [`TaskStateStore`] so interrupted recoveries can be found after a restart.
//!
//! ```
//! use roe_plan::{Phase, RecoveryTask, TaskStatus};
//! use roe_store::{MemoryStore, TaskRecord, TaskStateStore};
//!
//! let store = MemoryStore::new();
//! let task = RecoveryTask::new("DB-001", "Assess database", Phase::Assessment);
//! store.upsert(&TaskRecord::new("RECOVERY-1", 0, task)).unwrap();
//! assert_eq!(store.load_by_status(TaskStatus::Pending).unwrap().len(), 1);
//! ```

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{TaskRecord, TaskStateStore};
