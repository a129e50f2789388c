//! SQLite-backed store
//!
//! One row per task instance in `recovery_tasks`, list and map fields as JSON
//! text, timestamps as RFC 3339. A single connection behind a mutex
//! serializes writes.

use crate::error::StoreError;
use crate::traits::{TaskRecord, TaskStateStore};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use roe_plan::{Phase, Priority, RecoveryTask, TaskStatus};
use std::path::Path;
use std::time::Duration;

const SELECT_COLUMNS: &str = "recovery_id, id, seq, name, description, phase, priority, \
     estimated_duration, dependencies, actions, rollback_actions, status, assigned_to, \
     created_at, started_at, completed_at, logs, error_logs, metadata";

/// Task state store persisted in a SQLite database
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and apply the schema
    ///
    /// # Errors
    /// Returns `StoreError::Io` if the parent directory cannot be created,
    /// `StoreError::Sqlite` if the file cannot be opened or the schema cannot
    /// be applied.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        tracing::debug!(path = %db_path.display(), "opened task state database");
        Self::init(conn)
    }

    /// Open a private in-memory database
    ///
    /// # Errors
    /// Returns `StoreError::Sqlite` if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(include_str!("../migrations/0001_init.sql"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query(&self, sql: &str, param: &str) -> Result<Vec<TaskRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([param], RawRow::read)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_record()?);
        }
        Ok(out)
    }
}

impl TaskStateStore for SqliteStore {
    fn upsert(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let task = &record.task;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO recovery_tasks (
                recovery_id, id, seq, name, description, phase, priority, estimated_duration,
                dependencies, actions, rollback_actions, status, assigned_to,
                created_at, started_at, completed_at, logs, error_logs, metadata
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
             ON CONFLICT(recovery_id, id) DO UPDATE SET
                seq = excluded.seq,
                name = excluded.name,
                description = excluded.description,
                phase = excluded.phase,
                priority = excluded.priority,
                estimated_duration = excluded.estimated_duration,
                dependencies = excluded.dependencies,
                actions = excluded.actions,
                rollback_actions = excluded.rollback_actions,
                status = excluded.status,
                assigned_to = excluded.assigned_to,
                created_at = excluded.created_at,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                logs = excluded.logs,
                error_logs = excluded.error_logs,
                metadata = excluded.metadata",
            params![
                record.recovery_id,
                task.id,
                record.seq,
                task.name,
                task.description,
                task.phase.as_str(),
                task.priority.value(),
                task.estimated_duration_minutes,
                serde_json::to_string(&task.dependencies)?,
                serde_json::to_string(&task.actions)?,
                serde_json::to_string(&task.rollback_actions)?,
                task.status.as_str(),
                task.assigned_to,
                ts(task.created_at),
                task.started_at.map(ts),
                task.completed_at.map(ts),
                serde_json::to_string(&task.logs)?,
                serde_json::to_string(&task.error_logs)?,
                serde_json::to_string(&task.metadata)?,
            ],
        )?;
        Ok(())
    }

    fn load(&self, recovery_id: &str, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM recovery_tasks WHERE recovery_id = ?1 AND id = ?2"),
                params![recovery_id, task_id],
                RawRow::read,
            )
            .optional()?;
        raw.map(RawRow::into_record).transpose()
    }

    fn load_by_recovery(&self, recovery_id: &str) -> Result<Vec<TaskRecord>, StoreError> {
        self.query(
            &format!("SELECT {SELECT_COLUMNS} FROM recovery_tasks WHERE recovery_id = ?1 ORDER BY seq"),
            recovery_id,
        )
    }

    fn load_by_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>, StoreError> {
        self.query(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM recovery_tasks WHERE status = ?1 ORDER BY recovery_id, seq"
            ),
            status.as_str(),
        )
    }
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Row as stored, before JSON and enum decoding
struct RawRow {
    recovery_id: String,
    id: String,
    seq: u32,
    name: String,
    description: String,
    phase: String,
    priority: u8,
    estimated_duration: u32,
    dependencies: String,
    actions: String,
    rollback_actions: String,
    status: String,
    assigned_to: String,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    logs: String,
    error_logs: String,
    metadata: String,
}

impl RawRow {
    fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            recovery_id: r.get(0)?,
            id: r.get(1)?,
            seq: r.get(2)?,
            name: r.get(3)?,
            description: r.get(4)?,
            phase: r.get(5)?,
            priority: r.get(6)?,
            estimated_duration: r.get(7)?,
            dependencies: r.get(8)?,
            actions: r.get(9)?,
            rollback_actions: r.get(10)?,
            status: r.get(11)?,
            assigned_to: r.get(12)?,
            created_at: r.get(13)?,
            started_at: r.get(14)?,
            completed_at: r.get(15)?,
            logs: r.get(16)?,
            error_logs: r.get(17)?,
            metadata: r.get(18)?,
        })
    }

    fn corrupt(&self, reason: impl Into<String>) -> StoreError {
        StoreError::Corrupt {
            recovery_id: self.recovery_id.clone(),
            task_id: self.id.clone(),
            reason: reason.into(),
        }
    }

    fn time(&self, value: &str) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(value)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| self.corrupt(format!("bad timestamp {value}: {e}")))
    }

    fn into_record(self) -> Result<TaskRecord, StoreError> {
        let phase = Phase::parse(&self.phase)
            .ok_or_else(|| self.corrupt(format!("unknown phase {}", self.phase)))?;
        let status = TaskStatus::parse(&self.status)
            .ok_or_else(|| self.corrupt(format!("unknown status {}", self.status)))?;
        let priority = Priority::from_value(self.priority)
            .ok_or_else(|| self.corrupt(format!("unknown priority {}", self.priority)))?;
        let created_at = self.time(&self.created_at)?;
        let started_at = self.started_at.as_deref().map(|t| self.time(t)).transpose()?;
        let completed_at = self.completed_at.as_deref().map(|t| self.time(t)).transpose()?;

        let task = RecoveryTask {
            id: self.id,
            name: self.name,
            description: self.description,
            phase,
            priority,
            estimated_duration_minutes: self.estimated_duration,
            dependencies: serde_json::from_str(&self.dependencies)?,
            actions: serde_json::from_str(&self.actions)?,
            rollback_actions: serde_json::from_str(&self.rollback_actions)?,
            status,
            assigned_to: self.assigned_to,
            created_at,
            started_at,
            completed_at,
            logs: serde_json::from_str(&self.logs)?,
            error_logs: serde_json::from_str(&self.error_logs)?,
            metadata: serde_json::from_str(&self.metadata)?,
        };
        Ok(TaskRecord::new(self.recovery_id, self.seq, task))
    }
}
