//! SQLite-backed record store implementation.
//!
//! This module provides [`SqliteRecordStore`], a persistent implementation
//! of [`RecordStore`] backed by SQLite.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::RecordStore;
use crate::{Result, SignoffError, TaskFlow, TaskRecord};

/// Schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

/// SQL for creating the flows table.
const CREATE_FLOWS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS flows (
        flow_id TEXT NOT NULL PRIMARY KEY,
        flow_json TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
"#;

/// SQL for creating the task_records table.
const CREATE_TASK_RECORDS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS task_records (
        task_id TEXT NOT NULL PRIMARY KEY,
        flow_id TEXT NOT NULL,
        tag TEXT NOT NULL,
        record_json TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (flow_id, tag)
    )
"#;

/// SQL for creating the schema_version table.
const CREATE_SCHEMA_VERSION_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    )
"#;

/// Index on task_records for querying all records of a flow.
const CREATE_FLOW_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_task_flow_id
    ON task_records (flow_id)
"#;

/// A SQLite-backed implementation of [`RecordStore`].
///
/// This store persists flow and task records to a SQLite database, making
/// it suitable for hosts where approval state must survive process
/// restarts — the normal case for a workflow that suspends for days while
/// a clerk decides.
///
/// # Thread Safety
///
/// The store wraps the SQLite connection in a `Mutex` and uses
/// `spawn_blocking` for all database operations, making it safe for use in
/// async contexts.
///
/// # Example
///
/// ```rust,ignore
/// use signoff::SqliteRecordStore;
///
/// // Open or create a database file
/// let store = SqliteRecordStore::open("approvals.db").await?;
///
/// // Or use an in-memory database for testing
/// let store = SqliteRecordStore::open_in_memory().await?;
/// ```
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Opens a SQLite database at the given path.
    ///
    /// Creates the database and schema if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be created.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let conn = tokio::task::spawn_blocking(move || Connection::open(&path))
            .await
            .map_err(|e| SignoffError::Store(format!("spawn_blocking failed: {}", e)))?
            .map_err(|e| SignoffError::Database(format!("failed to open database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.run_migrations().await?;
        Ok(store)
    }

    /// Opens an in-memory SQLite database.
    ///
    /// Useful for testing. The database is lost when the store is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio::task::spawn_blocking(Connection::open_in_memory)
            .await
            .map_err(|e| SignoffError::Store(format!("spawn_blocking failed: {}", e)))?
            .map_err(|e| {
                SignoffError::Database(format!("failed to open in-memory database: {}", e))
            })?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.run_migrations().await?;
        Ok(store)
    }

    /// Runs schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(CREATE_SCHEMA_VERSION_TABLE, [])?;

            let version: Option<i32> = conn
                .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                    row.get(0)
                })
                .ok();

            if version.is_none() || version.unwrap() < SCHEMA_VERSION {
                conn.execute(CREATE_FLOWS_TABLE, [])?;
                conn.execute(CREATE_TASK_RECORDS_TABLE, [])?;
                conn.execute(CREATE_FLOW_INDEX, [])?;

                conn.execute("DELETE FROM schema_version", [])?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )?;
            }

            Ok(())
        })
        .await
    }

    /// Runs a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> std::result::Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await
        .map_err(|e| SignoffError::Store(format!("spawn_blocking failed: {}", e)))?
        .map_err(|e| SignoffError::Database(e.to_string()))
    }
}

// Debug implementation that doesn't expose connection details
impl std::fmt::Debug for SqliteRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecordStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert_flow(&mut self, flow: &TaskFlow) -> Result<()> {
        let flow_id = flow.id.clone();
        let flow_json = serde_json::to_string(flow)?;
        let updated_at = chrono::Utc::now().to_rfc3339();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO flows (flow_id, flow_json, updated_at) VALUES (?1, ?2, ?3)",
                params![flow_id, flow_json, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn flow_by_id(&self, id: &str) -> Result<Option<TaskFlow>> {
        let id = id.to_string();

        let flow_json: Option<String> = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT flow_json FROM flows WHERE flow_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;

        match flow_json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn update_flow(&mut self, flow: &TaskFlow) -> Result<()> {
        let flow_id = flow.id.clone();
        let flow_json = serde_json::to_string(flow)?;
        let updated_at = chrono::Utc::now().to_rfc3339();

        let changed = self
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE flows SET flow_json = ?2, updated_at = ?3 WHERE flow_id = ?1",
                    params![flow_id, flow_json, updated_at],
                )
            })
            .await?;

        if changed == 0 {
            return Err(SignoffError::Store(format!("no such flow: {}", flow.id)));
        }
        Ok(())
    }

    async fn list_flows(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT flow_id FROM flows ORDER BY flow_id")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        })
        .await
    }

    async fn insert_task(&mut self, record: &TaskRecord) -> Result<()> {
        let task_id = record.id.clone();
        let flow_id = record.flow_id.clone();
        let tag = record.tag.clone();
        let record_json = serde_json::to_string(record)?;
        let created_at = record.created_at.to_rfc3339();
        let updated_at = chrono::Utc::now().to_rfc3339();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO task_records (task_id, flow_id, tag, record_json, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![task_id, flow_id, tag, record_json, created_at, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn task_by_id(&self, id: &str) -> Result<Option<TaskRecord>> {
        let id = id.to_string();

        let record_json: Option<String> = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT record_json FROM task_records WHERE task_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;

        match record_json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn task_by_tag(&self, flow_id: &str, tag: &str) -> Result<Option<TaskRecord>> {
        let flow_id = flow_id.to_string();
        let tag = tag.to_string();

        let record_json: Option<String> = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT record_json FROM task_records WHERE flow_id = ?1 AND tag = ?2",
                    params![flow_id, tag],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;

        match record_json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn update_task(&mut self, record: &TaskRecord) -> Result<()> {
        let task_id = record.id.clone();
        let record_json = serde_json::to_string(record)?;
        let updated_at = chrono::Utc::now().to_rfc3339();

        let changed = self
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE task_records SET record_json = ?2, updated_at = ?3 WHERE task_id = ?1",
                    params![task_id, record_json, updated_at],
                )
            })
            .await?;

        if changed == 0 {
            return Err(SignoffError::Store(format!(
                "no such task record: {}",
                record.id
            )));
        }
        Ok(())
    }

    async fn tasks_for_flow(&self, flow_id: &str) -> Result<Vec<TaskRecord>> {
        let flow_id = flow_id.to_string();

        let rows: Vec<String> = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT record_json FROM task_records WHERE flow_id = ?1 \
                     ORDER BY created_at, tag",
                )?;
                let rows = stmt.query_map(params![flow_id], |row| row.get(0))?;
                rows.collect()
            })
            .await?;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(SignoffError::from))
            .collect()
    }
}
