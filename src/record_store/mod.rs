//! Record storage for the Signoff approval engine.
//!
//! This module provides the [`RecordStore`] trait for persisting flow and
//! task records, along with concrete implementations:
//!
//! - [`MemoryRecordStore`]: Thread-safe in-memory storage for
//!   testing/development
//! - `SqliteRecordStore`: SQLite-backed storage (cargo feature `sqlite`)
//!
//! The engine performs no I/O of its own; every durable state transition
//! goes through this trait. Stores own their durability and any
//! transactional guarantees the host wants beyond what the engine
//! provides.
//!
//! # Example
//!
//! ```
//! use signoff::{MemoryRecordStore, RecordStore, TaskRecord};
//! # use async_trait::async_trait;
//! # #[derive(Debug)]
//! # struct Gate;
//! # #[async_trait]
//! # impl signoff::Task for Gate {
//! #     fn kind(&self) -> &str { "gate" }
//! #     fn tag(&self) -> String { "gate:1".to_string() }
//! # }
//!
//! # async fn example() -> signoff::Result<()> {
//! let mut store = MemoryRecordStore::new();
//!
//! let mut record = TaskRecord::new("flow-1", &Gate);
//! store.insert_task(&record).await?;
//!
//! record.mark_approved();
//! store.update_task(&record).await?;
//!
//! let loaded = store.task_by_tag("flow-1", "gate:1").await?;
//! assert!(loaded.unwrap().approved);
//! # Ok(())
//! # }
//! ```

mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryRecordStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRecordStore;

use async_trait::async_trait;

use crate::{Result, TaskFlow, TaskRecord};

/// A trait for persisting and retrieving flow and task records.
///
/// Absence is reported as `Ok(None)`, never as an error; the resolver
/// treats a missing task record as "not yet discovered". Updates require a
/// previously inserted record and fail otherwise, which surfaces engine
/// bugs instead of silently resurrecting deleted state.
///
/// # Object Safety
///
/// This trait is object-safe, allowing for dynamic dispatch with
/// `dyn RecordStore`, so storage backends can be swapped at runtime.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts a new flow record.
    ///
    /// # Errors
    ///
    /// Fails if a flow with the same id already exists or the store is
    /// unavailable.
    async fn insert_flow(&mut self, flow: &TaskFlow) -> Result<()>;

    /// Retrieves a flow record by id.
    async fn flow_by_id(&self, id: &str) -> Result<Option<TaskFlow>>;

    /// Updates an existing flow record.
    ///
    /// # Errors
    ///
    /// Fails if no flow with this id was ever inserted.
    async fn update_flow(&mut self, flow: &TaskFlow) -> Result<()>;

    /// Lists the ids of all stored flows, sorted.
    async fn list_flows(&self) -> Result<Vec<String>>;

    /// Inserts a new task record.
    ///
    /// # Errors
    ///
    /// Fails if a record with the same `(flow_id, tag)` or the same id
    /// already exists.
    async fn insert_task(&mut self, record: &TaskRecord) -> Result<()>;

    /// Retrieves a task record by its store-wide id.
    async fn task_by_id(&self, id: &str) -> Result<Option<TaskRecord>>;

    /// Retrieves a task record by its compound key.
    async fn task_by_tag(&self, flow_id: &str, tag: &str) -> Result<Option<TaskRecord>>;

    /// Updates an existing task record, keyed by its id.
    ///
    /// # Errors
    ///
    /// Fails if no record with this id was ever inserted.
    async fn update_task(&mut self, record: &TaskRecord) -> Result<()>;

    /// Retrieves all task records of a flow, sorted by creation time.
    async fn tasks_for_flow(&self, flow_id: &str) -> Result<Vec<TaskRecord>>;
}
