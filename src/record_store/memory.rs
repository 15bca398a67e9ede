//! In-memory record store implementation.
//!
//! This module provides [`MemoryRecordStore`], a thread-safe in-memory
//! implementation of [`RecordStore`] suitable for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::RecordStore;
use crate::{Result, SignoffError, TaskFlow, TaskRecord};

/// Internal storage for the memory record store.
#[derive(Debug, Default)]
struct Storage {
    /// Flow records indexed by flow id.
    flows: HashMap<String, TaskFlow>,
    /// Task records indexed by flow id, then tag.
    tasks: HashMap<String, HashMap<String, TaskRecord>>,
    /// Task id → (flow id, tag) index for lookups by record id.
    task_index: HashMap<String, (String, String)>,
}

/// An in-memory implementation of [`RecordStore`].
///
/// This implementation uses `Arc<RwLock<...>>` internally, making it safe
/// to clone and share across async tasks. Multiple readers can access the
/// store concurrently, but writers get exclusive access.
///
/// All data is lost when the last clone is dropped; use the SQLite store
/// when records must survive restarts.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    storage: Arc<RwLock<Storage>>,
}

impl MemoryRecordStore {
    /// Creates a new, empty in-memory record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored flows.
    ///
    /// Useful for testing.
    pub async fn flow_count(&self) -> usize {
        self.storage.read().await.flows.len()
    }

    /// Returns the total number of stored task records.
    ///
    /// Useful for testing.
    pub async fn task_count(&self) -> usize {
        self.storage
            .read()
            .await
            .tasks
            .values()
            .map(|records| records.len())
            .sum()
    }

    /// Clears all stored data.
    ///
    /// Useful for resetting state between tests.
    pub async fn clear(&self) {
        let mut storage = self.storage.write().await;
        storage.flows.clear();
        storage.tasks.clear();
        storage.task_index.clear();
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_flow(&mut self, flow: &TaskFlow) -> Result<()> {
        let mut storage = self.storage.write().await;
        if storage.flows.contains_key(&flow.id) {
            return Err(SignoffError::Store(format!(
                "flow {} already exists",
                flow.id
            )));
        }
        storage.flows.insert(flow.id.clone(), flow.clone());
        Ok(())
    }

    async fn flow_by_id(&self, id: &str) -> Result<Option<TaskFlow>> {
        let storage = self.storage.read().await;
        Ok(storage.flows.get(id).cloned())
    }

    async fn update_flow(&mut self, flow: &TaskFlow) -> Result<()> {
        let mut storage = self.storage.write().await;
        match storage.flows.get_mut(&flow.id) {
            Some(existing) => {
                *existing = flow.clone();
                Ok(())
            }
            None => Err(SignoffError::Store(format!("no such flow: {}", flow.id))),
        }
    }

    async fn list_flows(&self) -> Result<Vec<String>> {
        let storage = self.storage.read().await;
        let mut ids: Vec<String> = storage.flows.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn insert_task(&mut self, record: &TaskRecord) -> Result<()> {
        let mut storage = self.storage.write().await;
        if storage.task_index.contains_key(&record.id) {
            return Err(SignoffError::Store(format!(
                "task record {} already exists",
                record.id
            )));
        }
        let records = storage.tasks.entry(record.flow_id.clone()).or_default();
        if records.contains_key(&record.tag) {
            return Err(SignoffError::Store(format!(
                "task {} already exists in flow {}",
                record.tag, record.flow_id
            )));
        }
        records.insert(record.tag.clone(), record.clone());
        storage
            .task_index
            .insert(record.id.clone(), (record.flow_id.clone(), record.tag.clone()));
        Ok(())
    }

    async fn task_by_id(&self, id: &str) -> Result<Option<TaskRecord>> {
        let storage = self.storage.read().await;
        Ok(storage.task_index.get(id).and_then(|(flow_id, tag)| {
            storage
                .tasks
                .get(flow_id)
                .and_then(|records| records.get(tag))
                .cloned()
        }))
    }

    async fn task_by_tag(&self, flow_id: &str, tag: &str) -> Result<Option<TaskRecord>> {
        let storage = self.storage.read().await;
        Ok(storage
            .tasks
            .get(flow_id)
            .and_then(|records| records.get(tag))
            .cloned())
    }

    async fn update_task(&mut self, record: &TaskRecord) -> Result<()> {
        let mut storage = self.storage.write().await;
        let (flow_id, tag) = storage
            .task_index
            .get(&record.id)
            .cloned()
            .ok_or_else(|| SignoffError::Store(format!("no such task record: {}", record.id)))?;
        let slot = storage
            .tasks
            .get_mut(&flow_id)
            .and_then(|records| records.get_mut(&tag))
            .ok_or_else(|| SignoffError::Store(format!("no such task record: {}", record.id)))?;
        *slot = record.clone();
        Ok(())
    }

    async fn tasks_for_flow(&self, flow_id: &str) -> Result<Vec<TaskRecord>> {
        let storage = self.storage.read().await;
        let mut records: Vec<TaskRecord> = storage
            .tasks
            .get(flow_id)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.tag.cmp(&b.tag)));
        Ok(records)
    }
}
