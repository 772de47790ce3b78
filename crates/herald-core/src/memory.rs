//! In-process document store backed by a `DashMap`

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;

use crate::store::{DocumentStore, StoreError};

/// Volatile [`DocumentStore`]; contents are lost when the process exits
#[derive(Default)]
pub struct MemoryDocumentStore {
    records: DashMap<String, Value>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.records.get(id).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<Value>, StoreError> {
        let mut rows: Vec<(String, Value)> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows.into_iter().map(|(_, value)| value).collect())
    }

    async fn create_if_absent(&self, id: &str, record: Value) -> Result<(), StoreError> {
        match self.records.entry(id.to_string()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn update(&self, id: &str, record: Value) -> Result<(), StoreError> {
        self.records.insert(id.to_string(), record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.records.remove(id);
        Ok(())
    }
}
