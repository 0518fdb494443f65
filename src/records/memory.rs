/// In-memory `RecordStore` double used by ingestion/qgen/orchestrator tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{Record, RecordStatus, RecordStore};
use crate::errors::CoreError;

#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<String, Record>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        InMemoryRecordStore::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(&self, user_id: &str, title: &str, blob_key: &str) -> Result<Record, CoreError> {
        let record = Record {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            blob_key: blob_key.to_string(),
            status: RecordStatus::Pending,
            failure_reason: None,
        };
        self.records
            .lock()
            .expect("record store lock poisoned")
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, record_id: &str) -> Result<Record, CoreError> {
        self.records
            .lock()
            .expect("record store lock poisoned")
            .get(record_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("record {}", record_id)))
    }

    async fn set_status(&self, record_id: &str, status: RecordStatus, failure_reason: Option<&str>) -> Result<(), CoreError> {
        let mut guard = self.records.lock().expect("record store lock poisoned");
        let record = guard
            .get_mut(record_id)
            .ok_or_else(|| CoreError::not_found(format!("record {}", record_id)))?;
        record.status = status;
        record.failure_reason = failure_reason.map(|s| s.to_string());
        Ok(())
    }

    async fn delete(&self, record_id: &str) -> Result<(), CoreError> {
        self.records.lock().expect("record store lock poisoned").remove(record_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryRecordStore::new();
        let record = store.create("u1", "My life record", "users/u1/records/x.pdf").await.unwrap();
        let fetched = store.get(&record.id).await.unwrap();
        assert_eq!(fetched.status, RecordStatus::Pending);
        assert_eq!(fetched.title, "My life record");
    }

    #[tokio::test]
    async fn set_status_transitions() {
        let store = InMemoryRecordStore::new();
        let record = store.create("u1", "t", "k").await.unwrap();
        store.set_status(&record.id, RecordStatus::Ready, None).await.unwrap();
        let fetched = store.get(&record.id).await.unwrap();
        assert_eq!(fetched.status, RecordStatus::Ready);
    }
}
