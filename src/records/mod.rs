/// Record registry: the uploaded life-record PDF and its ingestion
/// lifecycle. Grounded on `store/mod.rs`'s `MemoryStore` CRUD shape,
/// narrowed to the fields a `Record` actually needs.

pub mod postgres;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl RecordStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "PENDING",
            RecordStatus::Processing => "PROCESSING",
            RecordStatus::Ready => "READY",
            RecordStatus::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RecordStatus::Pending),
            "PROCESSING" => Ok(RecordStatus::Processing),
            "READY" => Ok(RecordStatus::Ready),
            "FAILED" => Ok(RecordStatus::Failed),
            other => Err(format!("unknown record status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub blob_key: String,
    pub status: RecordStatus,
    pub failure_reason: Option<String>,
}

/// Owning abstraction over the `records` table. `VectorStore::delete_by_record`
/// handles the chunk cascade; `delete` here cascades question sets and
/// sessions too, so deleting a record leaves nothing orphaned downstream.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, user_id: &str, title: &str, blob_key: &str) -> Result<Record, CoreError>;
    async fn get(&self, record_id: &str) -> Result<Record, CoreError>;
    async fn set_status(&self, record_id: &str, status: RecordStatus, failure_reason: Option<&str>) -> Result<(), CoreError>;
    async fn delete(&self, record_id: &str) -> Result<(), CoreError>;
}
