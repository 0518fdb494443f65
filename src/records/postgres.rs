/// Postgres-backed `RecordStore`.

use async_trait::async_trait;
use sqlx::{postgres::PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use super::{Record, RecordStatus, RecordStore};
use crate::errors::CoreError;

pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        PostgresRecordStore { pool }
    }
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<Record, CoreError> {
    let status_label: String = row.try_get("status").map_err(|e| CoreError::StorageError(e.to_string()))?;
    Ok(Record {
        id: row.try_get("id").map_err(|e| CoreError::StorageError(e.to_string()))?,
        user_id: row.try_get("user_id").map_err(|e| CoreError::StorageError(e.to_string()))?,
        title: row.try_get("title").map_err(|e| CoreError::StorageError(e.to_string()))?,
        blob_key: row.try_get("blob_key").map_err(|e| CoreError::StorageError(e.to_string()))?,
        status: RecordStatus::from_str(&status_label).map_err(CoreError::StorageError)?,
        failure_reason: row.try_get("failure_reason").map_err(|e| CoreError::StorageError(e.to_string()))?,
    })
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn create(&self, user_id: &str, title: &str, blob_key: &str) -> Result<Record, CoreError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO records (id, user_id, title, blob_key, status) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(title)
        .bind(blob_key)
        .bind(RecordStatus::Pending.label())
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        Ok(Record {
            id,
            user_id: user_id.to_string(),
            title: title.to_string(),
            blob_key: blob_key.to_string(),
            status: RecordStatus::Pending,
            failure_reason: None,
        })
    }

    async fn get(&self, record_id: &str) -> Result<Record, CoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, title, blob_key, status, failure_reason FROM records WHERE id = $1",
        )
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?
        .ok_or_else(|| CoreError::not_found(format!("record {}", record_id)))?;

        row_to_record(&row)
    }

    async fn set_status(&self, record_id: &str, status: RecordStatus, failure_reason: Option<&str>) -> Result<(), CoreError> {
        let result = sqlx::query(
            "UPDATE records SET status = $1, failure_reason = $2, updated_at = now() WHERE id = $3",
        )
        .bind(status.label())
        .bind(failure_reason)
        .bind(record_id)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("record {}", record_id)));
        }
        Ok(())
    }

    async fn delete(&self, record_id: &str) -> Result<(), CoreError> {
        // question_sets, questions, sessions, checkpoints, and chunks all
        // carry ON DELETE CASCADE back to records.
        sqlx::query("DELETE FROM records WHERE id = $1")
            .bind(record_id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StorageError(e.to_string()))?;
        Ok(())
    }
}
