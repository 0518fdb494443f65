/// Postgres-backed `SessionRegistry`. Aggregate statistics that benefit
/// from queryability (question count, average response time, total
/// duration) get their own columns; `category_breakdown` has no column
/// of its own and rides inside the `final_report` JSONB blob alongside
/// the report itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use super::{InterviewSession, SessionRegistry, SessionStats, SessionStatus};
use crate::errors::CoreError;
use crate::interview::{FinalReport, InterviewDifficulty};

#[derive(Serialize, Deserialize)]
struct PersistedReport {
    report: FinalReport,
    category_breakdown: HashMap<String, usize>,
}

pub struct PostgresSessionRegistry {
    pool: PgPool,
}

impl PostgresSessionRegistry {
    pub fn new(pool: PgPool) -> Self {
        PostgresSessionRegistry { pool }
    }
}

fn difficulty_label(difficulty: InterviewDifficulty) -> &'static str {
    match difficulty {
        InterviewDifficulty::Easy => "EASY",
        InterviewDifficulty::Normal => "NORMAL",
        InterviewDifficulty::Hard => "HARD",
    }
}

fn difficulty_from_label(label: &str) -> Result<InterviewDifficulty, CoreError> {
    match label {
        "EASY" => Ok(InterviewDifficulty::Easy),
        "NORMAL" => Ok(InterviewDifficulty::Normal),
        "HARD" => Ok(InterviewDifficulty::Hard),
        other => Err(CoreError::StorageError(format!("unknown difficulty: {}", other))),
    }
}

fn row_to_session(row: &sqlx::postgres::PgRow) -> Result<InterviewSession, CoreError> {
    let status_label: String = row.try_get("status").map_err(|e| CoreError::StorageError(e.to_string()))?;
    let difficulty_label: String = row.try_get("difficulty").map_err(|e| CoreError::StorageError(e.to_string()))?;
    let total_questions: i32 = row.try_get("total_questions").map_err(|e| CoreError::StorageError(e.to_string()))?;
    let avg_response_time: Option<f64> = row.try_get("avg_response_time").map_err(|e| CoreError::StorageError(e.to_string()))?;
    let total_duration_s: Option<i64> = row.try_get("total_duration_s").map_err(|e| CoreError::StorageError(e.to_string()))?;
    let report_blob: Option<serde_json::Value> = row.try_get("final_report").map_err(|e| CoreError::StorageError(e.to_string()))?;

    let (final_report, stats) = match report_blob {
        None => (None, None),
        Some(blob) => {
            let persisted: PersistedReport = serde_json::from_value(blob)
                .map_err(|e| CoreError::StorageError(format!("corrupt final_report blob: {}", e)))?;
            let stats = SessionStats {
                total_questions: total_questions as usize,
                avg_response_time: avg_response_time.unwrap_or(0.0),
                total_duration_s: total_duration_s.unwrap_or(0),
                category_breakdown: persisted.category_breakdown,
            };
            (Some(persisted.report), Some(stats))
        }
    };

    Ok(InterviewSession {
        id: row.try_get("id").map_err(|e| CoreError::StorageError(e.to_string()))?,
        thread_id: row.try_get("thread_id").map_err(|e| CoreError::StorageError(e.to_string()))?,
        user_id: row.try_get("user_id").map_err(|e| CoreError::StorageError(e.to_string()))?,
        record_id: row.try_get("record_id").map_err(|e| CoreError::StorageError(e.to_string()))?,
        difficulty: difficulty_from_label(&difficulty_label)?,
        status: SessionStatus::from_str(&status_label).map_err(CoreError::StorageError)?,
        started_at: row.try_get("started_at").map_err(|e| CoreError::StorageError(e.to_string()))?,
        completed_at: row.try_get("completed_at").map_err(|e| CoreError::StorageError(e.to_string()))?,
        stats,
        final_report,
    })
}

#[async_trait]
impl SessionRegistry for PostgresSessionRegistry {
    async fn create(
        &self,
        thread_id: &str,
        user_id: &str,
        record_id: &str,
        difficulty: InterviewDifficulty,
    ) -> Result<InterviewSession, CoreError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO sessions (id, thread_id, user_id, record_id, difficulty, status) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&id)
        .bind(thread_id)
        .bind(user_id)
        .bind(record_id)
        .bind(difficulty_label(difficulty))
        .bind(SessionStatus::InProgress.label())
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        self.get(thread_id).await
    }

    async fn complete(&self, thread_id: &str, stats: SessionStats, report: FinalReport) -> Result<(), CoreError> {
        let blob = serde_json::to_value(PersistedReport {
            report,
            category_breakdown: stats.category_breakdown,
        })
        .map_err(|e| CoreError::StorageError(format!("failed to serialize final report: {}", e)))?;

        let result = sqlx::query(
            "UPDATE sessions SET status = $1, completed_at = now(), total_questions = $2, \
             avg_response_time = $3, total_duration_s = $4, final_report = $5 WHERE thread_id = $6",
        )
        .bind(SessionStatus::Completed.label())
        .bind(stats.total_questions as i32)
        .bind(stats.avg_response_time)
        .bind(stats.total_duration_s)
        .bind(&blob)
        .bind(thread_id)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("session {}", thread_id)));
        }
        Ok(())
    }

    async fn abandon(&self, thread_id: &str) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE sessions SET status = $1, completed_at = now() WHERE thread_id = $2")
            .bind(SessionStatus::Abandoned.label())
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StorageError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("session {}", thread_id)));
        }
        Ok(())
    }

    async fn get(&self, thread_id: &str) -> Result<InterviewSession, CoreError> {
        let row = sqlx::query(
            "SELECT id, thread_id, user_id, record_id, difficulty, status, started_at, completed_at, \
             total_questions, avg_response_time, total_duration_s, final_report \
             FROM sessions WHERE thread_id = $1",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?
        .ok_or_else(|| CoreError::not_found(format!("session {}", thread_id)))?;

        row_to_session(&row)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<InterviewSession>, CoreError> {
        let rows = sqlx::query(
            "SELECT id, thread_id, user_id, record_id, difficulty, status, started_at, completed_at, \
             total_questions, avg_response_time, total_duration_s, final_report \
             FROM sessions WHERE user_id = $1 ORDER BY started_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        rows.iter().map(row_to_session).collect()
    }
}
