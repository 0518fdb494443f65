/// Postgres-backed `QuestionSetStore`. Inserts a set and its questions
/// atomically in a single transaction, mirroring `PostgresVectorStore`'s
/// per-record atomic chunk insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use super::{Difficulty, Question, QuestionSet, QuestionSetStore};
use crate::errors::CoreError;
use crate::store::Category;

pub struct PostgresQuestionSetStore {
    pool: PgPool,
}

impl PostgresQuestionSetStore {
    pub fn new(pool: PgPool) -> Self {
        PostgresQuestionSetStore { pool }
    }
}

#[async_trait]
impl QuestionSetStore for PostgresQuestionSetStore {
    async fn insert(&self, set: QuestionSet) -> Result<QuestionSet, CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::StorageError(format!("failed to start transaction: {}", e)))?;

        sqlx::query(
            "INSERT INTO question_sets (id, record_id, target_school, target_major, interview_type, title, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&set.id)
        .bind(&set.record_id)
        .bind(&set.target_school)
        .bind(&set.target_major)
        .bind(&set.interview_type)
        .bind(&set.title)
        .bind(set.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| CoreError::StorageError(format!("failed to insert question set: {}", e)))?;

        for question in &set.questions {
            sqlx::query(
                "INSERT INTO questions (id, set_id, category, body, difficulty, model_answer, purpose) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(&question.id)
            .bind(&set.id)
            .bind(question.category.label())
            .bind(&question.body)
            .bind(question.difficulty.label())
            .bind(&question.model_answer)
            .bind(&question.purpose)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::StorageError(format!("failed to insert question: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| CoreError::StorageError(format!("failed to commit question set: {}", e)))?;

        Ok(set)
    }

    async fn get(&self, set_id: &str) -> Result<QuestionSet, CoreError> {
        let set_row = sqlx::query(
            "SELECT id, record_id, target_school, target_major, interview_type, title, created_at \
             FROM question_sets WHERE id = $1",
        )
        .bind(set_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?
        .ok_or_else(|| CoreError::not_found(format!("question set {}", set_id)))?;

        let question_rows = sqlx::query(
            "SELECT id, category, body, difficulty, model_answer, purpose FROM questions WHERE set_id = $1",
        )
        .bind(set_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        let mut questions = Vec::with_capacity(question_rows.len());
        for row in &question_rows {
            let category_label: String = row.try_get("category").map_err(|e| CoreError::StorageError(e.to_string()))?;
            let difficulty_label: String = row.try_get("difficulty").map_err(|e| CoreError::StorageError(e.to_string()))?;
            questions.push(Question {
                id: row.try_get("id").map_err(|e| CoreError::StorageError(e.to_string()))?,
                category: Category::from_str(&category_label).map_err(CoreError::StorageError)?,
                body: row.try_get("body").map_err(|e| CoreError::StorageError(e.to_string()))?,
                difficulty: Difficulty::from_str(&difficulty_label).map_err(CoreError::StorageError)?,
                model_answer: row.try_get("model_answer").map_err(|e| CoreError::StorageError(e.to_string()))?,
                purpose: row.try_get("purpose").map_err(|e| CoreError::StorageError(e.to_string()))?,
            });
        }

        Ok(QuestionSet {
            id: set_row.try_get("id").map_err(|e| CoreError::StorageError(e.to_string()))?,
            record_id: set_row.try_get("record_id").map_err(|e| CoreError::StorageError(e.to_string()))?,
            target_school: set_row.try_get("target_school").map_err(|e| CoreError::StorageError(e.to_string()))?,
            target_major: set_row.try_get("target_major").map_err(|e| CoreError::StorageError(e.to_string()))?,
            interview_type: set_row.try_get("interview_type").map_err(|e| CoreError::StorageError(e.to_string()))?,
            title: set_row.try_get("title").map_err(|e| CoreError::StorageError(e.to_string()))?,
            created_at: set_row.try_get::<DateTime<Utc>, _>("created_at").map_err(|e| CoreError::StorageError(e.to_string()))?,
            questions,
        })
    }
}
