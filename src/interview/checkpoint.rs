/// Checkpoint persistence: an append-only history of `InterviewState`
/// snapshots per thread, keyed by a monotonically increasing checkpoint
/// id — the same per-parent, monotonic-id append pattern the vector store
/// uses for `(record_id, chunk_index)`, here `(thread_id, checkpoint_id)`.

use async_trait::async_trait;

use super::InterviewState;
use crate::errors::CoreError;

#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Commit `state` as the next checkpoint for `thread_id`. Returns the
    /// newly assigned checkpoint id.
    async fn commit(&self, thread_id: &str, state: &InterviewState) -> Result<i64, CoreError>;

    /// The latest (highest checkpoint id) snapshot for `thread_id`, if any.
    async fn load_latest(&self, thread_id: &str) -> Result<Option<(i64, InterviewState)>, CoreError>;

    /// Every snapshot for `thread_id`, oldest first — any snapshot must be
    /// restorable, which needs more than just the latest to be visible.
    async fn list(&self, thread_id: &str) -> Result<Vec<(i64, InterviewState)>, CoreError>;

    /// Restore a specific prior snapshot by checkpoint id. Used for
    /// cancellation rollback: a cancelled interview turn rolls back to
    /// the prior checkpoint.
    async fn restore(&self, thread_id: &str, checkpoint_id: i64) -> Result<InterviewState, CoreError>;
}

pub mod postgres {
    use async_trait::async_trait;
    use sqlx::{postgres::PgPool, Row};

    use super::{Checkpointer, InterviewState};
    use crate::errors::CoreError;

    pub struct PostgresCheckpointer {
        pool: PgPool,
    }

    impl PostgresCheckpointer {
        pub fn new(pool: PgPool) -> Self {
            PostgresCheckpointer { pool }
        }
    }

    #[async_trait]
    impl Checkpointer for PostgresCheckpointer {
        async fn commit(&self, thread_id: &str, state: &InterviewState) -> Result<i64, CoreError> {
            let blob = serde_json::to_value(state)
                .map_err(|e| CoreError::StorageError(format!("failed to serialize checkpoint: {}", e)))?;

            let row = sqlx::query(
                "INSERT INTO checkpoints (thread_id, checkpoint_id, state_blob) \
                 VALUES ($1, COALESCE((SELECT MAX(checkpoint_id) + 1 FROM checkpoints WHERE thread_id = $1), 0), $2) \
                 RETURNING checkpoint_id",
            )
            .bind(thread_id)
            .bind(&blob)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CoreError::StorageError(format!("failed to commit checkpoint: {}", e)))?;

            row.try_get("checkpoint_id").map_err(|e| CoreError::StorageError(e.to_string()))
        }

        async fn load_latest(&self, thread_id: &str) -> Result<Option<(i64, InterviewState)>, CoreError> {
            let row = sqlx::query(
                "SELECT checkpoint_id, state_blob FROM checkpoints \
                 WHERE thread_id = $1 ORDER BY checkpoint_id DESC LIMIT 1",
            )
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::StorageError(e.to_string()))?;

            match row {
                None => Ok(None),
                Some(row) => {
                    let checkpoint_id: i64 = row.try_get("checkpoint_id").map_err(|e| CoreError::StorageError(e.to_string()))?;
                    let blob: serde_json::Value = row.try_get("state_blob").map_err(|e| CoreError::StorageError(e.to_string()))?;
                    let state: InterviewState = serde_json::from_value(blob)
                        .map_err(|e| CoreError::StorageError(format!("corrupt checkpoint blob: {}", e)))?;
                    Ok(Some((checkpoint_id, state)))
                }
            }
        }

        async fn list(&self, thread_id: &str) -> Result<Vec<(i64, InterviewState)>, CoreError> {
            let rows = sqlx::query(
                "SELECT checkpoint_id, state_blob FROM checkpoints \
                 WHERE thread_id = $1 ORDER BY checkpoint_id ASC",
            )
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::StorageError(e.to_string()))?;

            rows.iter()
                .map(|row| {
                    let checkpoint_id: i64 = row.try_get("checkpoint_id").map_err(|e| CoreError::StorageError(e.to_string()))?;
                    let blob: serde_json::Value = row.try_get("state_blob").map_err(|e| CoreError::StorageError(e.to_string()))?;
                    let state: InterviewState = serde_json::from_value(blob)
                        .map_err(|e| CoreError::StorageError(format!("corrupt checkpoint blob: {}", e)))?;
                    Ok((checkpoint_id, state))
                })
                .collect()
        }

        async fn restore(&self, thread_id: &str, checkpoint_id: i64) -> Result<InterviewState, CoreError> {
            let row = sqlx::query("SELECT state_blob FROM checkpoints WHERE thread_id = $1 AND checkpoint_id = $2")
                .bind(thread_id)
                .bind(checkpoint_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CoreError::StorageError(e.to_string()))?
                .ok_or_else(|| CoreError::not_found(format!("checkpoint {} for thread {}", checkpoint_id, thread_id)))?;

            let blob: serde_json::Value = row.try_get("state_blob").map_err(|e| CoreError::StorageError(e.to_string()))?;
            serde_json::from_value(blob).map_err(|e| CoreError::StorageError(format!("corrupt checkpoint blob: {}", e)))
        }
    }
}

pub mod memory {
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::{Checkpointer, InterviewState};
    use crate::errors::CoreError;

    #[derive(Default)]
    pub struct InMemoryCheckpointer {
        threads: Mutex<HashMap<String, Vec<InterviewState>>>,
    }

    impl InMemoryCheckpointer {
        pub fn new() -> Self {
            InMemoryCheckpointer::default()
        }
    }

    #[async_trait]
    impl Checkpointer for InMemoryCheckpointer {
        async fn commit(&self, thread_id: &str, state: &InterviewState) -> Result<i64, CoreError> {
            let mut guard = self.threads.lock().expect("checkpoint store lock poisoned");
            let history = guard.entry(thread_id.to_string()).or_default();
            history.push(state.clone());
            Ok((history.len() - 1) as i64)
        }

        async fn load_latest(&self, thread_id: &str) -> Result<Option<(i64, InterviewState)>, CoreError> {
            let guard = self.threads.lock().expect("checkpoint store lock poisoned");
            Ok(guard
                .get(thread_id)
                .and_then(|history| history.last().map(|s| ((history.len() - 1) as i64, s.clone()))))
        }

        async fn list(&self, thread_id: &str) -> Result<Vec<(i64, InterviewState)>, CoreError> {
            let guard = self.threads.lock().expect("checkpoint store lock poisoned");
            Ok(guard
                .get(thread_id)
                .map(|history| history.iter().cloned().enumerate().map(|(i, s)| (i as i64, s)).collect())
                .unwrap_or_default())
        }

        async fn restore(&self, thread_id: &str, checkpoint_id: i64) -> Result<InterviewState, CoreError> {
            let guard = self.threads.lock().expect("checkpoint store lock poisoned");
            guard
                .get(thread_id)
                .and_then(|history| history.get(checkpoint_id as usize))
                .cloned()
                .ok_or_else(|| CoreError::not_found(format!("checkpoint {} for thread {}", checkpoint_id, thread_id)))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::interview::{InterviewDifficulty, Scores, Stage};
        use std::collections::BTreeSet;

        fn sample_state(remaining: i64) -> InterviewState {
            InterviewState {
                thread_id: "t1".into(),
                difficulty: InterviewDifficulty::Normal,
                remaining_time_s: remaining,
                stage: Stage::Main,
                conversation_history: vec![],
                current_context: vec![],
                current_sub_topic: "리더십".into(),
                asked_sub_topics: BTreeSet::new(),
                answer_metadata: vec![],
                scores: Scores::default(),
                next_action: None,
                follow_up_count: 0,
            }
        }

        #[tokio::test]
        async fn checkpoint_ids_are_strictly_increasing() {
            let checkpointer = InMemoryCheckpointer::new();
            let id0 = checkpointer.commit("t1", &sample_state(600)).await.unwrap();
            let id1 = checkpointer.commit("t1", &sample_state(590)).await.unwrap();
            let id2 = checkpointer.commit("t1", &sample_state(580)).await.unwrap();
            assert!(id0 < id1);
            assert!(id1 < id2);
        }

        #[tokio::test]
        async fn restore_returns_the_exact_prior_snapshot() {
            let checkpointer = InMemoryCheckpointer::new();
            checkpointer.commit("t1", &sample_state(600)).await.unwrap();
            let target_id = checkpointer.commit("t1", &sample_state(590)).await.unwrap();
            checkpointer.commit("t1", &sample_state(580)).await.unwrap();

            let restored = checkpointer.restore("t1", target_id).await.unwrap();
            assert_eq!(restored.remaining_time_s, 590);
        }

        #[tokio::test]
        async fn load_latest_on_unknown_thread_is_none() {
            let checkpointer = InMemoryCheckpointer::new();
            assert!(checkpointer.load_latest("unknown").await.unwrap().is_none());
        }
    }
}
