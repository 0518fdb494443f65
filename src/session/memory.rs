/// In-memory `SessionRegistry` double used by orchestrator tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{InterviewSession, SessionRegistry, SessionStats, SessionStatus};
use crate::errors::CoreError;
use crate::interview::{FinalReport, InterviewDifficulty};

#[derive(Default)]
pub struct InMemorySessionRegistry {
    sessions: Mutex<HashMap<String, InterviewSession>>,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        InMemorySessionRegistry::default()
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn create(
        &self,
        thread_id: &str,
        user_id: &str,
        record_id: &str,
        difficulty: InterviewDifficulty,
    ) -> Result<InterviewSession, CoreError> {
        let session = InterviewSession {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            user_id: user_id.to_string(),
            record_id: record_id.to_string(),
            difficulty,
            status: SessionStatus::InProgress,
            started_at: Utc::now(),
            completed_at: None,
            stats: None,
            final_report: None,
        };
        self.sessions
            .lock()
            .expect("session registry lock poisoned")
            .insert(thread_id.to_string(), session.clone());
        Ok(session)
    }

    async fn complete(&self, thread_id: &str, stats: SessionStats, report: FinalReport) -> Result<(), CoreError> {
        let mut guard = self.sessions.lock().expect("session registry lock poisoned");
        let session = guard
            .get_mut(thread_id)
            .ok_or_else(|| CoreError::not_found(format!("session {}", thread_id)))?;
        session.status = SessionStatus::Completed;
        session.completed_at = Some(Utc::now());
        session.stats = Some(stats);
        session.final_report = Some(report);
        Ok(())
    }

    async fn abandon(&self, thread_id: &str) -> Result<(), CoreError> {
        let mut guard = self.sessions.lock().expect("session registry lock poisoned");
        let session = guard
            .get_mut(thread_id)
            .ok_or_else(|| CoreError::not_found(format!("session {}", thread_id)))?;
        session.status = SessionStatus::Abandoned;
        session.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn get(&self, thread_id: &str) -> Result<InterviewSession, CoreError> {
        self.sessions
            .lock()
            .expect("session registry lock poisoned")
            .get(thread_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("session {}", thread_id)))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<InterviewSession>, CoreError> {
        Ok(self
            .sessions
            .lock()
            .expect("session registry lock poisoned")
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::Scores;

    #[tokio::test]
    async fn create_then_complete_transitions_status_and_stores_report() {
        let registry = InMemorySessionRegistry::new();
        registry.create("t1", "u1", "r1", InterviewDifficulty::Normal).await.unwrap();

        let stats = SessionStats {
            total_questions: 5,
            avg_response_time: 30.0,
            total_duration_s: 600,
            category_breakdown: HashMap::new(),
        };
        let report = FinalReport {
            closing_remark: "수고하셨습니다".into(),
            summary: "잘했습니다".into(),
            scores: Scores::default(),
            total_questions: 5,
        };
        registry.complete("t1", stats, report).await.unwrap();

        let session = registry.get("t1").await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.final_report.is_some());
    }

    #[tokio::test]
    async fn list_by_user_filters_to_owner() {
        let registry = InMemorySessionRegistry::new();
        registry.create("t1", "u1", "r1", InterviewDifficulty::Normal).await.unwrap();
        registry.create("t2", "u2", "r2", InterviewDifficulty::Easy).await.unwrap();

        let sessions = registry.list_by_user("u1").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].thread_id, "t1");
    }
}
