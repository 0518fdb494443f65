/// Session Registry: identity, status, aggregate statistics, and the
/// final report for each interview thread. Grounded on `records/mod.rs`'s
/// CRUD-trait shape, widened with stats and report operations.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::CoreError;
use crate::interview::{AnswerRecord, FinalReport, InterviewDifficulty};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Abandoned => "ABANDONED",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(SessionStatus::InProgress),
            "COMPLETED" => Ok(SessionStatus::Completed),
            "ABANDONED" => Ok(SessionStatus::Abandoned),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// Aggregate statistics computed over a session's `answer_metadata`:
/// question count, average response time, total duration, and a
/// per-category breakdown of how many questions touched each topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_questions: usize,
    pub avg_response_time: f64,
    pub total_duration_s: i64,
    pub category_breakdown: HashMap<String, usize>,
}

/// Derive `SessionStats` from the answer records of a finished session.
/// `avg_response_time` is the mean of each answer's recorded
/// `response_time_s`.
pub fn compute_stats(answers: &[AnswerRecord], started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> SessionStats {
    let total_questions = answers.len();
    let avg_response_time = if total_questions == 0 {
        0.0
    } else {
        answers.iter().map(|a| a.response_time_s as f64).sum::<f64>() / total_questions as f64
    };
    let total_duration_s = (ended_at - started_at).num_seconds().max(0);

    let mut category_breakdown = HashMap::new();
    for answer in answers {
        *category_breakdown.entry(answer.sub_topic.clone()).or_insert(0) += 1;
    }

    SessionStats {
        total_questions,
        avg_response_time,
        total_duration_s,
        category_breakdown,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSession {
    pub id: String,
    pub thread_id: String,
    pub user_id: String,
    pub record_id: String,
    pub difficulty: InterviewDifficulty,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stats: Option<SessionStats>,
    pub final_report: Option<FinalReport>,
}

/// Owning abstraction over the `sessions` table. `get_logs` reaches into
/// the Checkpointer rather than duplicating conversation storage: it
/// returns the ordered `answer_metadata` reconstructed from the latest
/// checkpoint.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn create(
        &self,
        thread_id: &str,
        user_id: &str,
        record_id: &str,
        difficulty: InterviewDifficulty,
    ) -> Result<InterviewSession, CoreError>;

    async fn complete(&self, thread_id: &str, stats: SessionStats, report: FinalReport) -> Result<(), CoreError>;

    async fn abandon(&self, thread_id: &str) -> Result<(), CoreError>;

    async fn get(&self, thread_id: &str) -> Result<InterviewSession, CoreError>;

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<InterviewSession>, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::{Evaluation, Grade};
    use chrono::Duration;

    fn sample_answer(topic: &str, response_time_s: i64) -> AnswerRecord {
        AnswerRecord {
            question: "q".into(),
            answer: "a".into(),
            response_time_s,
            sub_topic: topic.into(),
            evaluation: Evaluation {
                score: 80,
                grade: Grade::Good,
                feedback: "ok".into(),
                strength_tags: vec![],
                weakness_tags: vec![],
            },
            context_used: vec![],
        }
    }

    #[test]
    fn compute_stats_averages_response_time_and_breaks_down_by_category() {
        let answers = vec![sample_answer("리더십", 20), sample_answer("리더십", 40), sample_answer("독서", 30)];
        let start = Utc::now();
        let end = start + Duration::seconds(300);
        let stats = compute_stats(&answers, start, end);

        assert_eq!(stats.total_questions, 3);
        assert!((stats.avg_response_time - 30.0).abs() < 1e-9);
        assert_eq!(stats.total_duration_s, 300);
        assert_eq!(stats.category_breakdown.get("리더십"), Some(&2));
        assert_eq!(stats.category_breakdown.get("독서"), Some(&1));
    }

    #[test]
    fn compute_stats_on_empty_answers_is_zeroed_not_nan() {
        let start = Utc::now();
        let stats = compute_stats(&[], start, start);
        assert_eq!(stats.total_questions, 0);
        assert_eq!(stats.avg_response_time, 0.0);
    }
}
