/// Interview Orchestrator: wires the node functions and the routing table
/// into the two external operations, `initialize` and `chat_turn`.
/// Per-thread turn serialization uses a keyed map of `tokio::sync::Mutex`
/// guards, one per `thread_id` rather than a single process-wide lock,
/// created lazily and kept for the orchestrator's lifetime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::config::InterviewConfig;
use crate::errors::CoreError;
use crate::gateway::ModelGateway;
use crate::interview::checkpoint::Checkpointer;
use crate::interview::{nodes, routing, Action, ConversationTurn, InterviewDifficulty, InterviewState, Role, TurnAnalysis};
use crate::session::{compute_stats, SessionRegistry};
use crate::store::VectorStore;
use crate::tts::TextToSpeech;

pub struct InterviewOrchestrator {
    gateway: Arc<dyn ModelGateway>,
    vectors: Arc<dyn VectorStore>,
    checkpointer: Arc<dyn Checkpointer>,
    sessions: Arc<dyn SessionRegistry>,
    config: InterviewConfig,
    thread_locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Result of one completed turn: the next question, the updated state,
/// the analysis of the answer just given, and whether the session is now
/// finished. `analysis` is `None` only for the very first turn inside
/// `initialize`, since `initialize_interview` itself has nothing to
/// analyze yet.
pub struct TurnOutcome {
    pub next_question: String,
    pub state: InterviewState,
    pub analysis: Option<TurnAnalysis>,
    pub is_finished: bool,
}

impl InterviewOrchestrator {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        vectors: Arc<dyn VectorStore>,
        checkpointer: Arc<dyn Checkpointer>,
        sessions: Arc<dyn SessionRegistry>,
        config: InterviewConfig,
    ) -> Self {
        InterviewOrchestrator {
            gateway,
            vectors,
            checkpointer,
            sessions,
            config,
            thread_locks: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, thread_id: &str) -> Arc<AsyncMutex<()>> {
        let mut guard = self.thread_locks.lock().expect("thread lock map poisoned");
        guard.entry(thread_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Open a new interview: runs `initialize_interview` to seed the first
    /// question, then immediately folds in `first_answer` through the
    /// normal turn pipeline.
    pub async fn initialize(
        &self,
        user_id: &str,
        record_id: &str,
        difficulty: InterviewDifficulty,
        first_answer: &str,
        response_time_s: i64,
    ) -> Result<(String, TurnOutcome), CoreError> {
        let thread_id = Uuid::new_v4().to_string();
        self.sessions.create(&thread_id, user_id, record_id, difficulty).await?;

        let state = nodes::initialize_interview(
            self.gateway.as_ref(),
            self.vectors.as_ref(),
            record_id,
            thread_id.clone(),
            difficulty,
            self.config.interview_total_time_s,
        )
        .await?;
        self.checkpointer.commit(&thread_id, &state).await?;

        let lock = self.lock_for(&thread_id);
        let _guard = lock.lock().await;
        let outcome = self
            .run_turn(&thread_id, record_id, state, first_answer, response_time_s, &CancellationToken::new())
            .await?;
        Ok((thread_id, outcome))
    }

    /// Advance an existing interview by one candidate answer.
    pub async fn chat_turn(
        &self,
        thread_id: &str,
        answer: &str,
        response_time_s: i64,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, CoreError> {
        let lock = self.lock_for(thread_id);
        let _guard = lock.lock().await;

        let (_, state) = self
            .checkpointer
            .load_latest(thread_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("session {}", thread_id)))?;
        let session = self.sessions.get(thread_id).await?;

        self.run_turn(thread_id, &session.record_id, state, answer, response_time_s, cancel).await
    }

    /// Reconstruct a session's ordered `answer_metadata` from its latest
    /// Checkpoint.
    pub async fn get_logs(&self, thread_id: &str) -> Result<Vec<crate::interview::AnswerRecord>, CoreError> {
        self.sessions.get(thread_id).await?;
        let (_, state) = self
            .checkpointer
            .load_latest(thread_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("session {}", thread_id)))?;
        Ok(state.answer_metadata)
    }

    /// Same as `chat_turn`, but the candidate answer arrives as audio: the
    /// Model Gateway transcribes it first, and the produced question is
    /// rendered back to speech afterward. The state machine itself is
    /// unchanged.
    pub async fn chat_turn_audio(
        &self,
        thread_id: &str,
        audio_bytes: &[u8],
        mime: &str,
        response_time_s: i64,
        tts: &dyn TextToSpeech,
        cancel: &CancellationToken,
    ) -> Result<(TurnOutcome, String), CoreError> {
        let answer = self.gateway.transcribe(audio_bytes, mime).await?;
        let outcome = self.chat_turn(thread_id, &answer, response_time_s, cancel).await?;

        let turn_index = outcome.state.conversation_history.len() as u32;
        let blob_key = crate::blob::tts_blob_key(thread_id, turn_index);
        let audio_url = tts.synthesize(&outcome.next_question, &blob_key).await?;
        Ok((outcome, audio_url))
    }

    async fn run_turn(
        &self,
        thread_id: &str,
        record_id: &str,
        mut state: InterviewState,
        answer: &str,
        response_time_s: i64,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, CoreError> {
        state.conversation_history.push(ConversationTurn {
            role: Role::Candidate,
            text: answer.to_string(),
        });
        state.remaining_time_s = (state.remaining_time_s - response_time_s).max(0);

        let (mut state, analysis) = nodes::analyzer(self.gateway.as_ref(), &state, response_time_s, &self.config).await?;
        self.checkpointer.commit(thread_id, &state).await?;

        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled(format!("turn cancelled for thread {}", thread_id)));
        }

        let action = routing::route(&state, analysis.evaluation.score, &self.config);
        let (next_question, is_finished) = match action {
            Action::FollowUp => {
                state = nodes::follow_up_generator(self.gateway.as_ref(), &state).await?;
                self.checkpointer.commit(thread_id, &state).await?;
                (state.last_question().expect("follow_up_generator writes a question").to_string(), false)
            }
            Action::NewTopic => {
                state = nodes::retrieve_new_topic(self.gateway.as_ref(), self.vectors.as_ref(), record_id, &state).await?;
                self.checkpointer.commit(thread_id, &state).await?;

                if cancel.is_cancelled() {
                    return Err(CoreError::Cancelled(format!("turn cancelled for thread {}", thread_id)));
                }

                state = nodes::new_question_generator(self.gateway.as_ref(), &state).await?;
                self.checkpointer.commit(thread_id, &state).await?;
                (state.last_question().expect("new_question_generator writes a question").to_string(), false)
            }
            Action::WrapUp => {
                let (final_state, report) = nodes::wrap_up(self.gateway.as_ref(), &state).await?;
                state = final_state;
                self.checkpointer.commit(thread_id, &state).await?;

                let session = self.sessions.get(thread_id).await?;
                let stats = compute_stats(&state.answer_metadata, session.started_at, chrono::Utc::now());
                self.sessions.complete(thread_id, stats, report.clone()).await?;

                (report.closing_remark.clone(), true)
            }
        };

        Ok(TurnOutcome {
            next_question,
            state,
            analysis: Some(analysis),
            is_finished,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ModelError;
    use crate::interview::checkpoint::memory::InMemoryCheckpointer;
    use crate::session::memory::InMemorySessionRegistry;
    use crate::store::memory::InMemoryVectorStore;
    use crate::store::{Category, NewChunk};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FakeGateway;

    #[async_trait]
    impl ModelGateway for FakeGateway {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ModelError> {
            Ok(vec![0.2; 4])
        }
        async fn generate(&self, prompt: &str, _schema: &Value) -> Result<Value, ModelError> {
            if prompt.contains("score") {
                Ok(json!({"score": 95, "feedback": "great", "strength_tags": [], "weakness_tags": []}))
            } else if prompt.contains("closing_remark") {
                Ok(json!({"closing_remark": "수고하셨습니다.", "summary": "훌륭했습니다."}))
            } else {
                Ok(json!({"question": "다음 질문입니다."}))
            }
        }
        async fn transcribe(&self, _audio: &[u8], _mime: &str) -> Result<String, ModelError> {
            Ok("전사된 답변".into())
        }
        fn embedding_dimension(&self) -> usize {
            4
        }
    }

    async fn seeded_store() -> Arc<InMemoryVectorStore> {
        let store = InMemoryVectorStore::new();
        store
            .put_chunks(
                "r1",
                vec![NewChunk {
                    chunk_index: 0,
                    body: "리더십 동아리 회장 활동".into(),
                    category: Category::CreativeActivities,
                    embedding: vec![0.2; 4],
                }],
            )
            .await
            .unwrap();
        Arc::new(store)
    }

    fn orchestrator(vectors: Arc<InMemoryVectorStore>) -> InterviewOrchestrator {
        InterviewOrchestrator::new(
            Arc::new(FakeGateway),
            vectors,
            Arc::new(InMemoryCheckpointer::new()),
            Arc::new(InMemorySessionRegistry::new()),
            InterviewConfig::default(),
        )
    }

    #[tokio::test]
    async fn initialize_then_chat_turn_advances_the_state_machine() {
        let orchestrator = orchestrator(seeded_store().await);
        let (thread_id, outcome) = orchestrator
            .initialize("u1", "r1", InterviewDifficulty::Normal, "동아리에서 회장을 맡았습니다", 40)
            .await
            .unwrap();
        assert!(!outcome.is_finished);
        assert!(!outcome.next_question.is_empty());

        let cancel = CancellationToken::new();
        let next = orchestrator.chat_turn(&thread_id, "추가로 설명드리면...", 30, &cancel).await.unwrap();
        assert!(!next.is_finished);
    }

    #[tokio::test]
    async fn low_remaining_time_wraps_up_and_completes_the_session() {
        let orchestrator = orchestrator(seeded_store().await);
        let (thread_id, first) = orchestrator
            .initialize("u1", "r1", InterviewDifficulty::Normal, "동아리에서 회장을 맡았습니다", 40)
            .await
            .unwrap();
        assert!(!first.is_finished);

        let cancel = CancellationToken::new();
        let outcome = orchestrator.chat_turn(&thread_id, "마지막 답변입니다", 540, &cancel).await.unwrap();
        assert!(outcome.is_finished);

        let session = orchestrator.sessions.get(&thread_id).await.unwrap();
        assert_eq!(session.status, crate::session::SessionStatus::Completed);
        assert!(session.final_report.is_some());
    }
}
