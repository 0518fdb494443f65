/// Node functions: each is `State -> State` modulo the external Model
/// Gateway / Vector Store calls it makes along the way. Every node returns
/// a brand new `InterviewState`; callers (`orchestrator.rs`) are
/// responsible for committing it as a Checkpoint.

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::config::InterviewConfig;
use crate::errors::CoreError;
use crate::gateway::ModelGateway;
use crate::interview::{
    routing, Action, ConversationTurn, Evaluation, FinalReport, InterviewDifficulty, InterviewState, Role,
    Scores, Stage, TurnAnalysis,
};
use crate::store::VectorStore;

fn question_schema() -> Value {
    json!({
        "type": "object",
        "required": ["question"],
        "properties": { "question": { "type": "string" } }
    })
}

fn evaluation_schema() -> Value {
    json!({
        "type": "object",
        "required": ["score", "feedback", "strength_tags", "weakness_tags"],
        "properties": {
            "score": { "type": "integer", "minimum": 0, "maximum": 100 },
            "feedback": { "type": "string" },
            "strength_tags": { "type": "array", "items": { "type": "string" } },
            "weakness_tags": { "type": "array", "items": { "type": "string" } }
        }
    })
}

fn wrap_up_schema() -> Value {
    json!({
        "type": "object",
        "required": ["closing_remark", "summary"],
        "properties": {
            "closing_remark": { "type": "string" },
            "summary": { "type": "string" }
        }
    })
}

#[derive(Deserialize)]
struct RawEvaluation {
    score: u8,
    feedback: String,
    strength_tags: Vec<String>,
    weakness_tags: Vec<String>,
}

async fn extract_question(gateway: &dyn ModelGateway, prompt: &str) -> Result<String, CoreError> {
    let value = gateway.generate(prompt, &question_schema()).await?;
    value
        .get("question")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| CoreError::ModelSchemaError("missing question field".into()))
}

/// Pick an opening sub-topic and seed `current_context` from it, then emit
/// the first question. Sets `stage = INTRO`.
pub async fn initialize_interview(
    gateway: &dyn ModelGateway,
    vectors: &dyn VectorStore,
    record_id: &str,
    thread_id: String,
    difficulty: InterviewDifficulty,
    total_time_s: i64,
) -> Result<InterviewState, CoreError> {
    let categories = vectors.categories_present(record_id).await?;
    let opening_category = categories
        .first()
        .copied()
        .ok_or_else(|| CoreError::PreconditionFailed(format!("record {} has no chunks to interview from", record_id)))?;

    let seed_vec = gateway.embed(&format!("{} 관련 도입 질문", opening_category.label())).await?;
    let hits = vectors.search(record_id, &seed_vec, 5, Some(opening_category)).await?;
    let context: Vec<String> = hits.into_iter().map(|h| h.chunk.body).collect();
    let sub_topic = opening_category.label().to_string();

    let prompt = format!(
        "You are opening a mock admissions interview. Based on these life-record \
         passages about '{topic}', ask one warm, specific opening question.\n\n\
         Passages:\n{context}\n\n\
         Respond as JSON: {{\"question\": ...}}.",
        topic = sub_topic,
        context = context.join("\n- "),
    );
    let question = extract_question(gateway, &prompt).await?;

    let mut state = InterviewState {
        thread_id,
        difficulty,
        remaining_time_s: total_time_s,
        stage: Stage::Intro,
        conversation_history: Vec::new(),
        current_context: context,
        current_sub_topic: sub_topic,
        asked_sub_topics: BTreeSet::new(),
        answer_metadata: Vec::new(),
        scores: Scores::default(),
        next_action: None,
        follow_up_count: 0,
    };
    state.conversation_history.push(ConversationTurn {
        role: Role::Interviewer,
        text: question,
    });
    Ok(state)
}

/// Score the latest candidate answer and decide the next action.
pub async fn analyzer(
    gateway: &dyn ModelGateway,
    state: &InterviewState,
    response_time_s: i64,
    config: &InterviewConfig,
) -> Result<(InterviewState, TurnAnalysis), CoreError> {
    let mut next_state = state.clone();
    if next_state.stage == Stage::Intro {
        next_state.stage = Stage::Main;
    }

    let question = state
        .last_question()
        .ok_or_else(|| CoreError::StorageError("no interviewer turn to evaluate against".into()))?
        .to_string();
    let answer = state
        .last_answer()
        .ok_or_else(|| CoreError::StorageError("no candidate answer to evaluate".into()))?
        .to_string();

    let prompt = format!(
        "Evaluate this interview answer on a 0-100 scale.\n\
         Question: {question}\n\
         Answer: {answer}\n\
         Respond as JSON: {{\"score\": 0-100, \"feedback\": ..., \"strength_tags\": [...], \"weakness_tags\": [...]}}.",
    );
    let value = gateway.generate(&prompt, &evaluation_schema()).await?;
    let raw: RawEvaluation = serde_json::from_value(value)
        .map_err(|e| CoreError::ModelSchemaError(format!("malformed evaluation: {}", e)))?;
    let evaluation = Evaluation::new(raw.score, raw.feedback, raw.strength_tags, raw.weakness_tags);

    next_state.answer_metadata.push(crate::interview::AnswerRecord {
        question,
        answer,
        response_time_s,
        sub_topic: state.current_sub_topic.clone(),
        evaluation: evaluation.clone(),
        context_used: state.current_context.clone(),
    });

    if let Some(axis) = crate::interview::topic_score_mapping(&state.current_sub_topic) {
        next_state.scores.add(axis, evaluation.score as i64);
    }

    let action = routing::route(&next_state, evaluation.score, config);
    next_state.next_action = Some(action);

    Ok((
        next_state,
        TurnAnalysis {
            evaluation,
            next_action: action,
        },
    ))
}

/// Produce a deeper probe on the same sub-topic, reusing `current_context`.
pub async fn follow_up_generator(gateway: &dyn ModelGateway, state: &InterviewState) -> Result<InterviewState, CoreError> {
    let mut next_state = state.clone();
    let history = state
        .conversation_history
        .iter()
        .map(|t| format!("{:?}: {}", t.role, t.text))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "Continue probing the sub-topic '{topic}' more deeply, based on the \
         conversation so far and these grounding passages. Ask one follow-up \
         question that digs into specifics the candidate glossed over.\n\n\
         Conversation so far:\n{history}\n\n\
         Passages:\n{context}\n\n\
         Respond as JSON: {{\"question\": ...}}.",
        topic = state.current_sub_topic,
        history = history,
        context = state.current_context.join("\n- "),
    );
    let question = extract_question(gateway, &prompt).await?;

    next_state.follow_up_count += 1;
    next_state.conversation_history.push(ConversationTurn {
        role: Role::Interviewer,
        text: question,
    });
    Ok(next_state)
}

/// Pick an unused sub-topic, embed a seed, and retrieve top-k grounding chunks.
pub async fn retrieve_new_topic(
    gateway: &dyn ModelGateway,
    vectors: &dyn VectorStore,
    record_id: &str,
    state: &InterviewState,
) -> Result<InterviewState, CoreError> {
    let mut next_state = state.clone();
    next_state.asked_sub_topics.insert(state.current_sub_topic.clone());

    let categories = vectors.categories_present(record_id).await?;
    let next_category = categories
        .iter()
        .find(|c| !next_state.asked_sub_topics.contains(c.label()))
        .or_else(|| categories.first())
        .copied()
        .ok_or_else(|| CoreError::PreconditionFailed(format!("record {} has no chunks to interview from", record_id)))?;

    let seed_vec = gateway.embed(&format!("{} 관련 다음 질문 주제", next_category.label())).await?;
    let hits = vectors.search(record_id, &seed_vec, 5, Some(next_category)).await?;

    next_state.current_context = hits.into_iter().map(|h| h.chunk.body).collect();
    next_state.current_sub_topic = next_category.label().to_string();
    next_state.follow_up_count = 0;
    Ok(next_state)
}

/// Produce an opening question on the newly retrieved topic.
pub async fn new_question_generator(gateway: &dyn ModelGateway, state: &InterviewState) -> Result<InterviewState, CoreError> {
    let mut next_state = state.clone();
    let prompt = format!(
        "Move the interview on to a new sub-topic: '{topic}'. Based on these \
         grounding passages, ask one specific opening question on this topic.\n\n\
         Passages:\n{context}\n\n\
         Respond as JSON: {{\"question\": ...}}.",
        topic = state.current_sub_topic,
        context = state.current_context.join("\n- "),
    );
    let question = extract_question(gateway, &prompt).await?;
    next_state.conversation_history.push(ConversationTurn {
        role: Role::Interviewer,
        text: question,
    });
    Ok(next_state)
}

/// Produce a closing remark and the final report; marks the interview
/// terminal within the state machine (session-row completion is the
/// orchestrator's responsibility, not this node's).
pub async fn wrap_up(gateway: &dyn ModelGateway, state: &InterviewState) -> Result<(InterviewState, FinalReport), CoreError> {
    let mut next_state = state.clone();
    next_state.stage = Stage::WrapUp;
    next_state.next_action = Some(Action::WrapUp);

    let history = state
        .conversation_history
        .iter()
        .map(|t| format!("{:?}: {}", t.role, t.text))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!(
        "The interview is ending. Based on the full conversation below, write a \
         warm closing remark for the candidate and a short summary of their \
         performance.\n\nConversation:\n{history}\n\n\
         Respond as JSON: {{\"closing_remark\": ..., \"summary\": ...}}.",
    );
    let value = gateway.generate(&prompt, &wrap_up_schema()).await?;
    let closing_remark = value
        .get("closing_remark")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::ModelSchemaError("missing closing_remark".into()))?
        .to_string();
    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::ModelSchemaError("missing summary".into()))?
        .to_string();

    next_state.conversation_history.push(ConversationTurn {
        role: Role::Interviewer,
        text: closing_remark.clone(),
    });

    let report = FinalReport {
        closing_remark,
        summary,
        scores: next_state.scores.clone(),
        total_questions: next_state.answer_metadata.len(),
    };
    Ok((next_state, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ModelError;
    use crate::store::memory::InMemoryVectorStore;
    use crate::store::{Category, NewChunk};
    use async_trait::async_trait;

    struct FakeGateway;

    #[async_trait]
    impl ModelGateway for FakeGateway {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ModelError> {
            Ok(vec![0.2; 4])
        }
        async fn generate(&self, prompt: &str, _schema: &Value) -> Result<Value, ModelError> {
            if prompt.contains("score") {
                Ok(json!({"score": 55, "feedback": "fine", "strength_tags": [], "weakness_tags": []}))
            } else if prompt.contains("closing_remark") {
                Ok(json!({"closing_remark": "수고하셨습니다.", "summary": "좋은 면접이었습니다."}))
            } else {
                Ok(json!({"question": "리더십 경험을 말씀해주세요."}))
            }
        }
        async fn transcribe(&self, _audio: &[u8], _mime: &str) -> Result<String, ModelError> {
            Ok(String::new())
        }
        fn embedding_dimension(&self) -> usize {
            4
        }
    }

    async fn seeded_store(record_id: &str) -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        store
            .put_chunks(
                record_id,
                vec![NewChunk {
                    chunk_index: 0,
                    body: "리더십 동아리 회장 활동".into(),
                    category: Category::CreativeActivities,
                    embedding: vec![0.2; 4],
                }],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn initialize_sets_intro_stage_and_first_question() {
        let gateway = FakeGateway;
        let store = seeded_store("r1").await;
        let state = initialize_interview(&gateway, &store, "r1", "thread-1".into(), InterviewDifficulty::Normal, 600)
            .await
            .unwrap();
        assert_eq!(state.stage, Stage::Intro);
        assert_eq!(state.conversation_history.len(), 1);
        assert!(!state.current_context.is_empty());
    }

    #[tokio::test]
    async fn analyzer_appends_answer_record_and_routes() {
        let gateway = FakeGateway;
        let store = seeded_store("r1").await;
        let mut state = initialize_interview(&gateway, &store, "r1", "thread-1".into(), InterviewDifficulty::Normal, 600)
            .await
            .unwrap();
        state.current_sub_topic = "리더십".to_string();
        state.conversation_history.push(ConversationTurn {
            role: Role::Candidate,
            text: "동아리에서 회장을 맡았습니다".into(),
        });

        let config = InterviewConfig::default();
        let (next_state, analysis) = analyzer(&gateway, &state, 42, &config).await.unwrap();
        assert_eq!(next_state.answer_metadata.len(), 1);
        assert_eq!(analysis.next_action, Action::FollowUp);
        assert_eq!(next_state.scores.character, 55);
    }
}
