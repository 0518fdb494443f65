/// Question Generation Pipeline: per-category retrieval-driven bulk
/// question synthesis.
///
/// Per-category concurrency is a `tokio::task::JoinSet` fan-out capped at
/// `QGEN_PARALLELISM` — categories are independent and short-lived enough
/// that a join set is a better fit than a long-lived channel worker.

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::config::QGenConfig;
use crate::errors::CoreError;
use crate::gateway::ModelGateway;
use crate::progress::ProgressProducer;
use crate::records::{RecordStatus, RecordStore};
use crate::store::{Category, Chunk, VectorStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Difficulty {
    Basic,
    Deep,
}

impl Difficulty {
    fn label(&self) -> &'static str {
        match self {
            Difficulty::Basic => "BASIC",
            Difficulty::Deep => "DEEP",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BASIC" => Ok(Difficulty::Basic),
            "DEEP" => Ok(Difficulty::Deep),
            other => Err(format!("unknown difficulty: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub category: Category,
    pub body: String,
    pub difficulty: Difficulty,
    pub model_answer: Option<String>,
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    pub id: String,
    pub record_id: String,
    pub target_school: String,
    pub target_major: String,
    pub interview_type: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub questions: Vec<Question>,
}

/// Maximum questions generated per category per set.
pub const MAX_QUESTIONS_PER_CATEGORY: usize = 5;

#[async_trait::async_trait]
pub trait QuestionSetStore: Send + Sync {
    async fn insert(&self, set: QuestionSet) -> Result<QuestionSet, CoreError>;
    async fn get(&self, set_id: &str) -> Result<QuestionSet, CoreError>;
}

/// JSON Schema for one category's question-generation response: up to 5
/// question objects grounded strictly in the supplied chunks.
fn question_batch_schema() -> Value {
    json!({
        "type": "object",
        "required": ["questions"],
        "properties": {
            "questions": {
                "type": "array",
                "maxItems": MAX_QUESTIONS_PER_CATEGORY,
                "items": {
                    "type": "object",
                    "required": ["body", "difficulty"],
                    "properties": {
                        "body": { "type": "string" },
                        "difficulty": { "type": "string", "enum": ["BASIC", "DEEP"] },
                        "model_answer": { "type": ["string", "null"] },
                        "purpose": { "type": ["string", "null"] }
                    }
                }
            }
        }
    })
}

fn build_question_prompt(
    category: Category,
    target_school: &str,
    target_major: &str,
    interview_type: &str,
    chunks: &[Chunk],
) -> String {
    let context = chunks
        .iter()
        .map(|c| format!("- {}", c.body))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are preparing a mock {interview_type} interview for a candidate applying \
         to {school} ({major}).\n\
         Using ONLY the following life-record passages from the '{category}' category, \
         write up to {max} interview questions grounded strictly in this material — \
         do not invent facts not present below.\n\
         For each question provide: body, difficulty (BASIC or DEEP), a model_answer, \
         and a purpose (what the interviewer is trying to assess).\n\n\
         Passages:\n{context}\n\n\
         Respond as JSON: {{\"questions\": [{{\"body\": ..., \"difficulty\": ..., \
         \"model_answer\": ..., \"purpose\": ...}}]}}.",
        interview_type = interview_type,
        school = target_school,
        major = target_major,
        category = category.label(),
        max = MAX_QUESTIONS_PER_CATEGORY,
        context = context,
    )
}

#[derive(Deserialize)]
struct RawQuestion {
    body: String,
    difficulty: String,
    model_answer: Option<String>,
    purpose: Option<String>,
}

pub struct QuestionGenerationPipeline {
    records: Arc<dyn RecordStore>,
    vectors: Arc<dyn VectorStore>,
    gateway: Arc<dyn ModelGateway>,
    sets: Arc<dyn QuestionSetStore>,
    config: QGenConfig,
}

impl QuestionGenerationPipeline {
    pub fn new(
        records: Arc<dyn RecordStore>,
        vectors: Arc<dyn VectorStore>,
        gateway: Arc<dyn ModelGateway>,
        sets: Arc<dyn QuestionSetStore>,
        config: QGenConfig,
    ) -> Self {
        QuestionGenerationPipeline {
            records,
            vectors,
            gateway,
            sets,
            config,
        }
    }

    #[tracing::instrument(skip(self, progress), fields(record_id = %record_id))]
    pub async fn run(
        &self,
        record_id: &str,
        target_school: &str,
        target_major: &str,
        interview_type: &str,
        title: &str,
        progress: &ProgressProducer,
    ) -> Result<QuestionSet, CoreError> {
        let record = self.records.get(record_id).await?;
        if record.status != RecordStatus::Ready {
            let err = CoreError::PreconditionFailed(format!(
                "record {} is not READY (status: {:?})",
                record_id, record.status
            ));
            progress.error(err.to_string());
            return Err(err);
        }
        progress.processing(5);

        let categories = self.vectors.categories_present(record_id).await?;
        if categories.is_empty() {
            let err = CoreError::PreconditionFailed(format!("record {} has no chunks", record_id));
            progress.error(err.to_string());
            return Err(err);
        }

        let parallelism = self.config.qgen_parallelism.max(1);
        let total = categories.len();
        let mut join_set: JoinSet<(Category, Result<Vec<Question>, CoreError>)> = JoinSet::new();
        let mut next = 0usize;
        let mut all_questions: Vec<Question> = Vec::new();
        let mut completed = 0usize;
        let mut first_error: Option<CoreError> = None;

        let spawn_category = |gateway: Arc<dyn ModelGateway>,
                               vectors: Arc<dyn VectorStore>,
                               record_id: String,
                               category: Category,
                               target_school: String,
                               target_major: String,
                               interview_type: String| async move {
            let result = generate_for_category(
                gateway.as_ref(),
                vectors.as_ref(),
                &record_id,
                category,
                &target_school,
                &target_major,
                &interview_type,
            )
            .await;
            (category, result)
        };

        while next < categories.len().min(parallelism) {
            let category = categories[next];
            join_set.spawn(spawn_category(
                self.gateway.clone(),
                self.vectors.clone(),
                record_id.to_string(),
                category,
                target_school.to_string(),
                target_major.to_string(),
                interview_type.to_string(),
            ));
            next += 1;
        }

        while let Some(joined) = join_set.join_next().await {
            let (category, result) = joined.map_err(|e| CoreError::StorageError(format!("qgen task panicked: {}", e)))?;
            match result {
                Ok(mut questions) => all_questions.append(&mut questions),
                Err(e) => {
                    tracing::warn!(category = %category, error = %e, "question generation failed for category");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
            completed += 1;

            if next < categories.len() {
                let category = categories[next];
                join_set.spawn(spawn_category(
                    self.gateway.clone(),
                    self.vectors.clone(),
                    record_id.to_string(),
                    category,
                    target_school.to_string(),
                    target_major.to_string(),
                    interview_type.to_string(),
                ));
                next += 1;
            }

            let fraction = completed as f64 / total.max(1) as f64;
            progress.processing(5 + (fraction * 85.0).round() as u8);
        }

        if all_questions.is_empty() {
            let err = first_error.unwrap_or_else(|| {
                CoreError::ModelSchemaError("no questions were generated for any category".into())
            });
            progress.error(err.to_string());
            return Err(err);
        }

        let set = QuestionSet {
            id: uuid::Uuid::new_v4().to_string(),
            record_id: record_id.to_string(),
            target_school: target_school.to_string(),
            target_major: target_major.to_string(),
            interview_type: interview_type.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
            questions: all_questions,
        };

        let inserted = self.sets.insert(set).await?;
        progress.complete();
        Ok(inserted)
    }
}

async fn generate_for_category(
    gateway: &dyn ModelGateway,
    vectors: &dyn VectorStore,
    record_id: &str,
    category: Category,
    target_school: &str,
    target_major: &str,
    interview_type: &str,
) -> Result<Vec<Question>, CoreError> {
    let chunks = vectors.get_by_category(record_id, category).await?;
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let prompt = build_question_prompt(category, target_school, target_major, interview_type, &chunks);
    let schema = question_batch_schema();
    let value = gateway.generate(&prompt, &schema).await?;

    let raw: Vec<RawQuestion> = serde_json::from_value(value.get("questions").cloned().unwrap_or(Value::Array(vec![])))
        .map_err(|e| CoreError::ModelSchemaError(format!("malformed questions array: {}", e)))?;

    let questions: Result<Vec<Question>, CoreError> = raw
        .into_iter()
        .take(MAX_QUESTIONS_PER_CATEGORY)
        .map(|rq| {
            let difficulty = Difficulty::from_str(&rq.difficulty).map_err(CoreError::ModelSchemaError)?;
            Ok(Question {
                id: uuid::Uuid::new_v4().to_string(),
                category,
                body: rq.body,
                difficulty,
                model_answer: rq.model_answer,
                purpose: rq.purpose,
            })
        })
        .collect();

    questions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ModelError;
    use crate::records::memory::InMemoryRecordStore;
    use crate::records::RecordStatus;
    use crate::store::memory::InMemoryVectorStore;
    use crate::store::NewChunk;
    use async_trait::async_trait;

    struct FakeGateway;

    #[async_trait]
    impl ModelGateway for FakeGateway {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ModelError> {
            Ok(vec![0.0; 4])
        }
        async fn generate(&self, prompt: &str, _schema: &Value) -> Result<Value, ModelError> {
            assert!(prompt.contains("Passages"));
            Ok(json!({
                "questions": [
                    {"body": "리더십 경험을 설명해보세요", "difficulty": "BASIC", "model_answer": "...", "purpose": "..."}
                ]
            }))
        }
        async fn transcribe(&self, _audio: &[u8], _mime: &str) -> Result<String, ModelError> {
            Ok(String::new())
        }
        fn embedding_dimension(&self) -> usize {
            4
        }
    }

    #[tokio::test]
    async fn rejects_record_not_ready() {
        let records = Arc::new(InMemoryRecordStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let gateway = Arc::new(FakeGateway);
        let sets = Arc::new(memory::InMemoryQuestionSetStore::new());
        let pipeline = QuestionGenerationPipeline::new(records.clone(), vectors, gateway, sets, QGenConfig::default());

        let record = records.create("u1", "t", "k").await.unwrap();
        let (tx, _rx) = crate::progress::channel(16);
        let result = pipeline.run(&record.id, "Seoul National University", "CS", "종합", "title", &tx).await;
        assert!(matches!(result, Err(CoreError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn generates_questions_per_category() {
        let records = Arc::new(InMemoryRecordStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let gateway = Arc::new(FakeGateway);
        let sets = Arc::new(memory::InMemoryQuestionSetStore::new());
        let pipeline = QuestionGenerationPipeline::new(records.clone(), vectors.clone(), gateway, sets, QGenConfig::default());

        let record = records.create("u1", "t", "k").await.unwrap();
        records.set_status(&record.id, RecordStatus::Ready, None).await.unwrap();
        vectors
            .put_chunks(
                &record.id,
                vec![NewChunk {
                    chunk_index: 0,
                    body: "리더십 동아리 활동".to_string(),
                    category: Category::CreativeActivities,
                    embedding: vec![0.1; 4],
                }],
            )
            .await
            .unwrap();

        let (tx, _rx) = crate::progress::channel(16);
        let set = pipeline
            .run(&record.id, "Seoul National University", "CS", "종합", "title", &tx)
            .await
            .unwrap();

        assert_eq!(set.questions.len(), 1);
        assert_eq!(set.questions[0].category, Category::CreativeActivities);
    }
}
