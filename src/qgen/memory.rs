/// In-memory `QuestionSetStore` double used by pipeline tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{QuestionSet, QuestionSetStore};
use crate::errors::CoreError;

#[derive(Default)]
pub struct InMemoryQuestionSetStore {
    sets: Mutex<HashMap<String, QuestionSet>>,
}

impl InMemoryQuestionSetStore {
    pub fn new() -> Self {
        InMemoryQuestionSetStore::default()
    }
}

#[async_trait]
impl QuestionSetStore for InMemoryQuestionSetStore {
    async fn insert(&self, set: QuestionSet) -> Result<QuestionSet, CoreError> {
        self.sets.lock().expect("question set store lock poisoned").insert(set.id.clone(), set.clone());
        Ok(set)
    }

    async fn get(&self, set_id: &str) -> Result<QuestionSet, CoreError> {
        self.sets
            .lock()
            .expect("question set store lock poisoned")
            .get(set_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("question set {}", set_id)))
    }
}
