/// In-memory `VectorStore` implementation used by pipeline and orchestrator
/// tests where spinning up Postgres is unnecessary overhead.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::store::{cosine_similarity, Category, Chunk, NewChunk, ScoredChunk, VectorStore};

#[derive(Default)]
pub struct InMemoryVectorStore {
    chunks: Mutex<HashMap<String, Vec<Chunk>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        InMemoryVectorStore {
            chunks: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn put_chunks(&self, record_id: &str, new_chunks: Vec<NewChunk>) -> Result<Vec<Chunk>, CoreError> {
        let inserted: Vec<Chunk> = new_chunks
            .into_iter()
            .map(|nc| Chunk {
                id: Uuid::new_v4().to_string(),
                record_id: record_id.to_string(),
                chunk_index: nc.chunk_index,
                body: nc.body,
                category: nc.category,
                embedding: nc.embedding,
            })
            .collect();

        let mut guard = self.chunks.lock().expect("chunk store lock poisoned");
        guard.entry(record_id.to_string()).or_default().extend(inserted.clone());
        Ok(inserted)
    }

    async fn get_by_category(&self, record_id: &str, category: Category) -> Result<Vec<Chunk>, CoreError> {
        let guard = self.chunks.lock().expect("chunk store lock poisoned");
        let mut matches: Vec<Chunk> = guard
            .get(record_id)
            .into_iter()
            .flatten()
            .filter(|c| c.category == category)
            .cloned()
            .collect();
        matches.sort_by_key(|c| c.chunk_index);
        Ok(matches)
    }

    async fn categories_present(&self, record_id: &str) -> Result<Vec<Category>, CoreError> {
        let guard = self.chunks.lock().expect("chunk store lock poisoned");
        let mut seen = Vec::new();
        for c in guard.get(record_id).into_iter().flatten() {
            if !seen.contains(&c.category) {
                seen.push(c.category);
            }
        }
        Ok(seen)
    }

    async fn search(
        &self,
        record_id: &str,
        query_vec: &[f32],
        k: usize,
        category: Option<Category>,
    ) -> Result<Vec<ScoredChunk>, CoreError> {
        let guard = self.chunks.lock().expect("chunk store lock poisoned");
        let mut scored: Vec<ScoredChunk> = guard
            .get(record_id)
            .into_iter()
            .flatten()
            .filter(|c| category.map(|cat| cat == c.category).unwrap_or(true))
            .map(|c| ScoredChunk {
                chunk: c.clone(),
                score: cosine_similarity(query_vec, &c.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_by_record(&self, record_id: &str) -> Result<(), CoreError> {
        let mut guard = self.chunks.lock().expect("chunk store lock poisoned");
        guard.remove(record_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(idx: i32, category: Category, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            chunk_index: idx,
            body: format!("chunk {}", idx),
            category,
            embedding,
        }
    }

    #[tokio::test]
    async fn search_respects_category_filter_and_k() {
        let store = InMemoryVectorStore::new();
        store
            .put_chunks(
                "r1",
                vec![
                    chunk(0, Category::Grades, vec![1.0, 0.0]),
                    chunk(1, Category::Grades, vec![0.9, 0.1]),
                    chunk(2, Category::Reading, vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("r1", &[1.0, 0.0], 5, Some(Category::Grades)).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.chunk.category == Category::Grades));

        let top = store.search("r1", &[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].chunk.chunk_index, 0);
    }

    #[tokio::test]
    async fn delete_by_record_clears_all_categories() {
        let store = InMemoryVectorStore::new();
        store
            .put_chunks("r1", vec![chunk(0, Category::Grades, vec![1.0, 0.0])])
            .await
            .unwrap();
        store.delete_by_record("r1").await.unwrap();
        let remaining = store.categories_present("r1").await.unwrap();
        assert!(remaining.is_empty());
    }
}
