/// Vector Store abstraction layer.
///
/// Provides the `VectorStore` trait and associated types for categorized
/// chunk persistence and similarity search. The trait abstraction enables
/// multiple database backends — a PostgreSQL + pgvector backend for
/// production, and an in-memory backend for tests.

pub mod postgres;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::CoreError;

/// The fixed, closed set of chunk categories produced by the categorizer.
/// Implementers may expose only the subset actually produced for a given
/// record — the set itself never grows at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// 성적 — grades
    Grades,
    /// 세특 — subject-specific special notes
    SubjectNotes,
    /// 창체 — creative/extracurricular activities
    CreativeActivities,
    /// 행특 — behavior/character notes
    BehaviorNotes,
    /// 출결 — attendance
    Attendance,
    /// 독서 — reading record
    Reading,
    /// 수상 — awards
    Awards,
    /// 진로 — career aspiration
    Career,
    /// 기타 — other
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Grades,
        Category::SubjectNotes,
        Category::CreativeActivities,
        Category::BehaviorNotes,
        Category::Attendance,
        Category::Reading,
        Category::Awards,
        Category::Career,
        Category::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Grades => "성적",
            Category::SubjectNotes => "세특",
            Category::CreativeActivities => "창체",
            Category::BehaviorNotes => "행특",
            Category::Attendance => "출결",
            Category::Reading => "독서",
            Category::Awards => "수상",
            Category::Career => "진로",
            Category::Other => "기타",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "성적" => Ok(Category::Grades),
            "세특" => Ok(Category::SubjectNotes),
            "창체" => Ok(Category::CreativeActivities),
            "행특" => Ok(Category::BehaviorNotes),
            "출결" => Ok(Category::Attendance),
            "독서" => Ok(Category::Reading),
            "수상" => Ok(Category::Awards),
            "진로" => Ok(Category::Career),
            "기타" => Ok(Category::Other),
            other => Err(format!("unknown category: {}", other)),
        }
    }
}

/// A categorized text fragment extracted from a record, with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub record_id: String,
    /// 0-based position within the record. `(record_id, chunk_index)` is unique.
    pub chunk_index: i32,
    pub body: String,
    pub category: Category,
    pub embedding: Vec<f32>,
}

/// Input type for inserting a new chunk. The store assigns `id`.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i32,
    pub body: String,
    pub category: Category,
    pub embedding: Vec<f32>,
}

/// A single search result: the matched chunk and its cosine similarity score in [-1, 1].
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// Core abstraction for categorized chunk persistence and similarity search.
///
/// All implementations must be Send + Sync to support concurrent access
/// from the ingestion, question generation, and interview pipelines.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Bulk insert chunks for a record. Atomic per record (all-or-none).
    async fn put_chunks(&self, record_id: &str, chunks: Vec<NewChunk>) -> Result<Vec<Chunk>, CoreError>;

    /// Fetch chunks for a record in a given category, ordered by `chunk_index` ascending.
    async fn get_by_category(&self, record_id: &str, category: Category) -> Result<Vec<Chunk>, CoreError>;

    /// The distinct categories present for a record, in no particular order.
    async fn categories_present(&self, record_id: &str) -> Result<Vec<Category>, CoreError>;

    /// Cosine-similarity search within a record, descending score, ties broken
    /// by `chunk_index` ascending. If fewer than `k` chunks match the optional
    /// category filter, returns all matches. Never crosses `record_id` boundaries.
    async fn search(
        &self,
        record_id: &str,
        query_vec: &[f32],
        k: usize,
        category: Option<Category>,
    ) -> Result<Vec<ScoredChunk>, CoreError>;

    /// Delete all chunks for a record (cascades from record deletion).
    async fn delete_by_record(&self, record_id: &str) -> Result<(), CoreError>;
}

/// Cosine similarity between two vectors of equal length, in [-1, 1].
/// Returns 0.0 for zero-length vectors to avoid division by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_label() {
        for c in Category::ALL {
            let label = c.label();
            let parsed: Category = label.parse().unwrap();
            assert_eq!(parsed.label(), label);
        }
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }
}
