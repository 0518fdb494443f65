/// PostgreSQL-backed implementation of VectorStore.
///
/// Uses sqlx with a PgPool for connection pooling, and pgvector for the
/// embedding column and HNSW-accelerated cosine-distance search.

use async_trait::async_trait;
use sqlx::{
    postgres::{PgPool, PgPoolOptions, PgRow},
    Row,
};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::store::{Category, Chunk, NewChunk, ScoredChunk, VectorStore};

pub struct PostgresVectorStore {
    pool: PgPool,
}

impl PostgresVectorStore {
    pub async fn new(database_url: &str, run_migrations: bool) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await
            .map_err(|e| CoreError::StorageError(format!("failed to connect to database: {}", e)))?;

        if run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| CoreError::StorageError(format!("migration failed: {}", e)))?;
        }

        Ok(PostgresVectorStore { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_chunk(row: &PgRow) -> Result<Chunk, CoreError> {
    let category_label: String = row.try_get("category").map_err(|e| CoreError::StorageError(e.to_string()))?;
    let category = Category::from_str(&category_label)
        .map_err(|e| CoreError::StorageError(format!("invalid category in row: {}", e)))?;
    let embedding: pgvector::Vector = row.try_get("embedding").map_err(|e| CoreError::StorageError(e.to_string()))?;

    Ok(Chunk {
        id: row.try_get("id").map_err(|e| CoreError::StorageError(e.to_string()))?,
        record_id: row.try_get("record_id").map_err(|e| CoreError::StorageError(e.to_string()))?,
        chunk_index: row.try_get("chunk_index").map_err(|e| CoreError::StorageError(e.to_string()))?,
        body: row.try_get("text").map_err(|e| CoreError::StorageError(e.to_string()))?,
        category,
        embedding: embedding.to_vec(),
    })
}

#[async_trait]
impl VectorStore for PostgresVectorStore {
    async fn put_chunks(&self, record_id: &str, chunks: Vec<NewChunk>) -> Result<Vec<Chunk>, CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::StorageError(format!("failed to start transaction: {}", e)))?;

        let mut inserted = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let id = Uuid::new_v4().to_string();
            let embedding = pgvector::Vector::from(chunk.embedding.clone());

            sqlx::query(
                "INSERT INTO chunks (id, record_id, chunk_index, text, category, embedding) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&id)
            .bind(record_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.body)
            .bind(chunk.category.label())
            .bind(&embedding)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::StorageError(format!("failed to insert chunk: {}", e)))?;

            inserted.push(Chunk {
                id,
                record_id: record_id.to_string(),
                chunk_index: chunk.chunk_index,
                body: chunk.body,
                category: chunk.category,
                embedding: chunk.embedding,
            });
        }

        tx.commit()
            .await
            .map_err(|e| CoreError::StorageError(format!("failed to commit chunk batch: {}", e)))?;

        Ok(inserted)
    }

    async fn get_by_category(&self, record_id: &str, category: Category) -> Result<Vec<Chunk>, CoreError> {
        let rows = sqlx::query(
            "SELECT id, record_id, chunk_index, text, category, embedding \
             FROM chunks WHERE record_id = $1 AND category = $2 ORDER BY chunk_index ASC",
        )
        .bind(record_id)
        .bind(category.label())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        rows.iter().map(row_to_chunk).collect()
    }

    async fn categories_present(&self, record_id: &str) -> Result<Vec<Category>, CoreError> {
        let rows = sqlx::query("SELECT DISTINCT category FROM chunks WHERE record_id = $1")
            .bind(record_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::StorageError(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let label: String = row.try_get("category").map_err(|e| CoreError::StorageError(e.to_string()))?;
                Category::from_str(&label).map_err(|e| CoreError::StorageError(e))
            })
            .collect()
    }

    async fn search(
        &self,
        record_id: &str,
        query_vec: &[f32],
        k: usize,
        category: Option<Category>,
    ) -> Result<Vec<ScoredChunk>, CoreError> {
        let query_embedding = pgvector::Vector::from(query_vec.to_vec());

        let rows = if let Some(cat) = category {
            sqlx::query(
                "SELECT id, record_id, chunk_index, text, category, embedding, \
                        (1 - (embedding <=> $1)) AS similarity \
                 FROM chunks \
                 WHERE record_id = $2 AND category = $3 \
                 ORDER BY embedding <=> $1 ASC, chunk_index ASC \
                 LIMIT $4",
            )
            .bind(&query_embedding)
            .bind(record_id)
            .bind(cat.label())
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                "SELECT id, record_id, chunk_index, text, category, embedding, \
                        (1 - (embedding <=> $1)) AS similarity \
                 FROM chunks \
                 WHERE record_id = $2 \
                 ORDER BY embedding <=> $1 ASC, chunk_index ASC \
                 LIMIT $3",
            )
            .bind(&query_embedding)
            .bind(record_id)
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| CoreError::StorageError(format!("search query failed: {}", e)))?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk = row_to_chunk(row)?;
            let raw_similarity: f64 = row.try_get("similarity").map_err(|e| CoreError::StorageError(e.to_string()))?;
            hits.push(ScoredChunk {
                chunk,
                score: raw_similarity.clamp(-1.0, 1.0),
            });
        }

        Ok(hits)
    }

    async fn delete_by_record(&self, record_id: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM chunks WHERE record_id = $1")
            .bind(record_id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StorageError(e.to_string()))?;
        Ok(())
    }
}
