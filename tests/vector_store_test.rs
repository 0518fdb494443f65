//! Invariants an in-memory `VectorStore` must uphold: per-record
//! isolation, category filtering, ordering, and idempotent deletion.

use interview_core::store::memory::InMemoryVectorStore;
use interview_core::store::{Category, NewChunk, VectorStore};

fn chunk(idx: i32, category: Category, embedding: Vec<f32>) -> NewChunk {
    NewChunk {
        chunk_index: idx,
        body: format!("chunk {}", idx),
        category,
        embedding,
    }
}

#[tokio::test]
async fn search_never_crosses_record_boundaries() {
    let store = InMemoryVectorStore::new();
    store.put_chunks("r1", vec![chunk(0, Category::Grades, vec![1.0, 0.0])]).await.unwrap();
    store.put_chunks("r2", vec![chunk(0, Category::Grades, vec![1.0, 0.0])]).await.unwrap();

    let hits = store.search("r1", &[1.0, 0.0], 10, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.record_id, "r1");
}

#[tokio::test]
async fn fewer_than_k_matches_returns_all_of_them() {
    let store = InMemoryVectorStore::new();
    store
        .put_chunks("r1", vec![chunk(0, Category::Reading, vec![1.0, 0.0]), chunk(1, Category::Reading, vec![0.9, 0.1])])
        .await
        .unwrap();

    let hits = store.search("r1", &[1.0, 0.0], 10, Some(Category::Reading)).await.unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn get_by_category_orders_by_chunk_index_ascending() {
    let store = InMemoryVectorStore::new();
    store
        .put_chunks(
            "r1",
            vec![
                chunk(2, Category::Awards, vec![0.1, 0.9]),
                chunk(0, Category::Awards, vec![1.0, 0.0]),
                chunk(1, Category::Awards, vec![0.5, 0.5]),
            ],
        )
        .await
        .unwrap();

    let chunks = store.get_by_category("r1", Category::Awards).await.unwrap();
    let indices: Vec<i32> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[tokio::test]
async fn categories_present_reflects_only_inserted_categories() {
    let store = InMemoryVectorStore::new();
    store
        .put_chunks("r1", vec![chunk(0, Category::Grades, vec![1.0, 0.0]), chunk(1, Category::Career, vec![0.0, 1.0])])
        .await
        .unwrap();

    let mut categories = store.categories_present("r1").await.unwrap();
    categories.sort_by_key(|c| c.label());
    let mut expected = vec![Category::Grades, Category::Career];
    expected.sort_by_key(|c| c.label());
    assert_eq!(categories, expected);
}

#[tokio::test]
async fn delete_by_record_is_idempotent() {
    let store = InMemoryVectorStore::new();
    store.put_chunks("r1", vec![chunk(0, Category::Grades, vec![1.0, 0.0])]).await.unwrap();

    store.delete_by_record("r1").await.unwrap();
    store.delete_by_record("r1").await.unwrap();

    assert!(store.categories_present("r1").await.unwrap().is_empty());
}

#[tokio::test]
async fn category_label_round_trips_for_every_variant() {
    for category in Category::ALL {
        let label = category.label();
        let parsed: Category = label.parse().unwrap();
        assert_eq!(parsed.label(), label);
    }
}
