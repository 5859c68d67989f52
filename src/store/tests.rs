use super::*;
use crate::metadata::ContentType;
use tempfile::TempDir;

const DIM: usize = 8;

fn record(id: &str, content: &str, seed: f32) -> EmbeddingRecord {
    let vector: Vec<f32> = (0..DIM).map(|i| (i as f32).mul_add(0.1, seed)).collect();
    EmbeddingRecord {
        id: id.to_string(),
        vector,
        chunk: Chunk {
            content: content.to_string(),
            metadata: DocumentMetadata {
                source_file: format!("files/emails/email_{}_Test.html", id),
                filename: format!("email_{}_Test", id),
                content_type: ContentType::Email,
                collection: "emails".to_string(),
                sequence_number: Some(id.to_string()),
                title: Some("Test".to_string()),
                source_url: Some(format!(
                    "https://satoshi.nakamotoinstitute.org/emails/{}/",
                    id
                )),
                date: None,
            },
            chunk_index: 0,
            total_chunks: 1,
        },
    }
}

fn query_vector(seed: f32) -> Vec<f32> {
    (0..DIM).map(|i| (i as f32).mul_add(0.1, seed)).collect()
}

#[tokio::test]
async fn rebuild_and_search() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::open(&temp_dir.path().join("vectors"))
        .await
        .expect("should open store");

    assert!(!store.is_initialized().await.expect("can check table"));

    let records = vec![
        record("001", "scarcity and inflation", 0.0),
        record("002", "proof of work", 1.0),
        record("003", "digital signatures", 2.0),
    ];
    store.rebuild(records).await.expect("should rebuild");

    assert_eq!(store.count().await.expect("can count"), 3);

    let results = store
        .search(&query_vector(0.0), 2)
        .await
        .expect("should search");
    assert_eq!(results.len(), 2);
    // Nearest neighbor to seed 0.0 is the seed-0.0 record.
    assert_eq!(results[0].chunk.content, "scarcity and inflation");
    assert!(results[0].similarity >= results[1].similarity);
}

#[tokio::test]
async fn metadata_survives_the_store() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::open(&temp_dir.path().join("vectors"))
        .await
        .expect("should open store");

    store
        .rebuild(vec![record("042", "lost coins", 0.5)])
        .await
        .expect("should rebuild");

    let results = store
        .search(&query_vector(0.5), 1)
        .await
        .expect("should search");
    let metadata = &results[0].chunk.metadata;

    assert_eq!(metadata.content_type, ContentType::Email);
    assert_eq!(metadata.collection, "emails");
    assert_eq!(metadata.sequence_number.as_deref(), Some("042"));
    assert_eq!(
        metadata.source_url.as_deref(),
        Some("https://satoshi.nakamotoinstitute.org/emails/042/")
    );
    assert_eq!(metadata.date, None);
    assert_eq!(results[0].chunk.total_chunks, 1);
}

#[tokio::test]
async fn search_is_deterministic_for_fixed_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::open(&temp_dir.path().join("vectors"))
        .await
        .expect("should open store");

    let records = (0..10)
        .map(|i| record(&format!("{:03}", i), &format!("chunk {}", i), i as f32))
        .collect();
    store.rebuild(records).await.expect("should rebuild");

    let first = store
        .search(&query_vector(4.2), 5)
        .await
        .expect("should search");
    let second = store
        .search(&query_vector(4.2), 5)
        .await
        .expect("should search");

    let first_ids: Vec<&str> = first.iter().map(|r| r.chunk.content.as_str()).collect();
    let second_ids: Vec<&str> = second.iter().map(|r| r.chunk.content.as_str()).collect();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn reopened_store_answers_identically() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vectors");

    let before = {
        let mut store = VectorStore::open(&path).await.expect("should open store");
        let records = (0..6)
            .map(|i| record(&format!("{:03}", i), &format!("chunk {}", i), i as f32))
            .collect();
        store.rebuild(records).await.expect("should rebuild");
        store
            .search(&query_vector(2.0), 3)
            .await
            .expect("should search")
    };

    let reopened = VectorStore::open(&path).await.expect("should reopen store");
    assert!(reopened.is_initialized().await.expect("can check table"));
    let after = reopened
        .search(&query_vector(2.0), 3)
        .await
        .expect("should search");

    let before_contents: Vec<&str> = before.iter().map(|r| r.chunk.content.as_str()).collect();
    let after_contents: Vec<&str> = after.iter().map(|r| r.chunk.content.as_str()).collect();
    assert_eq!(before_contents, after_contents);
}

#[tokio::test]
async fn rebuild_refuses_zero_records() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::open(&temp_dir.path().join("vectors"))
        .await
        .expect("should open store");

    let result = store.rebuild(Vec::new()).await;
    assert!(matches!(result, Err(QaError::Store(_))));
}

#[tokio::test]
async fn rebuild_rejects_inconsistent_dimensions() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::open(&temp_dir.path().join("vectors"))
        .await
        .expect("should open store");

    let mut bad = record("002", "short vector", 1.0);
    bad.vector.truncate(DIM - 1);

    let result = store
        .rebuild(vec![record("001", "good vector", 0.0), bad])
        .await;
    assert!(matches!(result, Err(QaError::Store(_))));
}
