use super::*;
use crate::fingerprint::hash_text;
use tempfile::TempDir;

const DIM: usize = 4;

async fn create_test_store(dimension: usize) -> (VectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::new(&temp_dir.path().join("vectors"), "chunks", dimension)
        .await
        .expect("should create vector store");
    (store, temp_dir)
}

fn record(file_path: &str, chunk_index: u32, content: &str, vector: Vec<f32>) -> EmbeddingRecord {
    EmbeddingRecord {
        id: uuid::Uuid::new_v4().to_string(),
        vector,
        metadata: ChunkMetadata {
            file_path: file_path.to_string(),
            chunk_index,
            file_hash: hash_text(file_path),
            chunk_hash: hash_text(content),
            file_type: if file_path.ends_with(".md") {
                FileType::Markdown
            } else {
                FileType::Code
            },
            language: (!file_path.ends_with(".md")).then(|| "rust".to_string()),
            section: Some("Intro".to_string()),
            content: content.to_string(),
            token_count: 3,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        },
    }
}

#[tokio::test]
async fn vector_store_initialization() {
    let (store, _temp_dir) = create_test_store(DIM).await;

    assert_eq!(store.table_name(), "chunks");
    assert_eq!(store.vector_dimension(), DIM);
    assert_eq!(store.count_embeddings().await.expect("should count"), 0);
    assert!(store.validate_integrity().await.expect("should validate"));
}

#[tokio::test]
async fn search_on_empty_table_is_empty() {
    let (store, _temp_dir) = create_test_store(DIM).await;

    let results = store
        .search_similar(&[1.0, 0.0, 0.0, 0.0], 5, None)
        .await
        .expect("search should succeed");
    assert!(results.is_empty());
}

#[tokio::test]
async fn replace_file_is_replace_not_append() {
    let (mut store, _temp_dir) = create_test_store(DIM).await;

    let first = vec![
        record("a.md", 0, "zero", vec![1.0, 0.0, 0.0, 0.0]),
        record("a.md", 1, "one", vec![0.0, 1.0, 0.0, 0.0]),
        record("a.md", 2, "two", vec![0.0, 0.0, 1.0, 0.0]),
    ];
    assert_eq!(store.replace_file("a.md", first).await.expect("write"), 3);
    assert_eq!(store.count_embeddings().await.expect("count"), 3);

    let second = vec![record("a.md", 0, "fresh", vec![0.0, 0.0, 0.0, 1.0])];
    store.replace_file("a.md", second).await.expect("replace");

    assert_eq!(store.count_embeddings().await.expect("count"), 1);
    let vectors = store.vectors_for_file("a.md").await.expect("vectors");
    assert_eq!(vectors.len(), 1);
    assert_eq!(
        vectors.get(&hash_text("fresh")),
        Some(&vec![0.0, 0.0, 0.0, 1.0])
    );
}

#[tokio::test]
async fn replace_leaves_other_files_alone() {
    let (mut store, _temp_dir) = create_test_store(DIM).await;

    store
        .replace_file("a.md", vec![record("a.md", 0, "a", vec![1.0, 0.0, 0.0, 0.0])])
        .await
        .expect("write a");
    store
        .replace_file(
            "b.rs",
            vec![
                record("b.rs", 0, "b0", vec![0.0, 1.0, 0.0, 0.0]),
                record("b.rs", 1, "b1", vec![0.0, 1.0, 1.0, 0.0]),
            ],
        )
        .await
        .expect("write b");
    store.delete_file("a.md").await.expect("delete a");

    let counts = store.file_chunk_counts().await.expect("counts");
    assert_eq!(counts.len(), 1);
    assert_eq!(counts.get("b.rs"), Some(&2));
}

#[tokio::test]
async fn paths_with_quotes_are_escaped() {
    let (mut store, _temp_dir) = create_test_store(DIM).await;
    let path = "notes/it's here.md";

    store
        .replace_file(path, vec![record(path, 0, "quoted", vec![1.0, 1.0, 0.0, 0.0])])
        .await
        .expect("write");
    assert_eq!(store.vectors_for_file(path).await.expect("vectors").len(), 1);

    store.delete_file(path).await.expect("delete");
    assert_eq!(store.count_embeddings().await.expect("count"), 0);
}

#[tokio::test]
async fn search_orders_by_distance_and_filters() {
    let (mut store, _temp_dir) = create_test_store(DIM).await;

    store
        .replace_file(
            "guide.md",
            vec![
                record("guide.md", 0, "exact", vec![1.0, 0.0, 0.0, 0.0]),
                record("guide.md", 1, "near", vec![0.9, 0.1, 0.0, 0.0]),
                record("guide.md", 2, "far", vec![0.0, 0.0, 1.0, 0.0]),
            ],
        )
        .await
        .expect("write markdown");
    store
        .replace_file(
            "lib.rs",
            vec![record("lib.rs", 0, "code", vec![1.0, 0.05, 0.0, 0.0])],
        )
        .await
        .expect("write code");

    let results = store
        .search_similar(&[1.0, 0.0, 0.0, 0.0], 10, None)
        .await
        .expect("search");
    assert_eq!(results.len(), 4);
    assert_eq!(results[0].chunk_metadata.content, "exact");
    assert!(results[0].distance.abs() < 1e-5);
    assert!(
        results
            .windows(2)
            .all(|pair| pair[0].distance <= pair[1].distance)
    );
    assert_eq!(results[3].chunk_metadata.content, "far");

    let limited = store
        .search_similar(&[1.0, 0.0, 0.0, 0.0], 2, None)
        .await
        .expect("search");
    assert_eq!(limited.len(), 2);

    let code_only = store
        .search_similar(&[1.0, 0.0, 0.0, 0.0], 10, Some(FileType::Code))
        .await
        .expect("search");
    assert_eq!(code_only.len(), 1);
    assert_eq!(code_only[0].chunk_metadata.file_path, "lib.rs");
    assert_eq!(code_only[0].chunk_metadata.language.as_deref(), Some("rust"));
    assert_eq!(code_only[0].chunk_metadata.section.as_deref(), Some("Intro"));
}

#[tokio::test]
async fn dimension_change_on_empty_table_recreates() {
    let (mut store, _temp_dir) = create_test_store(8).await;

    store
        .replace_file("a.md", vec![record("a.md", 0, "a", vec![0.5; DIM])])
        .await
        .expect("empty table should adopt the new dimension");
    assert_eq!(store.vector_dimension(), DIM);
    assert_eq!(store.count_embeddings().await.expect("count"), 1);
}

#[tokio::test]
async fn dimension_mismatch_on_populated_table_is_database_error() {
    let (mut store, _temp_dir) = create_test_store(DIM).await;
    store
        .replace_file("a.md", vec![record("a.md", 0, "a", vec![0.5; DIM])])
        .await
        .expect("write");

    let result = store
        .replace_file("b.md", vec![record("b.md", 0, "b", vec![0.5; 6])])
        .await;
    match result {
        Err(IndexError::Database(message)) => assert!(message.contains("dimension mismatch")),
        other => panic!("expected database error, got {:?}", other.map(|_| ())),
    }
    assert_eq!(store.count_embeddings().await.expect("count"), 1);

    let search = store.search_similar(&[0.5; 6], 3, None).await;
    assert!(matches!(search, Err(IndexError::Database(_))));
}

#[tokio::test]
async fn reopening_keeps_populated_table_dimension() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vectors");

    let mut store = VectorStore::new(&path, "chunks", DIM)
        .await
        .expect("should create store");
    store
        .replace_file("a.md", vec![record("a.md", 0, "a", vec![0.5; DIM])])
        .await
        .expect("write");
    drop(store);

    let reopened = VectorStore::new(&path, "chunks", 16)
        .await
        .expect("should reopen store");
    assert_eq!(reopened.vector_dimension(), DIM);
    assert_eq!(reopened.count_embeddings().await.expect("count"), 1);
}

#[tokio::test]
async fn reset_drops_everything() {
    let (mut store, _temp_dir) = create_test_store(DIM).await;
    store
        .replace_file("a.md", vec![record("a.md", 0, "a", vec![0.5; DIM])])
        .await
        .expect("write");

    store.reset(6).await.expect("reset");
    assert_eq!(store.vector_dimension(), 6);
    assert_eq!(store.count_embeddings().await.expect("count"), 0);

    store
        .replace_file("b.md", vec![record("b.md", 0, "b", vec![0.5; 6])])
        .await
        .expect("write after reset");
}

#[tokio::test]
async fn optimize_after_writes() {
    let (mut store, _temp_dir) = create_test_store(DIM).await;
    for round in 0..3u32 {
        store
            .replace_file(
                "a.md",
                vec![record("a.md", 0, &round.to_string(), vec![0.5; DIM])],
            )
            .await
            .expect("write");
    }

    store.optimize().await.expect("optimize");
    assert_eq!(store.count_embeddings().await.expect("count"), 1);
}

#[test]
fn sql_string_escapes_quotes() {
    assert_eq!(sql_string("plain"), "'plain'");
    assert_eq!(sql_string("it's"), "'it''s'");
}
