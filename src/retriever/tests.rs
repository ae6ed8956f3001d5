use super::*;
use crate::database::lancedb::{ChunkMetadata, EmbeddingRecord};
use crate::fingerprint::hash_text;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const DIM: usize = 3;

/// Embeds known words to fixed vectors and fails on anything else
struct TableEmbedder {
    vectors: HashMap<&'static str, Vec<f32>>,
    calls: AtomicUsize,
}

impl TableEmbedder {
    fn new() -> Self {
        let vectors = HashMap::from([
            ("install", vec![1.0, 0.0, 0.0]),
            ("usage", vec![0.0, 1.0, 0.0]),
            ("wide", vec![1.0, 0.0, 0.0, 0.0]),
        ]);
        Self {
            vectors,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        texts
            .iter()
            .map(|text| {
                self.vectors
                    .get(text.as_str())
                    .cloned()
                    .ok_or_else(|| IndexError::Transport("service unavailable".to_string()))
            })
            .collect()
    }

    async fn health(&self) -> bool {
        true
    }
}

fn record(path: &str, index: u32, content: &str, file_type: FileType, vector: Vec<f32>) -> EmbeddingRecord {
    EmbeddingRecord {
        id: format!("{}-{}", path, index),
        vector,
        metadata: ChunkMetadata {
            file_path: path.to_string(),
            chunk_index: index,
            file_hash: hash_text(path),
            chunk_hash: hash_text(content),
            file_type,
            language: None,
            section: Some("Setup".to_string()),
            content: content.to_string(),
            token_count: 4,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        },
    }
}

async fn create_retriever(populate: bool) -> (Retriever, Arc<TableEmbedder>, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::new(&temp_dir.path().join("vectors"), "chunks", DIM)
        .await
        .expect("should create vector store");

    if populate {
        store
            .replace_file(
                "/docs/guide.md",
                vec![
                    record("/docs/guide.md", 0, "how to install", FileType::Markdown, vec![1.0, 0.0, 0.0]),
                    record("/docs/guide.md", 1, "how to use", FileType::Markdown, vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .expect("write guide");
        store
            .replace_file(
                "/src/setup.rs",
                vec![record("/src/setup.rs", 0, "fn install()", FileType::Code, vec![0.8, 0.2, 0.0])],
            )
            .await
            .expect("write code");
    }

    let embedder = Arc::new(TableEmbedder::new());
    let retriever = Retriever::new(store, embedder.clone());
    (retriever, embedder, temp_dir)
}

#[test]
fn score_is_clamped_similarity() {
    assert!((score_from_distance(0.0) - 1.0).abs() < f32::EPSILON);
    assert!((score_from_distance(0.25) - 0.75).abs() < f32::EPSILON);
    assert!(score_from_distance(1.5).abs() < f32::EPSILON);
    assert!((score_from_distance(-0.1) - 1.0).abs() < f32::EPSILON);
}

#[tokio::test]
async fn empty_store_returns_no_results() {
    let (retriever, _, _temp_dir) = create_retriever(false).await;

    assert!(retriever.search("install", 5, None).await.is_empty());
    assert!(
        retriever
            .try_search("install", 5, None)
            .await
            .expect("empty store is not an error")
            .is_empty()
    );
}

#[tokio::test]
async fn results_are_ordered_closest_first() {
    let (retriever, _, _temp_dir) = create_retriever(true).await;

    let results = retriever.search("install", 10, None).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].content, "how to install");
    assert_eq!(results[1].file_path, "/src/setup.rs");
    assert_eq!(results[2].content, "how to use");
    assert!(results.windows(2).all(|pair| pair[0].distance <= pair[1].distance));
    assert!(results.windows(2).all(|pair| pair[0].score >= pair[1].score));
    assert_eq!(results[0].section.as_deref(), Some("Setup"));
}

#[tokio::test]
async fn top_k_caps_results() {
    let (retriever, _, _temp_dir) = create_retriever(true).await;

    let results = retriever.search("install", 1, None).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk_index, 0);
    assert_eq!(results[0].file_path, "/docs/guide.md");
}

#[tokio::test]
async fn file_type_filter_applies() {
    let (retriever, _, _temp_dir) = create_retriever(true).await;

    let results = retriever.search("install", 10, Some(FileType::Code)).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].file_type, FileType::Code);

    let none = retriever.search("install", 10, Some(FileType::Text)).await;
    assert!(none.is_empty());
}

#[tokio::test]
async fn zero_top_k_skips_the_embedder() {
    let (retriever, embedder, _temp_dir) = create_retriever(true).await;

    assert!(retriever.search("install", 0, None).await.is_empty());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn embedding_failure_degrades_to_empty() {
    let (retriever, _, _temp_dir) = create_retriever(true).await;

    assert!(retriever.search("unknown words", 5, None).await.is_empty());
    assert!(matches!(
        retriever.try_search("unknown words", 5, None).await,
        Err(IndexError::Transport(_))
    ));
}

#[tokio::test]
async fn query_dimension_mismatch_is_reported_by_try_search() {
    let (retriever, _, _temp_dir) = create_retriever(true).await;

    assert!(retriever.search("wide", 5, None).await.is_empty());
    assert!(matches!(
        retriever.try_search("wide", 5, None).await,
        Err(IndexError::Database(_))
    ));
}
