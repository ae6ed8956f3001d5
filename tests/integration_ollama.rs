#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance
// Run with: OLLAMA_INTEGRATION=1 cargo test --test integration_ollama

use semindex::config::{Config, OllamaConfig};
use semindex::embeddings::ollama::OllamaClient;
use semindex::embeddings::{Embedder, estimate_token_count};
use semindex::indexer::Indexer;
use semindex::retriever::Retriever;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::info;

const TEST_MODEL: &str = "nomic-embed-text:latest";
const DEFAULT_OLLAMA_HOST: &str = "localhost";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

fn enabled() -> bool {
    if env::var_os("OLLAMA_INTEGRATION").is_some() {
        true
    } else {
        eprintln!("skipping: set OLLAMA_INTEGRATION=1 to run against a local Ollama");
        false
    }
}

fn integration_config() -> OllamaConfig {
    OllamaConfig {
        host: env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string()),
        port: env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_OLLAMA_PORT),
        model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| TEST_MODEL.to_string()),
        ..OllamaConfig::default()
    }
}

fn create_integration_test_client() -> OllamaClient {
    OllamaClient::new(&integration_config())
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(3)
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

#[test]
fn real_ollama_health_and_model() {
    if !enabled() {
        return;
    }
    init_test_tracing();

    let client = create_integration_test_client();
    assert!(client.is_reachable(), "Ollama should be reachable");

    let models = client.list_models().expect("should list models");
    info!("Available models: {:?}", models.iter().map(|m| &m.name).collect::<Vec<_>>());
    client
        .validate_model()
        .expect("test model should be pulled");
}

#[tokio::test(flavor = "multi_thread")]
async fn real_ollama_embeddings_keep_order_and_width() {
    if !enabled() {
        return;
    }
    init_test_tracing();

    let client = create_integration_test_client();
    let texts = vec![
        "Rust ownership rules prevent data races.".to_string(),
        "SQLite stores the whole database in one file.".to_string(),
        "Cosine distance compares vector directions.".to_string(),
    ];

    let vectors = client.embed(&texts).await.expect("should embed");

    assert_eq!(vectors.len(), texts.len());
    let width = vectors[0].len();
    assert!(width > 0);
    assert!(vectors.iter().all(|v| v.len() == width));
    assert_ne!(vectors[0], vectors[1]);

    let single = client.embed(&texts[1..2]).await.expect("should embed");
    assert_eq!(single[0].len(), width);
    info!(
        "Embedded {} texts (~{} tokens) at width {}",
        texts.len(),
        texts.iter().map(|t| estimate_token_count(t)).sum::<usize>(),
        width
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn real_ollama_sync_and_search() {
    if !enabled() {
        return;
    }
    init_test_tracing();

    let client = create_integration_test_client();
    let sample = client
        .embed(&["sample".to_string()])
        .await
        .expect("should embed sample");

    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        ollama: integration_config(),
        base_dir: temp_dir.path().join("index"),
        ..Config::default()
    };
    config.ollama.embedding_dimension = u32::try_from(sample[0].len()).expect("width fits");

    let docs = temp_dir.path().join("docs");
    std::fs::create_dir_all(&docs).expect("should create docs dir");
    let install = docs.join("install.md");
    std::fs::write(
        &install,
        "# Installation\n\nDownload the archive, unpack it and add the binary to your PATH.\n",
    )
    .expect("write");
    let cooking = docs.join("cooking.md");
    std::fs::write(
        &cooking,
        "# Pancakes\n\nWhisk flour, eggs and milk, then fry in a hot buttered pan.\n",
    )
    .expect("write");

    let embedder: Arc<dyn Embedder> = Arc::new(client);
    let mut indexer = Indexer::new(&config, Arc::clone(&embedder))
        .await
        .expect("should open index");
    let outcome = indexer.sync(&[install.clone(), cooking], false).await;
    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
    assert_eq!(outcome.files_processed, 2);

    let retriever = Retriever::from_config(&config, embedder)
        .await
        .expect("should open retriever");
    let results = retriever
        .try_search("how do I install the program", 1, None)
        .await
        .expect("should search");

    assert_eq!(results.len(), 1);
    assert!(results[0].file_path.ends_with("install.md"));
}
