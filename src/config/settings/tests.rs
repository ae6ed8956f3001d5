use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.model, "nomic-embed-text:latest");
    assert_eq!(config.ollama.embedding_dimension, 768);
    assert_eq!(config.ollama.health_timeout_secs, 3);
    assert_eq!(config.ollama.retry_attempts, 1);
    assert_eq!(config.chunking.max_chunk_size, 1024);
    assert_eq!(config.chunking.overlap_size, 100);
    assert_eq!(config.chunking.max_embed_chars, 4000);
    assert_eq!(config.storage.max_connections, 1);
    assert_eq!(config.storage.table_name, "chunks");
    assert!(config.validate().is_ok());
}

#[test]
fn ollama_validation() {
    let config = Config::default();

    let mut invalid = config.clone();
    invalid.ollama.protocol = "ftp".to_string();
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));

    let mut invalid = config.clone();
    invalid.ollama.port = 0;
    assert!(invalid.validate().is_err());

    let mut invalid = config.clone();
    invalid.ollama.model = "  ".to_string();
    assert!(matches!(invalid.validate(), Err(ConfigError::InvalidModel(_))));

    let mut invalid = config.clone();
    invalid.ollama.embedding_dimension = 0;
    assert!(invalid.validate().is_err());

    let mut invalid = config.clone();
    invalid.ollama.health_timeout_secs = 0;
    assert!(matches!(invalid.validate(), Err(ConfigError::InvalidTimeout(0))));

    let mut invalid = config;
    invalid.ollama.retry_attempts = 0;
    assert!(invalid.validate().is_err());
}

#[test]
fn chunking_validation() {
    let config = Config::default();

    let mut invalid = config.clone();
    invalid.chunking.overlap_size = invalid.chunking.max_chunk_size;
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::OverlapTooLarge(1024, 1024))
    ));

    let mut invalid = config.clone();
    invalid.chunking.max_chunk_size = 0;
    invalid.chunking.overlap_size = 0;
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::InvalidMaxChunkSize(0))
    ));

    let mut invalid = config.clone();
    invalid.chunking.max_embed_chars = 0;
    assert!(invalid.validate().is_err());

    let mut valid = config;
    valid.chunking.overlap_size = 0;
    assert!(valid.validate().is_ok());
}

#[test]
fn storage_validation() {
    let config = Config::default();

    let mut invalid = config.clone();
    invalid.storage.max_connections = 0;
    assert!(invalid.validate().is_err());

    let mut invalid = config.clone();
    invalid.storage.table_name = "chunks; drop".to_string();
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::InvalidTableName(_))
    ));

    let mut valid = config;
    valid.storage.table_name = "project_chunks_v2".to_string();
    assert!(valid.validate().is_ok());
}

#[test]
fn ollama_url_generation() {
    let config = OllamaConfig::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");

    let config = OllamaConfig {
        protocol: "https".to_string(),
        host: "secure.example.com".to_string(),
        port: 443,
        ..OllamaConfig::default()
    };
    let url = config
        .ollama_url()
        .expect("should generate https url successfully");
    assert_eq!(url.as_str(), "https://secure.example.com/");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let parsed: Config = toml::from_str(
        r#"
            [ollama]
            model = "mxbai-embed-large"
            embedding_dimension = 1024

            [chunking]
            overlap_size = 50
        "#,
    )
    .expect("should parse partial toml");

    assert_eq!(parsed.ollama.model, "mxbai-embed-large");
    assert_eq!(parsed.ollama.embedding_dimension, 1024);
    assert_eq!(parsed.ollama.host, "localhost");
    assert_eq!(parsed.chunking.overlap_size, 50);
    assert_eq!(parsed.chunking.max_chunk_size, 1024);
    assert_eq!(parsed.storage, StorageConfig::default());
}

#[test]
fn load_missing_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("missing config should load defaults");
    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.database_path(), temp_dir.path().join("metadata.db"));
    assert_eq!(
        config.vector_database_path(),
        temp_dir.path().join("vectors")
    );
}

#[test]
fn save_then_load() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let base_dir = temp_dir.path().join("nested").join("home");

    let mut config = Config {
        base_dir: base_dir.clone(),
        ..Config::default()
    };
    config.ollama.model = "all-minilm".to_string();
    config.ollama.embedding_dimension = 384;
    config.storage.table_name = "notes".to_string();
    config.save().expect("should save config");

    assert!(config.config_file_path().exists());

    let loaded = Config::load(&base_dir).expect("should load saved config");
    assert_eq!(loaded, config);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[chunking]\nmax_chunk_size = 100\noverlap_size = 200\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn save_refuses_invalid_config() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.ollama.protocol = "gopher".to_string();

    assert!(config.save().is_err());
    assert!(!temp_dir.path().join("config.toml").exists());
}
