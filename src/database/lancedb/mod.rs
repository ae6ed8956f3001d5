// LanceDB vector database module
// One record per indexed chunk, holding its vector and everything a query result reports

pub mod vector_store;

use serde::{Deserialize, Serialize};

use crate::embeddings::chunking::FileType;

pub use vector_store::{SearchResult, VectorStore};

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Vector id, shared with the SQLite chunk ledger
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Metadata for a chunk stored alongside its embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Grouping key; all records of a file are replaced together
    pub file_path: String,
    /// Position of the chunk within its file
    pub chunk_index: u32,
    pub file_hash: String,
    pub chunk_hash: String,
    pub file_type: FileType,
    pub language: Option<String>,
    /// Heading the chunk was found under
    pub section: Option<String>,
    pub content: String,
    pub token_count: u32,
    /// RFC 3339 timestamp of when the file was first indexed
    pub created_at: String,
    /// RFC 3339 timestamp of the write that produced this record
    pub updated_at: String,
}
