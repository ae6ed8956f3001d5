
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::embeddings::chunking::FileType;

/// A file whose chunks are in the index, keyed by path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IndexedFile {
    pub file_path: String,
    pub file_hash: String,
    pub file_type: FileType,
    pub language: Option<String>,
    pub chunk_count: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl IndexedFile {
    #[inline]
    pub fn has_chunks(&self) -> bool {
        self.chunk_count > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIndexedFile {
    pub file_path: String,
    pub file_hash: String,
    pub file_type: FileType,
    pub language: Option<String>,
    pub chunk_count: i64,
}

/// Ledger row for one chunk written to the vector table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChunkRecord {
    pub id: i64,
    pub file_path: String,
    pub chunk_index: i64,
    pub chunk_hash: String,
    pub section: Option<String>,
    pub token_count: i64,
    pub content_length: i64,
    pub vector_id: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChunkRecord {
    pub chunk_index: i64,
    pub chunk_hash: String,
    pub section: Option<String>,
    pub token_count: i64,
    pub content_length: i64,
    pub vector_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IndexStatistics {
    pub total_files: i64,
    pub total_chunks: i64,
    pub total_tokens: i64,
    pub last_updated: Option<NaiveDateTime>,
}

impl IndexStatistics {
    #[inline]
    pub fn average_chunks_per_file(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            self.total_chunks as f64 / self.total_files as f64
        }
    }
}
