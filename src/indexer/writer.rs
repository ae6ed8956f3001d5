//! Atomic per-file replace across both stores.
//!
//! The SQLite manifest row and chunk ledger are rewritten inside one transaction, the LanceDB
//! records for the path are replaced in one table commit, and the transaction only commits once
//! that replace has succeeded.

use chrono::Utc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::database::lancedb::{ChunkMetadata, EmbeddingRecord, VectorStore};
use crate::database::sqlite::Database;
use crate::database::sqlite::models::{NewChunkRecord, NewIndexedFile};
use crate::database::sqlite::queries::{ChunkQueries, FileQueries};
use crate::embeddings::chunking::{Chunk, FileType};
use crate::{IndexError, Result};

/// A chunk paired with the vector to store for it
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// File-level facts recorded alongside its chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub file_path: String,
    pub file_hash: String,
    pub file_type: FileType,
    pub language: Option<String>,
}

/// Sole mutator of the index
pub struct IndexWriter<'a> {
    database: &'a Database,
    vector_store: &'a mut VectorStore,
}

impl<'a> IndexWriter<'a> {
    #[inline]
    pub fn new(database: &'a Database, vector_store: &'a mut VectorStore) -> Self {
        Self {
            database,
            vector_store,
        }
    }

    /// Replace everything stored for `file` with `chunks`, returning the number written.
    ///
    /// On any failure both stores keep the previous state of the file.
    #[inline]
    pub async fn write_file(&mut self, file: &FileEntry, chunks: Vec<EmbeddedChunk>) -> Result<usize> {
        let now = Utc::now();
        let now_naive = now.naive_utc();
        let updated_at = now.to_rfc3339();

        let mut ledger = Vec::with_capacity(chunks.len());
        let mut records = Vec::with_capacity(chunks.len());
        for EmbeddedChunk { chunk, vector } in chunks {
            let chunk_index = u32::try_from(chunk.index).map_err(|_| {
                IndexError::Database(format!("Chunk index {} is out of range", chunk.index))
            })?;
            let token_count = u32::try_from(chunk.token_count).unwrap_or(u32::MAX);
            let vector_id = Uuid::new_v4().to_string();

            ledger.push(NewChunkRecord {
                chunk_index: i64::from(chunk_index),
                chunk_hash: chunk.hash.clone(),
                section: chunk.section.clone(),
                token_count: i64::from(token_count),
                content_length: i64::try_from(chunk.content.chars().count()).unwrap_or(i64::MAX),
                vector_id: vector_id.clone(),
            });

            records.push(EmbeddingRecord {
                id: vector_id,
                vector,
                metadata: ChunkMetadata {
                    file_path: file.file_path.clone(),
                    chunk_index,
                    file_hash: file.file_hash.clone(),
                    chunk_hash: chunk.hash,
                    file_type: file.file_type,
                    language: file.language.clone(),
                    section: chunk.section,
                    content: chunk.content,
                    token_count,
                    // filled in once the manifest row reports its first-indexed time
                    created_at: String::new(),
                    updated_at: updated_at.clone(),
                },
            });
        }

        let manifest = NewIndexedFile {
            file_path: file.file_path.clone(),
            file_hash: file.file_hash.clone(),
            file_type: file.file_type,
            language: file.language.clone(),
            chunk_count: i64::try_from(records.len()).unwrap_or(i64::MAX),
        };

        let mut tx = self.database.begin().await.map_err(IndexError::database)?;

        let created_at = FileQueries::upsert(&mut tx, &manifest, now_naive)
            .await
            .map_err(IndexError::database)?
            .and_utc()
            .to_rfc3339();
        ChunkQueries::replace_for_file(&mut tx, &file.file_path, &ledger, now_naive)
            .await
            .map_err(IndexError::database)?;

        for record in &mut records {
            record.metadata.created_at.clone_from(&created_at);
        }

        let written = match self.vector_store.replace_file(&file.file_path, records).await {
            Ok(written) => written,
            Err(e) => {
                warn!(
                    "Vector write for {} failed, rolling back manifest: {}",
                    file.file_path, e
                );
                if let Err(rollback_err) = tx.rollback().await {
                    error!(
                        "Failed to roll back manifest for {}: {}",
                        file.file_path, rollback_err
                    );
                }
                return Err(e);
            }
        };

        tx.commit().await.map_err(|e| {
            error!(
                "Vectors for {} were replaced but the manifest commit failed: {}",
                file.file_path, e
            );
            IndexError::Database(format!("Failed to commit manifest: {}", e))
        })?;

        debug!("Wrote {} chunks for {}", written, file.file_path);
        Ok(written)
    }

    /// Remove a file from both stores. Returns whether it had a manifest row.
    #[inline]
    pub async fn remove_file(&mut self, file_path: &str) -> Result<bool> {
        let mut tx = self.database.begin().await.map_err(IndexError::database)?;
        let removed = FileQueries::delete(&mut tx, file_path)
            .await
            .map_err(IndexError::database)?;

        if let Err(e) = self.vector_store.delete_file(file_path).await {
            if let Err(rollback_err) = tx.rollback().await {
                error!(
                    "Failed to roll back removal of {}: {}",
                    file_path, rollback_err
                );
            }
            return Err(e);
        }

        tx.commit()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to commit removal: {}", e)))?;

        debug!("Removed {} from the index", file_path);
        Ok(removed)
    }
}
