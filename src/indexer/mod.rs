// Indexer module
// Incremental sync of files into the index: change detection, chunking, embedding, writing

pub mod change;
pub mod consistency;
pub mod writer;


use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::embeddings::Embedder;
use crate::embeddings::chunking::{Chunk, ChunkingConfig, FileType, chunk_file};
use crate::fingerprint::hash_bytes;
use crate::{IndexError, Result};

pub use change::{ChangeDecision, detect};
pub use consistency::{ConsistencyReport, ConsistencyValidator, FileConsistencyIssue, RepairSummary};
pub use writer::{EmbeddedChunk, FileEntry, IndexWriter};

/// Progress reported while a batch is synced
#[derive(Debug, Clone, Copy)]
pub enum SyncProgress<'a> {
    /// About to process a file
    Processing {
        current: usize,
        total: usize,
        path: &'a Path,
    },
    /// Finished a file
    Processed {
        path: &'a Path,
        decision: Option<ChangeDecision>,
    },
}

/// Callback for progress updates
pub type ProgressCallback = Box<dyn Fn(SyncProgress<'_>) + Send + Sync>;

/// Per-file failure recorded during a sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncError {
    pub file_path: String,
    pub message: String,
}

/// Aggregated result of a sync batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Files whose chunks were (re)written
    pub files_processed: usize,
    /// Chunks embedded by this sync
    pub chunks_created: usize,
    /// Chunks left as they were or written with a stored vector
    pub chunks_skipped: usize,
    pub processed_files: Vec<String>,
    /// Files whose fingerprint matched the recorded one
    pub skipped_files: Vec<String>,
    pub errors: Vec<SyncError>,
}

impl SyncOutcome {
    #[inline]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

enum FileSync {
    Skipped { stored_chunks: usize },
    Indexed { created: usize, reused: usize },
}

/// Keeps the index in step with files on disk
pub struct Indexer {
    database: Database,
    vector_store: VectorStore,
    embedder: Arc<dyn Embedder>,
    chunking_config: ChunkingConfig,
    progress_callback: Option<ProgressCallback>,
}

impl Indexer {
    /// Open both stores described by `config`
    #[inline]
    pub async fn new(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let database = Database::from_config(config)
            .await
            .map_err(IndexError::database)?;
        let vector_store = VectorStore::from_config(config).await?;

        Ok(Self::with_stores(
            database,
            vector_store,
            embedder,
            config.chunking.clone(),
        ))
    }

    #[inline]
    pub fn with_stores(
        database: Database,
        vector_store: VectorStore,
        embedder: Arc<dyn Embedder>,
        chunking_config: ChunkingConfig,
    ) -> Self {
        Self {
            database,
            vector_store,
            embedder,
            chunking_config,
            progress_callback: None,
        }
    }

    #[inline]
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress_callback = Some(callback);
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    #[inline]
    pub fn vector_store(&self) -> &VectorStore {
        &self.vector_store
    }

    fn emit_progress(&self, event: SyncProgress<'_>) {
        if let Some(ref callback) = self.progress_callback {
            callback(event);
        }
    }

    /// Bring the index up to date for `paths`, one file at a time.
    ///
    /// A failing file is recorded in [`SyncOutcome::errors`] and the batch carries on.
    #[inline]
    pub async fn sync(&mut self, paths: &[PathBuf], force: bool) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        let total = paths.len();

        info!("Syncing {} files (force: {})", total, force);

        for (i, path) in paths.iter().enumerate() {
            self.emit_progress(SyncProgress::Processing {
                current: i + 1,
                total,
                path,
            });

            let key = match index_key(path) {
                Ok(key) => key,
                Err(e) => {
                    warn!("Cannot index {}: {}", path.display(), e);
                    outcome.errors.push(SyncError {
                        file_path: path.display().to_string(),
                        message: e.to_string(),
                    });
                    self.emit_progress(SyncProgress::Processed {
                        path,
                        decision: None,
                    });
                    continue;
                }
            };

            let decision = match self.sync_file(path, &key, force).await {
                Ok((decision, FileSync::Skipped { stored_chunks })) => {
                    debug!("{} is unchanged", key);
                    outcome.chunks_skipped += stored_chunks;
                    outcome.skipped_files.push(key);
                    Some(decision)
                }
                Ok((decision, FileSync::Indexed { created, reused })) => {
                    debug!(
                        "Indexed {} ({}): {} chunks embedded, {} reused",
                        key, decision, created, reused
                    );
                    outcome.files_processed += 1;
                    outcome.chunks_created += created;
                    outcome.chunks_skipped += reused;
                    outcome.processed_files.push(key);
                    Some(decision)
                }
                Err(e) => {
                    warn!("Failed to index {}: {}", key, e);
                    outcome.errors.push(SyncError {
                        file_path: key,
                        message: e.to_string(),
                    });
                    None
                }
            };

            self.emit_progress(SyncProgress::Processed { path, decision });
        }

        if outcome.files_processed > 0 {
            if let Err(e) = self.vector_store.optimize().await {
                warn!("Vector table optimization after sync failed: {}", e);
            }
        }

        info!(
            "Sync finished: {} processed, {} unchanged, {} chunks created, {} skipped, {} errors",
            outcome.files_processed,
            outcome.skipped_files.len(),
            outcome.chunks_created,
            outcome.chunks_skipped,
            outcome.errors.len()
        );

        outcome
    }

    async fn sync_file(
        &mut self,
        path: &Path,
        key: &str,
        force: bool,
    ) -> Result<(ChangeDecision, FileSync)> {
        let bytes = tokio::fs::read(path).await?;
        let file_hash = hash_bytes(&bytes);

        let stored = self
            .database
            .get_file(key)
            .await
            .map_err(IndexError::database)?;
        let decision = detect(
            stored.as_ref().map(|file| file.file_hash.as_str()),
            &file_hash,
            force,
        );

        if !decision.needs_indexing() {
            let stored_chunks = stored
                .map(|file| usize::try_from(file.chunk_count).unwrap_or(0))
                .unwrap_or(0);
            return Ok((decision, FileSync::Skipped { stored_chunks }));
        }

        let content = String::from_utf8(bytes).map_err(|_| {
            IndexError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "file is not valid UTF-8 text",
            ))
        })?;

        let (file_type, language) = FileType::detect(path);
        let chunks = self.embeddable_chunks(path, &content, file_type);

        // forcing re-embeds every chunk, even of a file whose fingerprint also changed
        let stored_vectors = if decision.reuses_stored_vectors() && !force {
            self.vector_store.vectors_for_file(key).await?
        } else {
            HashMap::new()
        };

        let to_embed: Vec<String> = chunks
            .iter()
            .filter(|chunk| !stored_vectors.contains_key(&chunk.hash))
            .map(|chunk| chunk.embedding_text().into_owned())
            .collect();

        let fresh = self.embedder.embed(&to_embed).await?;
        if fresh.len() != to_embed.len() {
            return Err(IndexError::Protocol(format!(
                "Requested {} embeddings but received {}",
                to_embed.len(),
                fresh.len()
            )));
        }

        let created = fresh.len();
        let mut fresh = fresh.into_iter();
        let mut reused = 0;
        let mut embedded = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vector = match stored_vectors.get(&chunk.hash) {
                Some(vector) => {
                    reused += 1;
                    vector.clone()
                }
                None => fresh.next().ok_or_else(|| {
                    IndexError::Protocol("Embedding response ended early".to_string())
                })?,
            };
            embedded.push(EmbeddedChunk { chunk, vector });
        }

        check_dimensions(&embedded)?;

        let entry = FileEntry {
            file_path: key.to_string(),
            file_hash,
            file_type,
            language: language.map(str::to_string),
        };
        IndexWriter::new(&self.database, &mut self.vector_store)
            .write_file(&entry, embedded)
            .await?;

        Ok((decision, FileSync::Indexed { created, reused }))
    }

    /// Chunk a file, dropping chunks too long to embed
    fn embeddable_chunks(&self, path: &Path, content: &str, file_type: FileType) -> Vec<Chunk> {
        let max_chars = self.chunking_config.max_embed_chars;

        let mut chunks: Vec<Chunk> = chunk_file(path, content, file_type, &self.chunking_config)
            .into_iter()
            .filter(|chunk| {
                let length = chunk.content.chars().count();
                if length > max_chars {
                    debug!(
                        "Skipping chunk {} of {} ({} chars exceeds {})",
                        chunk.index,
                        path.display(),
                        length,
                        max_chars
                    );
                    false
                } else {
                    true
                }
            })
            .collect();

        for (index, chunk) in chunks.iter_mut().enumerate() {
            chunk.index = index;
        }

        chunks
    }

    /// Remove index entries whose files no longer exist on disk
    #[inline]
    pub async fn prune_missing(&mut self) -> Result<Vec<String>> {
        let files = self
            .database
            .list_files()
            .await
            .map_err(IndexError::database)?;

        let mut removed = Vec::new();
        for file in files {
            if Path::new(&file.file_path).exists() {
                continue;
            }

            IndexWriter::new(&self.database, &mut self.vector_store)
                .remove_file(&file.file_path)
                .await?;
            debug!("Pruned {}", file.file_path);
            removed.push(file.file_path);
        }

        if !removed.is_empty() {
            info!("Pruned {} missing files from the index", removed.len());
        }
        Ok(removed)
    }

    /// Drop everything from both stores
    #[inline]
    pub async fn reset(&mut self) -> Result<()> {
        let forgotten = self.database.clear().await.map_err(IndexError::database)?;
        let dimension = self.vector_store.vector_dimension();
        self.vector_store.reset(dimension).await?;

        info!("Index reset, {} files forgotten", forgotten);
        Ok(())
    }

    /// Cross-check both stores, optionally repairing what drifted
    #[inline]
    pub async fn check_consistency(
        &mut self,
        repair: bool,
    ) -> Result<(ConsistencyReport, Option<RepairSummary>)> {
        let mut validator = ConsistencyValidator::new(&self.database, &mut self.vector_store);
        let report = validator.validate_consistency().await?;

        let summary = if repair && !report.is_consistent {
            Some(validator.repair(&report).await?)
        } else {
            None
        };

        Ok((report, summary))
    }

    /// Compact the vector table and vacuum the manifest
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        self.vector_store.optimize().await?;
        self.database
            .optimize()
            .await
            .map_err(IndexError::database)?;
        Ok(())
    }
}

/// Path under which a file is recorded: absolute, without touching the filesystem
fn index_key(path: &Path) -> Result<String> {
    let absolute = std::path::absolute(path)?;
    Ok(absolute.to_string_lossy().into_owned())
}

fn check_dimensions(chunks: &[EmbeddedChunk]) -> Result<()> {
    let Some(first) = chunks.first() else {
        return Ok(());
    };

    let dimension = first.vector.len();
    if dimension == 0 {
        return Err(IndexError::Protocol(
            "Embedding service returned an empty vector".to_string(),
        ));
    }

    if let Some(odd) = chunks.iter().find(|c| c.vector.len() != dimension) {
        return Err(IndexError::Protocol(format!(
            "Inconsistent embedding dimensions: chunk {} has {}, expected {}",
            odd.chunk.index,
            odd.vector.len(),
            dimension
        )));
    }

    Ok(())
}
