// Embeddings module
// Content chunking and the embedding service boundary

pub mod chunking;
pub mod ollama;

use async_trait::async_trait;

use crate::Result;

pub use chunking::{Chunk, ChunkingConfig, FileType, chunk_file, estimate_token_count};
pub use ollama::OllamaClient;

/// Converts text into fixed-dimension vectors.
///
/// `embed` returns exactly one vector per input text, in input order. Failures are reported as
/// [`crate::IndexError::Transport`] when the service cannot be reached or rejects the request, and as
/// [`crate::IndexError::Protocol`] when its answer is not a usable vector. Implementations never
/// substitute placeholder vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Lightweight reachability check. Never fails; errors and timeouts are `false`.
    async fn health(&self) -> bool;
}
