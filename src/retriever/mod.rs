// Retriever module
// Embeds a query and returns the nearest indexed chunks

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::database::lancedb::{SearchResult, VectorStore};
use crate::embeddings::Embedder;
use crate::embeddings::chunking::FileType;
use crate::{IndexError, Result};

/// A chunk matching a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub file_path: String,
    pub content: String,
    pub section: Option<String>,
    /// Similarity in `0.0..=1.0`, higher is closer
    pub score: f32,
    pub chunk_index: u32,
    pub file_type: FileType,
    pub language: Option<String>,
    /// Cosine distance from the query
    pub distance: f32,
}

impl From<SearchResult> for QueryResult {
    #[inline]
    fn from(result: SearchResult) -> Self {
        let metadata = result.chunk_metadata;
        Self {
            file_path: metadata.file_path,
            content: metadata.content,
            section: metadata.section,
            score: score_from_distance(result.distance),
            chunk_index: metadata.chunk_index,
            file_type: metadata.file_type,
            language: metadata.language,
            distance: result.distance,
        }
    }
}

/// Map a cosine distance onto a similarity score
#[inline]
pub fn score_from_distance(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Query side of the index. Never writes.
pub struct Retriever {
    vector_store: VectorStore,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    #[inline]
    pub fn new(vector_store: VectorStore, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            vector_store,
            embedder,
        }
    }

    #[inline]
    pub async fn from_config(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let vector_store = VectorStore::from_config(config).await?;
        Ok(Self::new(vector_store, embedder))
    }

    /// Nearest chunks for `query`, closest first.
    ///
    /// Any failure is logged and yields an empty list; use [`Retriever::try_search`] to
    /// tell the two apart.
    #[inline]
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        file_type: Option<FileType>,
    ) -> Vec<QueryResult> {
        match self.try_search(query, top_k, file_type).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Search for '{}' failed: {}", query, e);
                Vec::new()
            }
        }
    }

    #[inline]
    pub async fn try_search(
        &self,
        query: &str,
        top_k: usize,
        file_type: Option<FileType>,
    ) -> Result<Vec<QueryResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        debug!(
            "Searching: query='{}', top_k={}, file_type={:?}",
            query, top_k, file_type
        );

        let query_vector = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                IndexError::Protocol("No embedding returned for the query".to_string())
            })?;

        let results = self
            .vector_store
            .search_similar(&query_vector, top_k, file_type)
            .await?;

        debug!("Found {} results", results.len());
        Ok(results.into_iter().map(QueryResult::from).collect())
    }
}
