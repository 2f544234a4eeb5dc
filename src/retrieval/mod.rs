// Retrieval module
// Similarity-thresholded top-k search over the vector index


use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;
use crate::embeddings::Embedder;
use crate::{ChatPdfError, Result};

/// Candidates fetched from the index per requested result, so that ties at
/// the cut-off can still be resolved by insertion order
const CANDIDATE_FACTOR: usize = 4;
const MIN_CANDIDATES: usize = 16;

/// `[retrieval]` configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum number of passages handed to the prompt
    pub top_k: usize,
    /// Minimum similarity (1 - cosine distance) for a passage to be kept
    pub similarity_threshold: f32,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 3,
            similarity_threshold: 0.5,
        }
    }
}

impl RetrievalConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::InvalidSimilarityThreshold(
                self.similarity_threshold,
            ));
        }
        Ok(())
    }

    fn candidate_limit(&self) -> usize {
        (self.top_k * CANDIDATE_FACTOR).max(MIN_CANDIDATES)
    }
}

/// A passage returned by a query, with its similarity to the question
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub content: String,
    pub similarity: f32,
    pub page: u32,
    /// Insertion order within the index
    pub chunk_index: u32,
}

/// Nearest-neighbour search over stored chunk embeddings
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `limit` nearest entries to `query`, in any order
    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<RetrievedChunk>>;

    /// Number of entries in the index
    async fn count(&self) -> Result<u64>;
}

/// Embeds a question and pulls the matching passages out of a live index
#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl Retriever {
    #[inline]
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            config,
        }
    }

    /// At most `top_k` passages with similarity >= the threshold, best
    /// first. An empty result is not an error.
    #[inline]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let embedder = Arc::clone(&self.embedder);
        let owned_query = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed_query(&owned_query))
            .await
            .map_err(|e| ChatPdfError::Embedding(format!("Query embedding task failed: {e}")))?
            .map_err(|e| ChatPdfError::Embedding(format!("Failed to embed query: {e:#}")))?;

        let candidates = self
            .index
            .nearest(&vector, self.config.candidate_limit())
            .await?;
        let found = candidates.len();

        let selected = select_matches(candidates, &self.config);
        debug!(
            "Retrieved {} of {} candidates above similarity {}",
            selected.len(),
            found,
            self.config.similarity_threshold
        );

        Ok(selected)
    }
}

/// Drop candidates below the threshold, order by descending similarity with
/// ties kept in insertion order, and keep the first `top_k`
#[inline]
pub fn select_matches(
    mut candidates: Vec<RetrievedChunk>,
    config: &RetrievalConfig,
) -> Vec<RetrievedChunk> {
    candidates.retain(|c| c.similarity >= config.similarity_threshold);
    candidates.sort_by_key(|c| c.chunk_index);
    candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    candidates.truncate(config.top_k);
    candidates
}
