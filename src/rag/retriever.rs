use std::sync::Arc;

use super::index::VectorIndex;
use super::types::{ChunkRecord, ScoredChunk};
use crate::core::config::settings::RetrievalSettings;
use crate::core::errors::RagError;

/// Result-count and score policy over the vector index.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    top_k: usize,
    min_score: Option<f32>,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, settings: &RetrievalSettings) -> Self {
        Self {
            index,
            top_k: settings.top_k.max(1),
            min_score: settings.min_score,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn min_score(&self) -> Option<f32> {
        self.min_score
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Up to `top_k` chunks, unfiltered.
    pub async fn search(&self, query: &str) -> Result<Vec<ChunkRecord>, RagError> {
        self.index.search(query, self.top_k).await
    }

    pub async fn search_with_score(&self, query: &str) -> Result<Vec<ScoredChunk>, RagError> {
        self.index.search_with_score(query, self.top_k).await
    }

    /// Up to `top_k` chunks scoring at least `min_score`, in rank order.
    /// An empty result is valid.
    pub async fn search_filtered(
        &self,
        query: &str,
        min_score: f32,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let mut results = self.search_with_score(query).await?;
        results.retain(|r| r.score >= min_score);
        Ok(results)
    }

    /// What the answer generator consumes: the configured threshold when
    /// one is set, otherwise the plain top-k.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, RagError> {
        let retriever = self.clone().with_top_k(top_k);
        match self.min_score {
            Some(min_score) => retriever.search_filtered(query, min_score).await,
            None => retriever.search_with_score(query).await,
        }
    }
}
