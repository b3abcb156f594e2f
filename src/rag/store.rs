//! VectorStore trait: the persistent similarity store behind the index.
//!
//! A store holds named collections, each bound at creation time to one
//! vector dimension and one distance metric.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{ChunkRecord, ScoredChunk};
use crate::core::errors::RagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    Cosine,
    Dot,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "cosine",
            Distance::Dot => "dot",
        }
    }

    /// Similarity of `a` and `b`; higher is closer.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        match self {
            Distance::Dot => dot,
            Distance::Cosine => {
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                let denom = norm_a * norm_b;
                if denom <= f32::EPSILON {
                    0.0
                } else {
                    dot / denom
                }
            }
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Distance {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Distance::Cosine),
            "dot" => Ok(Distance::Dot),
            other => Err(RagError::Config(format!(
                "unsupported distance metric '{}' (expected cosine or dot)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub dimension: usize,
    pub distance: Distance,
}

/// One stored vector with the chunk it was computed from.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: u64,
    pub vector: Vec<f32>,
    pub chunk: ChunkRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreCollectionInfo {
    pub name: String,
    pub schema: CollectionSchema,
    pub entry_count: usize,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates `name` with `schema`. Fails if it already exists.
    async fn create_collection(&self, name: &str, schema: CollectionSchema)
        -> Result<(), RagError>;

    /// Drops `name` and all its entries. Returns false if it did not exist.
    async fn delete_collection(&self, name: &str) -> Result<bool, RagError>;

    async fn collection_info(&self, name: &str) -> Result<Option<StoreCollectionInfo>, RagError>;

    /// Inserts or replaces entries by id. Every vector must match the
    /// collection dimension.
    async fn upsert(&self, name: &str, entries: Vec<IndexEntry>) -> Result<(), RagError>;

    /// The `limit` entries most similar to `vector`, best first.
    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, RagError>;

    /// Largest id stored in `name`, if any.
    async fn max_id(&self, name: &str) -> Result<Option<u64>, RagError>;

    /// Releases the underlying handle.
    async fn close(&self);
}
