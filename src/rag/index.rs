//! The vector index: one collection, one embedder, one store handle.
//!
//! Rebuilds drop and recreate the collection under the write side of
//! `gate`, so searches and appends wait for a rebuild to finish instead of
//! seeing a missing or half-filled collection. Embeddings are always
//! computed before any lock is taken.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use super::embedding::EmbeddingService;
use super::store::{CollectionSchema, Distance, IndexEntry, VectorStore};
use super::types::{ChunkRecord, ScoredChunk};
use crate::core::errors::RagError;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IndexInfo {
    Ready {
        collection_name: String,
        entry_count: usize,
        status: String,
        persist_location: String,
        dimension: usize,
        distance: Distance,
        embedding_model: String,
    },
    Error {
        error: String,
    },
}

pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    embeddings: Arc<EmbeddingService>,
    collection: String,
    schema: CollectionSchema,
    persist_location: PathBuf,
    gate: RwLock<()>,
    rebuild_lock: Mutex<()>,
    append_lock: Mutex<()>,
}

impl VectorIndex {
    /// Binds to `collection`, creating it when absent. An existing
    /// collection with another dimension or metric is a configuration error.
    pub async fn open(
        store: Arc<dyn VectorStore>,
        embeddings: Arc<EmbeddingService>,
        collection: &str,
        distance: Distance,
        persist_location: &Path,
    ) -> Result<Self, RagError> {
        let schema = CollectionSchema {
            dimension: embeddings.dimension(),
            distance,
        };

        match store.collection_info(collection).await? {
            Some(info) if info.schema != schema => {
                return Err(RagError::Config(format!(
                    "collection '{}' was created with {} dimensions and {} distance, but the embedder produces {} dimensions with {} distance; rebuild the index or change the collection name",
                    collection,
                    info.schema.dimension,
                    info.schema.distance,
                    schema.dimension,
                    schema.distance
                )));
            }
            Some(info) => {
                tracing::info!(
                    "Using collection '{}' with {} entries",
                    collection,
                    info.entry_count
                );
            }
            None => store.create_collection(collection, schema).await?,
        }

        Ok(Self {
            store,
            embeddings,
            collection: collection.to_string(),
            schema,
            persist_location: persist_location.to_path_buf(),
            gate: RwLock::new(()),
            rebuild_lock: Mutex::new(()),
            append_lock: Mutex::new(()),
        })
    }

    /// Replaces the whole collection with `chunks`. Returns the number of
    /// entries written.
    pub async fn rebuild(&self, chunks: Vec<ChunkRecord>) -> Result<usize, RagError> {
        if chunks.is_empty() {
            return Err(RagError::InvalidInput(
                "cannot rebuild the index from zero chunks".to_string(),
            ));
        }

        let _rebuild = self.rebuild_lock.lock().await;
        let entries = self.embed_entries(chunks).await?;
        let count = entries.len();

        let _write = self.gate.write().await;
        if self.store.delete_collection(&self.collection).await? {
            tracing::info!("Dropped collection '{}'", self.collection);
        }
        self.store
            .create_collection(&self.collection, self.schema)
            .await?;
        self.store.upsert(&self.collection, entries).await?;

        tracing::info!(
            "Rebuilt collection '{}' with {} entries",
            self.collection,
            count
        );
        Ok(count)
    }

    /// Adds `chunks` after the existing entries. Their ids are renumbered
    /// to continue the collection's sequence.
    pub async fn append(&self, chunks: Vec<ChunkRecord>) -> Result<usize, RagError> {
        if chunks.is_empty() {
            tracing::info!("No chunks to append to '{}'", self.collection);
            return Ok(0);
        }

        let mut entries = self.embed_entries(chunks).await?;
        let count = entries.len();

        let _read = self.gate.read().await;
        let _append = self.append_lock.lock().await;
        let start = self.store.max_id(&self.collection).await?.unwrap_or(0);
        for (offset, entry) in entries.iter_mut().enumerate() {
            entry.id = start + offset as u64 + 1;
            entry.chunk.chunk_id = entry.id;
        }
        self.store.upsert(&self.collection, entries).await?;

        tracing::info!("Appended {} entries to '{}'", count, self.collection);
        Ok(count)
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ChunkRecord>, RagError> {
        Ok(self
            .search_with_score(query, k)
            .await?
            .into_iter()
            .map(|scored| scored.chunk)
            .collect())
    }

    /// The `k` entries nearest to `query`, best first, with their scores.
    pub async fn search_with_score(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embeddings.embed_query(query).await?;

        let _read = self.gate.read().await;
        self.store.query(&self.collection, &vector, k).await
    }

    pub async fn info(&self) -> IndexInfo {
        let _read = self.gate.read().await;
        match self.store.collection_info(&self.collection).await {
            Ok(Some(info)) => IndexInfo::Ready {
                collection_name: self.collection.clone(),
                entry_count: info.entry_count,
                status: if info.entry_count > 0 { "ready" } else { "empty" }.to_string(),
                persist_location: self.persist_location.display().to_string(),
                dimension: info.schema.dimension,
                distance: info.schema.distance,
                embedding_model: self.embeddings.model_name().to_string(),
            },
            Ok(None) => IndexInfo::Error {
                error: RagError::CollectionNotFound(self.collection.clone()).to_string(),
            },
            Err(err) => IndexInfo::Error {
                error: err.to_string(),
            },
        }
    }

    /// True when the collection exists and holds at least one entry.
    pub async fn has_data(&self) -> Result<bool, RagError> {
        let _read = self.gate.read().await;
        Ok(self
            .store
            .collection_info(&self.collection)
            .await?
            .is_some_and(|info| info.entry_count > 0))
    }

    /// Drops the collection. Later operations fail with `CollectionNotFound`
    /// until the next rebuild.
    pub async fn delete(&self) -> Result<bool, RagError> {
        let _rebuild = self.rebuild_lock.lock().await;
        let _write = self.gate.write().await;
        let existed = self.store.delete_collection(&self.collection).await?;
        if existed {
            tracing::warn!("Deleted collection '{}'", self.collection);
        }
        Ok(existed)
    }

    pub async fn close(&self) {
        let _write = self.gate.write().await;
        self.store.close().await;
    }

    async fn embed_entries(&self, chunks: Vec<ChunkRecord>) -> Result<Vec<IndexEntry>, RagError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embeddings.embed_documents(&texts).await?;

        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry {
                id: chunk.chunk_id,
                vector,
                chunk,
            })
            .collect())
    }
}
