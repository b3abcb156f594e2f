//! SQLite-backed vector store.
//!
//! One directory per deployment holds `index.db` and a `.lock` file. The
//! lock is held exclusively for the lifetime of the store, so a second
//! process opening the same directory fails instead of corrupting it.
//! Search is brute force over the collection's vectors.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use fs2::FileExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{CollectionSchema, IndexEntry, StoreCollectionInfo, VectorStore};
use super::types::{ChunkRecord, ScoredChunk};
use crate::core::errors::RagError;

const DB_FILE: &str = "index.db";
const LOCK_FILE: &str = ".lock";

pub struct SqliteVectorStore {
    pool: SqlitePool,
    lock: Mutex<Option<File>>,
}

impl SqliteVectorStore {
    pub async fn open(dir: &Path) -> Result<Self, RagError> {
        fs::create_dir_all(dir).map_err(RagError::storage)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILE))
            .map_err(RagError::storage)?;
        lock_file.try_lock_exclusive().map_err(|_| {
            RagError::Config(format!(
                "vector index at {} is in use by another process",
                dir.display()
            ))
        })?;

        let options = SqliteConnectOptions::new()
            .filename(dir.join(DB_FILE))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::storage)?;

        let store = Self {
            pool,
            lock: Mutex::new(Some(lock_file)),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                distance TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entries (
                collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
                id INTEGER NOT NULL,
                content TEXT NOT NULL,
                payload TEXT NOT NULL,
                embedding BLOB NOT NULL,
                PRIMARY KEY (collection, id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::storage)?;

        Ok(())
    }

    async fn schema(&self, name: &str) -> Result<CollectionSchema, RagError> {
        let row = sqlx::query("SELECT dimension, distance FROM collections WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::storage)?
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))?;

        let dimension: i64 = row.get("dimension");
        let distance: String = row.get("distance");
        Ok(CollectionSchema {
            dimension: dimension as usize,
            distance: distance.parse()?,
        })
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }
}

fn check_dimension(name: &str, schema: &CollectionSchema, len: usize) -> Result<(), RagError> {
    if len != schema.dimension {
        return Err(RagError::Config(format!(
            "collection '{}' stores {}-dimensional vectors, got {}",
            name, schema.dimension, len
        )));
    }
    Ok(())
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn create_collection(
        &self,
        name: &str,
        schema: CollectionSchema,
    ) -> Result<(), RagError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO collections (name, dimension, distance) VALUES (?1, ?2, ?3)",
        )
        .bind(name)
        .bind(schema.dimension as i64)
        .bind(schema.distance.as_str())
        .execute(&self.pool)
        .await
        .map_err(RagError::storage)?;

        if result.rows_affected() == 0 {
            return Err(RagError::Config(format!(
                "collection '{}' already exists",
                name
            )));
        }
        tracing::info!(
            "Created collection '{}' ({} dimensions, {})",
            name,
            schema.dimension,
            schema.distance
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<bool, RagError> {
        let result = sqlx::query("DELETE FROM collections WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(RagError::storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn collection_info(&self, name: &str) -> Result<Option<StoreCollectionInfo>, RagError> {
        let schema = match self.schema(name).await {
            Ok(schema) => schema,
            Err(RagError::CollectionNotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE collection = ?1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::storage)?;

        Ok(Some(StoreCollectionInfo {
            name: name.to_string(),
            schema,
            entry_count: count as usize,
        }))
    }

    async fn upsert(&self, name: &str, entries: Vec<IndexEntry>) -> Result<(), RagError> {
        let schema = self.schema(name).await?;
        for entry in &entries {
            check_dimension(name, &schema, entry.vector.len())?;
        }
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(RagError::storage)?;
        for entry in &entries {
            let payload = serde_json::to_string(&entry.chunk).map_err(RagError::storage)?;
            sqlx::query(
                "INSERT OR REPLACE INTO entries (collection, id, content, payload, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(name)
            .bind(entry.id as i64)
            .bind(&entry.chunk.text)
            .bind(&payload)
            .bind(Self::serialize_embedding(&entry.vector))
            .execute(&mut *tx)
            .await
            .map_err(RagError::storage)?;
        }
        tx.commit().await.map_err(RagError::storage)?;
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let schema = self.schema(name).await?;
        check_dimension(name, &schema, vector.len())?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT payload, embedding FROM entries WHERE collection = ?1")
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::storage)?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .filter_map(|row| {
                let payload: String = row.get("payload");
                let embedding: Vec<u8> = row.get("embedding");
                let chunk = match serde_json::from_str::<ChunkRecord>(&payload) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        tracing::warn!("Skipping unreadable entry in '{}': {}", name, err);
                        return None;
                    }
                };
                let stored = Self::deserialize_embedding(&embedding);
                Some(ScoredChunk {
                    score: schema.distance.score(vector, &stored),
                    chunk,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn max_id(&self, name: &str) -> Result<Option<u64>, RagError> {
        self.schema(name).await?;
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(id) FROM entries WHERE collection = ?1")
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .map_err(RagError::storage)?;
        Ok(max.map(|id| id as u64))
    }

    async fn close(&self) {
        self.pool.close().await;
        let lock = self.lock.lock().ok().and_then(|mut guard| guard.take());
        if let Some(file) = lock {
            if let Err(err) = FileExt::unlock(&file) {
                tracing::warn!("Failed to release index lock: {}", err);
            }
        }
    }
}
