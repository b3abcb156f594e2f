use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use crate::core::errors::RagError;

/// One answered question, kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogRecord {
    pub id: i64,
    pub query: String,
    pub response: String,
    pub sources: Vec<String>,
    pub created_at: String,
}

#[derive(Clone)]
pub struct QueryLogStore {
    pool: SqlitePool,
}

impl QueryLogStore {
    pub async fn new(db_path: &Path) -> Result<Self, RagError> {
        let conn_str = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&conn_str)
            .await
            .map_err(|e| RagError::Storage(format!("Failed to connect to query log db: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS queries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query TEXT NOT NULL,
                response TEXT NOT NULL,
                sources JSON,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| RagError::Storage(format!("Failed to init queries table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_queries_created_at ON queries(created_at)")
            .execute(&pool)
            .await
            .map_err(|e| RagError::Storage(format!("Failed to create index: {}", e)))?;

        Ok(Self { pool })
    }

    /// Stores one question/answer pair and returns its id.
    pub async fn record(
        &self,
        query: &str,
        response: &str,
        sources: &[String],
    ) -> Result<i64, RagError> {
        let now = chrono::Utc::now().to_rfc3339();
        let sources = serde_json::to_string(sources).map_err(RagError::storage)?;

        let result =
            sqlx::query("INSERT INTO queries (query, response, sources, created_at) VALUES (?, ?, ?, ?)")
                .bind(query)
                .bind(response)
                .bind(sources)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| RagError::Storage(format!("Failed to record query: {}", e)))?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<QueryLogRecord>, RagError> {
        let rows = sqlx::query(
            "SELECT id, query, response, sources, created_at FROM queries ORDER BY id DESC LIMIT ?",
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::storage)?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    pub async fn get(&self, id: i64) -> Result<Option<QueryLogRecord>, RagError> {
        let row = sqlx::query(
            "SELECT id, query, response, sources, created_at FROM queries WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RagError::storage)?;

        Ok(row.as_ref().map(record_from_row))
    }

    pub async fn count(&self) -> Result<i64, RagError> {
        sqlx::query("SELECT COUNT(*) FROM queries")
            .fetch_one(&self.pool)
            .await
            .map(|r| r.get(0))
            .map_err(RagError::storage)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> QueryLogRecord {
    let sources = row
        .try_get::<Option<String>, _>("sources")
        .unwrap_or(None)
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();

    QueryLogRecord {
        id: row.try_get::<i64, _>("id").unwrap_or_default(),
        query: row.try_get::<String, _>("query").unwrap_or_default(),
        response: row.try_get::<String, _>("response").unwrap_or_default(),
        sources,
        created_at: row.try_get::<String, _>("created_at").unwrap_or_default(),
    }
}
