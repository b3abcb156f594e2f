use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::config::validation::MAX_TOP_K;
use crate::core::errors::ApiError;
use crate::rag::ingest_directory;
use crate::state::AppState;

const PREVIEW_CHARS: usize = 500;
const DEFAULT_HISTORY_LIMIT: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub query_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}

pub async fn index_documents(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let report = ingest_directory(
        &state.paths.documents_dir,
        &state.extractor,
        &state.chunker,
        &state.index,
    )
    .await?;

    Ok(Json(json!({
        "message": "Documents indexed successfully",
        "files_found": report.files_found,
        "files_processed": report.files_processed,
        "files_failed": report.files_failed,
        "failures": report.failures,
        "pages_extracted": report.pages_extracted,
        "chunks_created": report.chunks_created,
        "stats": report.stats,
    })))
}

/// Stores an uploaded PDF in the documents directory. The file is only
/// kept if it parses as a PDF.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if !file_name.to_ascii_lowercase().ends_with(".pdf") {
            return Err(ApiError::BadRequest("Only PDF files are allowed".to_string()));
        }
        let safe_name = sanitize_file_name(&file_name)
            .ok_or_else(|| ApiError::BadRequest("Invalid file name".to_string()))?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;

        // Staged under a non-PDF name until it parses.
        let staging: PathBuf = state
            .paths
            .documents_dir
            .join(format!(".{}.part", uuid::Uuid::new_v4()));
        tokio::fs::write(&staging, &bytes)
            .await
            .map_err(ApiError::internal)?;

        let extractor = state.extractor.clone();
        let check_path = staging.clone();
        let metadata = tokio::task::spawn_blocking(move || extractor.metadata(&check_path))
            .await
            .map_err(ApiError::internal)?;

        let mut metadata = match metadata {
            Ok(metadata) => metadata,
            Err(err) => {
                if let Err(e) = tokio::fs::remove_file(&staging).await {
                    tracing::warn!("Failed to remove rejected upload {}: {}", safe_name, e);
                }
                return Err(err.into());
            }
        };

        tokio::fs::rename(&staging, state.paths.documents_dir.join(&safe_name))
            .await
            .map_err(ApiError::internal)?;
        metadata.file_name = safe_name.clone();

        tracing::info!(
            "Uploaded {} ({} pages, {:.1} KB)",
            safe_name,
            metadata.total_pages,
            metadata.file_size_kb
        );
        return Ok(Json(json!({
            "message": format!("File {} uploaded successfully", safe_name),
            "metadata": metadata,
        })));
    }

    Err(ApiError::BadRequest("No file in upload".to_string()))
}

pub async fn query_rag(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest("Question must not be empty".to_string()));
    }
    let top_k = request.top_k.unwrap_or(state.settings.retrieval.top_k);
    if top_k == 0 || top_k > MAX_TOP_K {
        return Err(ApiError::BadRequest(format!(
            "top_k must be between 1 and {}",
            MAX_TOP_K
        )));
    }

    let result = state.generator.generate(question, top_k).await?;

    let query_id = match state
        .history
        .record(question, &result.answer, &result.sources)
        .await
    {
        Ok(id) => Some(id),
        Err(err) => {
            tracing::warn!("Failed to record query: {}", err);
            None
        }
    };

    Ok(Json(QueryResponse {
        answer: result.answer,
        sources: result.sources,
        query_id,
    }))
}

pub async fn query_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 100);
    let records = state.history.recent(limit).await?;
    Ok(Json(records))
}

pub async fn index_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.index.info().await)
}

/// Extraction check over the documents directory.
pub async fn preview_extraction(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.extractor.load_all(&state.paths.documents_dir).await?;
    let Some(first) = report.pages.first() else {
        return Err(ApiError::NotFound("No PDF documents found".to_string()));
    };

    Ok(Json(json!({
        "status": "success",
        "files_found": report.files_found,
        "total_pages": report.pages.len(),
        "source": first.source,
        "first_500_chars": first.text.chars().take(PREVIEW_CHARS).collect::<String>(),
    })))
}

/// Keeps only the final path component and replaces characters that are
/// unsafe in file names.
fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .to_string();

    if cleaned.len() <= ".pdf".len() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_lose_directories_and_unsafe_characters() {
        assert_eq!(
            sanitize_file_name("../../etc/manual.pdf").as_deref(),
            Some("manual.pdf")
        );
        assert_eq!(
            sanitize_file_name("C:\\docs\\pump?.pdf").as_deref(),
            Some("pump_.pdf")
        );
        assert_eq!(sanitize_file_name("..pdf"), None);
        assert_eq!(sanitize_file_name(".pdf"), None);
    }
}
