use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Failures raised by the retrieval pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("extraction failed for {path}: {reason}")]
    Extraction { path: String, reason: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
    #[error("embedding backend error: {0}")]
    EmbeddingBackend(String),
    #[error("generation backend error: {0}")]
    GenerationBackend(String),
    #[error("no content: {0}")]
    NoContent(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl RagError {
    pub fn extraction<P: std::fmt::Display, E: std::fmt::Display>(path: P, err: E) -> Self {
        RagError::Extraction {
            path: path.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        RagError::Storage(err.to_string())
    }

    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        RagError::EmbeddingBackend(err.to_string())
    }

    pub fn generation<E: std::fmt::Display>(err: E) -> Self {
        RagError::GenerationBackend(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad gateway: {0}")]
    BadGateway(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let message = err.to_string();
        match err {
            RagError::InvalidInput(_) | RagError::Extraction { .. } => ApiError::BadRequest(message),
            RagError::NoContent(_) => ApiError::NotFound(message),
            RagError::CollectionNotFound(_) => ApiError::ServiceUnavailable(message),
            RagError::EmbeddingBackend(_) => ApiError::BadGateway(message),
            RagError::Config(_) | RagError::Storage(_) | RagError::GenerationBackend(_) => {
                ApiError::Internal(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
