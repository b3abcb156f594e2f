use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "Welcome to the MediAssist API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let indexed = state.index.has_data().await.unwrap_or(false);
    Json(json!({
        "status": "healthy",
        "indexed": indexed,
        "generation_backend": state.generator.backend_name().unwrap_or("none"),
    }))
}
