mod common;

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;

use mediassist_backend::llm::LlmProvider;
use mediassist_backend::rag::{ingest_directory, AnswerStatus, NOT_FOUND_ANSWER};
use mediassist_backend::server::handlers::health::health;
use mediassist_backend::server::handlers::rag::{
    index_info, query_history, query_rag, HistoryParams, QueryRequest,
};
use mediassist_backend::state::AppState;

use common::{write_centrifuge_manual, ScriptedLlm};

async fn indexed_state(data_dir: &std::path::Path, llm: Arc<ScriptedLlm>) -> Arc<AppState> {
    let state = common::state(data_dir, Some(llm as Arc<dyn LlmProvider>)).await;
    write_centrifuge_manual(&state.paths.documents_dir.join("centrifuge.pdf"));
    ingest_directory(
        &state.paths.documents_dir,
        &state.extractor,
        &state.chunker,
        &state.index,
    )
    .await
    .unwrap();
    state
}

async fn json_body(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn request(question: &str, top_k: Option<usize>) -> Json<QueryRequest> {
    Json(QueryRequest {
        question: question.to_string(),
        top_k,
    })
}

#[tokio::test]
async fn gmdn_question_cites_the_technical_data_page() {
    let data = tempfile::tempdir().unwrap();
    let llm = ScriptedLlm::answering("The GMDN code is 17489.");
    let state = indexed_state(data.path(), llm.clone()).await;

    let result = state
        .generator
        .generate("What is the GMDN code?", 5)
        .await
        .unwrap();

    assert_eq!(result.status, AnswerStatus::Generated);
    assert_eq!(result.answer, "The GMDN code is 17489.");
    assert!(result
        .retrieved_chunks
        .iter()
        .any(|c| c.chunk.text.contains("GMDN Code | 17489")));
    assert!(result.sources.contains(&"centrifuge.pdf (Page 2)".to_string()));
    assert!(result.context.contains("[Source: centrifuge.pdf - Page 2]"));
    assert_eq!(llm.calls(), 1);

    state.shutdown().await;
}

#[tokio::test]
async fn never_indexed_collection_answers_not_found() {
    let data = tempfile::tempdir().unwrap();
    let llm = ScriptedLlm::answering("unused");
    let state = common::state(data.path(), Some(llm.clone() as Arc<dyn LlmProvider>)).await;

    let response = query_rag(State(state.clone()), request("What is the GMDN code?", Some(5)))
        .await
        .into_response();
    let (status, body) = json_body(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], NOT_FOUND_ANSWER);
    assert_eq!(body["sources"], Value::Array(Vec::new()));
    assert!(body["query_id"].is_i64());
    assert_eq!(llm.calls(), 0);

    state.shutdown().await;
}

#[tokio::test]
async fn failing_backend_still_returns_context_and_sources() {
    let data = tempfile::tempdir().unwrap();
    let state = indexed_state(data.path(), ScriptedLlm::failing("model not loaded")).await;

    let response = query_rag(
        State(state.clone()),
        request("How often should the lid seal be inspected?", None),
    )
    .await
    .into_response();
    let (status, body) = json_body(response).await;

    assert_eq!(status, StatusCode::OK);
    let answer = body["answer"].as_str().unwrap();
    assert!(answer.contains("generation failed"));
    assert!(answer.contains("model not loaded"));
    assert!(answer.contains("[Source: centrifuge.pdf - Page"));
    assert!(!body["sources"].as_array().unwrap().is_empty());

    state.shutdown().await;
}

#[tokio::test]
async fn malformed_queries_are_rejected() {
    let data = tempfile::tempdir().unwrap();
    let state = common::state(data.path(), None).await;

    let empty = query_rag(State(state.clone()), request("   ", None))
        .await
        .into_response();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let too_many = query_rag(State(state.clone()), request("rotor", Some(51)))
        .await
        .into_response();
    assert_eq!(too_many.status(), StatusCode::BAD_REQUEST);

    let zero = query_rag(State(state.clone()), request("rotor", Some(0)))
        .await
        .into_response();
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);

    state.shutdown().await;
}

#[tokio::test]
async fn answered_queries_appear_in_history() {
    let data = tempfile::tempdir().unwrap();
    let state = indexed_state(data.path(), ScriptedLlm::answering("Once a year.")).await;

    for question in ["Drive belt service interval?", "Rated voltage?"] {
        let response = query_rag(State(state.clone()), request(question, Some(3)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = query_history(State(state.clone()), Query(HistoryParams { limit: Some(1) }))
        .await
        .into_response();
    let (_, body) = json_body(response).await;
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["query"], "Rated voltage?");
    assert_eq!(records[0]["response"], "Once a year.");

    state.shutdown().await;
}

#[tokio::test]
async fn info_reports_entries_and_deleted_collection() {
    let data = tempfile::tempdir().unwrap();
    let state = indexed_state(data.path(), ScriptedLlm::answering("ok")).await;

    let (_, body) = json_body(index_info(State(state.clone())).await.into_response()).await;
    assert_eq!(body["collection_name"], "mediassist_documents");
    assert_eq!(body["status"], "ready");
    assert!(body["entry_count"].as_u64().unwrap() > 0);
    assert_eq!(body["embedding_model"], "local-hashing");

    assert!(state.index.delete().await.unwrap());
    let (_, body) = json_body(index_info(State(state.clone())).await.into_response()).await;
    assert!(body["error"].as_str().unwrap().contains("collection not found"));

    let response = query_rag(State(state.clone()), request("rotor", None))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    state.shutdown().await;
}

#[tokio::test]
async fn health_names_the_generation_backend() {
    let data = tempfile::tempdir().unwrap();
    let state = indexed_state(data.path(), ScriptedLlm::answering("ok")).await;

    let (status, body) = json_body(health(State(state.clone())).await.into_response()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["indexed"], true);
    assert_eq!(body["generation_backend"], "scripted");

    state.shutdown().await;

    let bare = tempfile::tempdir().unwrap();
    let state = common::state(bare.path(), None).await;
    let (_, body) = json_body(health(State(state.clone())).await.into_response()).await;
    assert_eq!(body["indexed"], false);
    assert_eq!(body["generation_backend"], "none");
    state.shutdown().await;
}
