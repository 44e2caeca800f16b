// Thread CRUD endpoints

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

/// Body for POST /threads
#[derive(Debug, Deserialize, Default)]
pub struct CreateThreadRequest {
    pub title: Option<String>,
}

fn internal_error(message: String) -> (StatusCode, Json<Value>) {
    log::error!("thread route error: {}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
}

fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Thread not found" })),
    )
}

/// GET /threads — all threads, most recently updated first
pub async fn list_threads(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match state.repo.list_threads() {
        Ok(threads) => (StatusCode::OK, Json(json!({ "threads": threads }))),
        Err(e) => internal_error(e),
    }
}

/// POST /threads — create a thread, optionally titled
pub async fn create_thread(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateThreadRequest>>,
) -> (StatusCode, Json<Value>) {
    let title = body
        .and_then(|Json(req)| req.title)
        .unwrap_or_else(|| "New conversation".to_string());

    match state.repo.create_thread(&title) {
        Ok(thread) => (StatusCode::CREATED, Json(json!({ "thread": thread }))),
        Err(e) => internal_error(e),
    }
}

/// GET /threads/{id}/messages — conversation history, oldest first
pub async fn get_thread_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.repo.get_thread(&id) {
        Ok(Some(_)) => {}
        Ok(None) => return not_found(),
        Err(e) => return internal_error(e),
    }

    match state.repo.get_messages(&id) {
        Ok(messages) => (StatusCode::OK, Json(json!({ "messages": messages }))),
        Err(e) => internal_error(e),
    }
}

/// DELETE /threads/{id} — remove a thread and its messages
pub async fn delete_thread(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.repo.delete_thread(&id) {
        Ok(true) => (StatusCode::OK, Json(json!({ "success": true }))),
        Ok(false) => not_found(),
        Err(e) => internal_error(e),
    }
}
