// Health endpoint
// Reports server liveness plus the last known sandbox probe result

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let sandbox = match state.sandbox_health().await {
        Some(probe) => json!({ "status": probe.status, "message": probe.message }),
        None => json!({ "status": "unknown", "message": "Sandbox probe has not run yet" }),
    };

    Json(json!({ "status": "ok", "sandbox": sandbox }))
}
