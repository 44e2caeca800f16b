// HTTP and WebSocket surface

pub mod chat;
pub mod health;
pub mod threads;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::get_health))
        .route(
            "/threads",
            get(threads::list_threads).post(threads::create_thread),
        )
        .route("/threads/{id}", axum::routing::delete(threads::delete_thread))
        .route("/threads/{id}/messages", get(threads::get_thread_messages))
        .route("/chat", get(chat::ws_handler))
        .layer(cors)
        .with_state(state)
}
