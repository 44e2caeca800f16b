// BoxChat - chat server for a sandboxed AI coding agent
//
// Layering:
// - routes:       HTTP/WebSocket surface (axum)
// - services:     sandbox invocation engine and chat orchestration
// - repositories: SQLite data access
// - models:       wire and storage types
// - utils:        database connection and schema migrations

pub mod config;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

// Re-export models for use in routes and services
pub use models::*;

use std::sync::Arc;

use crate::config::Config;
use crate::repositories::ThreadRepository;
use crate::state::AppState;
use crate::utils::database::Database;

/// Build and run the server until the listener fails or the process is killed.
pub async fn run() -> Result<(), String> {
    // Load environment variables from .env file before anything reads them
    let _ = dotenvy::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    log::info!(
        "starting boxchat (sandbox: {}, workspace: {})",
        config.sandbox_name,
        config.sandbox_workspace
    );

    let db = Database::new(config.database_path.clone())?;
    let repo = ThreadRepository::new(db);
    let state = Arc::new(AppState::new(config.clone(), repo));

    // Warm the health cache in the background; clients can query /health
    // immediately and see "unknown" until the first probe lands.
    let probe_state = state.clone();
    tokio::spawn(async move {
        probe_state.run_sandbox_probe().await;
    });

    let router = routes::build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", addr, e))?;

    log::info!("listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("shutdown signal received");
        })
        .await
        .map_err(|e| format!("Server error: {}", e))
}
