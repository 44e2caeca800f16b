// Chat WebSocket endpoint
// Upgrades the connection and wires it to a ChatSession. Outbound frames go
// through an mpsc channel drained by a dedicated send task, so a slow client
// never blocks the invocation engine.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::models::chat::ServerFrame;
use crate::services::chat::ChatSession;
use crate::state::AppState;

/// GET /chat — WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    log::info!("chat client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerFrame>();

    // Forward session frames to the socket
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        log::debug!("websocket send failed, client disconnected");
                        break;
                    }
                }
                Err(e) => log::error!("failed to serialize server frame: {}", e),
            }
        }
    });

    let session = ChatSession::new(state, outbound_tx);

    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(Message::Text(text)) => {
                // Each frame is handled on its own task so the read loop
                // keeps draining (and dropping) frames during a turn
                let session = session.clone();
                let text = text.to_string();
                tokio::spawn(async move {
                    session.handle_frame(&text).await;
                });
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                log::warn!("websocket error: {}", e);
                break;
            }
        }
    }

    log::info!("chat client disconnected");
    send_task.abort();
}
