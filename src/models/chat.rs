// WebSocket wire protocol for the chat endpoint

use serde::{Deserialize, Serialize};

/// Inbound frame from the web client
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// A user message for a thread
    #[serde(rename = "message", rename_all = "camelCase")]
    Message { thread_id: String, content: String },
}

/// Outbound frame to the web client
///
/// Per agent turn the client sees zero or more Token frames followed by
/// exactly one of Done or Error.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// Incremental text fragment
    #[serde(rename = "token")]
    Token { text: String },
    /// Turn completed; the assistant message was persisted
    #[serde(rename = "done", rename_all = "camelCase")]
    Done { message_id: String },
    /// Turn failed
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
        }
    }
}
