// Thread and message data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Thread entity - one conversation with the sandboxed agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Display title (derived from the first message unless set explicitly)
    pub title: String,
    /// Agent continuation token; None until the first successful invocation
    pub session_id: Option<String>,
    /// When the thread was created
    pub created_at: DateTime<Utc>,
    /// When the thread last changed (message appended or session updated)
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// Create a new thread with the given title
    pub fn new(title: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            session_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("Unknown message role: {}", other)),
        }
    }
}

/// Message entity - immutable once created, owned by its thread
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning thread ID
    pub thread_id: String,
    /// Message author role
    pub role: MessageRole,
    /// Message text content
    pub content: String,
    /// When the message was created
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message for a thread
    pub fn new(thread_id: String, role: MessageRole, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thread_id,
            role,
            content,
            created_at: Utc::now(),
        }
    }
}
