// Thread Repository
// Handles all database operations for chat threads and their messages

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::models::thread::{Message, MessageRole, Thread};
use crate::utils::database::Database;

/// Repository for thread and message data access
#[derive(Clone)]
pub struct ThreadRepository {
    db: Database,
}

/// Raw row data before timestamp/role parsing
struct ThreadRow {
    id: String,
    title: String,
    session_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ThreadRow {
    fn into_thread(self) -> Result<Thread, String> {
        Ok(Thread {
            id: self.id,
            title: self.title,
            session_id: self.session_id,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

struct MessageRow {
    id: String,
    thread_id: String,
    role: String,
    content: String,
    created_at: String,
}

impl MessageRow {
    fn into_message(self) -> Result<Message, String> {
        Ok(Message {
            id: self.id,
            thread_id: self.thread_id,
            role: MessageRole::parse(&self.role)?,
            content: self.content,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("Invalid timestamp '{}': {}", raw, e))
}

impl ThreadRepository {
    /// Create a new ThreadRepository
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // =========================================================================
    // Threads
    // =========================================================================

    /// Create a new thread. Returns the created thread.
    pub fn create_thread(&self, title: &str) -> Result<Thread, String> {
        let thread = Thread::new(title.to_string());

        self.db.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO threads (id, title, session_id, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    thread.id,
                    thread.title,
                    thread.session_id,
                    thread.created_at.to_rfc3339(),
                    thread.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| format!("Failed to create thread: {}", e))?;
            Ok(())
        })?;

        Ok(thread)
    }

    /// Get a single thread by ID. Returns None if not found.
    pub fn get_thread(&self, id: &str) -> Result<Option<Thread>, String> {
        self.db.with_connection(|conn| {
            let result = conn.query_row(
                r#"
                SELECT id, title, session_id, created_at, updated_at
                FROM threads
                WHERE id = ?1
                "#,
                params![id],
                |row| {
                    Ok(ThreadRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        session_id: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            );

            match result {
                Ok(row) => Ok(Some(row.into_thread()?)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(format!("Failed to get thread: {}", e)),
            }
        })
    }

    /// List all threads, ordered by most recently updated first
    pub fn list_threads(&self) -> Result<Vec<Thread>, String> {
        self.db.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT id, title, session_id, created_at, updated_at
                    FROM threads
                    ORDER BY updated_at DESC
                    "#,
                )
                .map_err(|e| format!("Failed to prepare statement: {}", e))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(ThreadRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        session_id: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                })
                .map_err(|e| format!("Failed to query threads: {}", e))?;

            let mut threads = Vec::new();
            for row in rows {
                let row = row.map_err(|e| format!("Failed to read row: {}", e))?;
                threads.push(row.into_thread()?);
            }
            Ok(threads)
        })
    }

    /// Update a thread's agent session ID, bumping updated_at
    pub fn update_session_id(&self, thread_id: &str, session_id: &str) -> Result<(), String> {
        self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE threads SET session_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![session_id, Utc::now().to_rfc3339(), thread_id],
            )
            .map_err(|e| format!("Failed to update session id: {}", e))?;
            Ok(())
        })
    }

    /// Update a thread's title, bumping updated_at
    pub fn update_title(&self, thread_id: &str, title: &str) -> Result<(), String> {
        self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE threads SET title = ?1, updated_at = ?2 WHERE id = ?3",
                params![title, Utc::now().to_rfc3339(), thread_id],
            )
            .map_err(|e| format!("Failed to update title: {}", e))?;
            Ok(())
        })
    }

    /// Delete a thread and (via FK cascade) its messages.
    /// Returns false when the thread did not exist.
    pub fn delete_thread(&self, id: &str) -> Result<bool, String> {
        self.db.with_connection(|conn| {
            let affected = conn
                .execute("DELETE FROM threads WHERE id = ?1", params![id])
                .map_err(|e| format!("Failed to delete thread: {}", e))?;
            Ok(affected > 0)
        })
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Get all messages for a thread, ordered by creation time ascending
    pub fn get_messages(&self, thread_id: &str) -> Result<Vec<Message>, String> {
        self.db.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT id, thread_id, role, content, created_at
                    FROM messages
                    WHERE thread_id = ?1
                    ORDER BY created_at ASC, rowid ASC
                    "#,
                )
                .map_err(|e| format!("Failed to prepare statement: {}", e))?;

            let rows = stmt
                .query_map(params![thread_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        thread_id: row.get(1)?,
                        role: row.get(2)?,
                        content: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })
                .map_err(|e| format!("Failed to query messages: {}", e))?;

            let mut messages = Vec::new();
            for row in rows {
                let row = row.map_err(|e| format!("Failed to read row: {}", e))?;
                messages.push(row.into_message()?);
            }
            Ok(messages)
        })
    }

    /// Add a message to a thread, bumping the thread's updated_at.
    /// Returns the created message.
    pub fn add_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, String> {
        let message = Message::new(thread_id.to_string(), role, content.to_string());

        self.db.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO messages (id, thread_id, role, content, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    message.id,
                    message.thread_id,
                    message.role.as_str(),
                    message.content,
                    message.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| format!("Failed to add message: {}", e))?;

            conn.execute(
                "UPDATE threads SET updated_at = ?1 WHERE id = ?2",
                params![message.created_at.to_rfc3339(), thread_id],
            )
            .map_err(|e| format!("Failed to bump thread: {}", e))?;

            Ok(())
        })?;

        Ok(message)
    }
}
