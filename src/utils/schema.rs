// SQLite Schema Definitions and Migrations
// Contains all table definitions and migration logic

use rusqlite::{params, Connection};

/// Current schema version
pub const CURRENT_VERSION: i32 = 1;

/// Migration struct containing version and SQL statements
struct Migration {
    version: i32,
    description: &'static str,
    up: &'static str,
}

/// All migrations in order
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema",
    up: r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now')),
            description TEXT
        );

        -- Chat threads
        CREATE TABLE IF NOT EXISTS threads (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            session_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_threads_updated ON threads(updated_at DESC);

        -- Messages, owned by their thread
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
            role TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id, created_at);
    "#,
}];

/// Read the highest applied schema version (0 when the ledger is empty/missing)
pub fn current_version(conn: &Connection) -> Result<i32, String> {
    let table_exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            [],
            |row| row.get(0),
        )
        .map_err(|e| format!("Failed to inspect schema: {}", e))?;

    if !table_exists {
        return Ok(0);
    }

    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| format!("Failed to read schema version: {}", e))
}

/// Apply all migrations newer than the recorded version
pub fn run_migrations(conn: &Connection) -> Result<(), String> {
    let applied = current_version(conn)?;

    for migration in MIGRATIONS {
        if migration.version <= applied {
            continue;
        }

        conn.execute_batch(migration.up).map_err(|e| {
            format!(
                "Migration {} ({}) failed: {}",
                migration.version, migration.description, e
            )
        })?;

        conn.execute(
            "INSERT INTO schema_version (version, description) VALUES (?1, ?2)",
            params![migration.version, migration.description],
        )
        .map_err(|e| format!("Failed to record migration {}: {}", migration.version, e))?;

        log::info!(
            "applied migration {}: {}",
            migration.version,
            migration.description
        );
    }

    Ok(())
}
