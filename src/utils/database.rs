// SQLite Database Connection Management
// Provides thread-safe database access shared by repositories

use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use super::schema;

/// Thread-safe database wrapper
/// Uses Arc<Mutex<Connection>> for concurrent access from multiple tasks
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Create a new database connection
    /// Automatically enables WAL mode and runs migrations
    pub fn new(path: PathBuf) -> Result<Self, String> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create database directory: {}", e))?;
        }

        let conn = Connection::open(&path)
            .map_err(|e| format!("Failed to open database: {}", e))?;

        // Configure SQLite for optimal concurrent access
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout=5000;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            "#,
        )
        .map_err(|e| format!("Failed to configure database: {}", e))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Get database file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Get a lock on the connection for executing queries
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>, String> {
        self.conn
            .lock()
            .map_err(|e| format!("Failed to acquire database lock: {}", e))
    }

    /// Run all pending migrations
    fn run_migrations(&self) -> Result<(), String> {
        let conn = self.lock()?;
        schema::run_migrations(&conn)
    }

    /// Current schema version, for diagnostics
    pub fn schema_version(&self) -> Result<i32, String> {
        let conn = self.lock()?;
        schema::current_version(&conn)
    }

    /// Execute a function with the database connection
    /// The closure should return Result<T, String> with errors already converted
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, String>
    where
        F: FnOnce(&Connection) -> Result<T, String>,
    {
        let conn = self.lock()?;
        f(&conn)
    }
}
