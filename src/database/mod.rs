//! Database operations and data access layer.
//!
//! This module provides a repository pattern for database operations,
//! separating database concerns from business logic. Every repository opens a
//! short-lived SQLite connection inside `spawn_blocking`, so none of them hold
//! the async runtime while SQLite works.

mod claims;
mod events;
mod snapshots;

pub use claims::SqliteClaimStore;
pub use events::{EmojiUsage, EventRepository};
pub use snapshots::{ChannelRow, EmojiRow, MemberRow, SnapshotRepository};

use crate::error::{BotError, Result};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize the database schema.
///
/// Creates the necessary tables and indices if they don't already exist.
/// Also creates the parent directory if needed.
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Errors
///
/// Returns an error if the database cannot be created or initialized.
pub async fn init_db(path: &str) -> Result<()> {
    let path = path.to_string();
    tokio::task::spawn_blocking(move || init_db_sync(&path))
        .await
        .map_err(|e| BotError::Persistence(format!("Task join error: {}", e)))??;
    Ok(())
}

fn init_db_sync(path: &str) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = open(path)?;

    // Append-only event log read by the dashboard
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            actor_id INTEGER NOT NULL,
            channel_id INTEGER,
            kind TEXT NOT NULL,
            occurred_at TEXT NOT NULL,
            payload TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind, actor_id)",
        [],
    )?;

    // One winner per channel and day; the constraint settles racing writers
    conn.execute(
        "CREATE TABLE IF NOT EXISTS daily_claims (
            channel_id INTEGER NOT NULL,
            day TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            claimed_at TEXT NOT NULL,
            UNIQUE (channel_id, day)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS members (
            id INTEGER NOT NULL PRIMARY KEY,
            user_name TEXT NOT NULL,
            display_name TEXT,
            avatar TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS emojis (
            id INTEGER NOT NULL PRIMARY KEY,
            emoji_name TEXT NOT NULL,
            guild_id INTEGER NOT NULL,
            url TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS channels (
            id INTEGER NOT NULL PRIMARY KEY,
            channel_name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| BotError::Persistence(format!("Failed to connect to database: {}", e)))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Run `f` against a fresh connection on the blocking pool.
async fn with_connection<T, F>(db_path: &str, f: F) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db_path = db_path.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = open(&db_path)?;
        f(&mut conn)
    })
    .await
    .map_err(|e| BotError::Persistence(format!("Task join error: {}", e)))?
}

/// Discord snowflakes fit in 63 bits; SQLite stores signed integers.
fn to_sql_id(id: u64) -> i64 {
    id as i64
}

fn from_sql_id(id: i64) -> u64 {
    id as u64
}

/// Handle to the SQLite database shared by all repositories.
#[derive(Debug, Clone)]
pub struct Database {
    db_path: String,
}

impl Database {
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// Create the schema if needed and return a handle.
    pub async fn open(db_path: impl Into<String>) -> Result<Self> {
        let db = Self::new(db_path);
        init_db(&db.db_path).await?;
        Ok(db)
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    pub fn events(&self) -> EventRepository {
        EventRepository::new(self.db_path.clone())
    }

    pub fn claims(&self) -> SqliteClaimStore {
        SqliteClaimStore::new(self.db_path.clone())
    }

    pub fn snapshots(&self) -> SnapshotRepository {
        SnapshotRepository::new(self.db_path.clone())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// Helper function to create a test database in a temporary directory
    pub async fn setup_test_db() -> (TempDir, Database) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let db_path_str = db_path.to_str().expect("Invalid path").to_string();

        let db = Database::open(db_path_str).await.expect("Failed to initialize database");
        (temp_dir, db)
    }
}
