//! Database engine and connection management

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Paths;
use crate::db::RepoError;

static DB_ENGINE: OnceCell<Arc<DbEngine>> = OnceCell::new();

/// Database engine wrapper
pub struct DbEngine {
    pool: SqlitePool,
}

impl DbEngine {
    /// Get the global database engine instance
    pub fn get() -> Result<Arc<DbEngine>, RepoError> {
        DB_ENGINE
            .get()
            .map(Arc::clone)
            .ok_or(RepoError::NotInitialized)
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Setup the SQLite database at the configured path
pub async fn setup_sqlite() -> Result<()> {
    let paths = Paths::get()?;
    setup_sqlite_at(&paths.app_db_path()).await
}

/// Setup the SQLite database at an explicit path
pub async fn setup_sqlite_at(db_path: &Path) -> Result<()> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30))
        .pragma("foreign_keys", "ON");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    let engine = DbEngine { pool };

    DB_ENGINE
        .set(Arc::new(engine))
        .map_err(|_| anyhow::anyhow!("Database already initialized"))?;

    create_tables().await?;

    Ok(())
}

/// Create all database tables
async fn create_tables() -> Result<()> {
    let engine = DbEngine::get()?;
    let pool = engine.pool();

    // Tracks table. The unique index on identity_hash is the dedup
    // correctness boundary: concurrent inserts race, the loser re-reads.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identity_hash TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            artist TEXT,
            album TEXT,
            duration_ms INTEGER,
            version TEXT,
            source_url TEXT,
            source_type TEXT,
            storage_key TEXT,
            file_size_bytes INTEGER,
            extra TEXT NOT NULL DEFAULT '{}',
            mb_recording_id TEXT,
            mb_release_id TEXT,
            mb_artist_id TEXT,
            mb_verified INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_tracks_identity_hash ON tracks(identity_hash);
        CREATE INDEX IF NOT EXISTS idx_tracks_title ON tracks(title);
        CREATE INDEX IF NOT EXISTS idx_tracks_artist ON tracks(artist);
        CREATE INDEX IF NOT EXISTS idx_tracks_mb_verified ON tracks(mb_verified);
        "#,
    )
    .execute(pool)
    .await?;

    // Library entries table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS library_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            track_id INTEGER NOT NULL,
            added_at TEXT NOT NULL,
            UNIQUE(user_id, track_id),
            FOREIGN KEY (track_id) REFERENCES tracks(id)
        );
        CREATE INDEX IF NOT EXISTS idx_library_entries_user ON library_entries(user_id);
        CREATE INDEX IF NOT EXISTS idx_library_entries_track ON library_entries(track_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
