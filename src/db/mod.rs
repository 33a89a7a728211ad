//! Database layer

pub mod engine;
pub mod tables;

pub use engine::{setup_sqlite, setup_sqlite_at, DbEngine};

use thiserror::Error;

/// Repository-layer failures.
///
/// Unique-constraint violations surface as `Conflict` so callers can resolve
/// them by re-reading instead of pattern-matching on driver messages.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database not initialized")]
    NotInitialized,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Whether a sqlx error is a SQLite unique-constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.message().contains("UNIQUE constraint failed"),
        _ => false,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared one-shot database setup for repository tests.
    //!
    //! The engine is a process-global, so every test funnels through the same
    //! temp-file database; tests keep their fixtures disjoint by using unique
    //! identity hashes.

    use once_cell::sync::Lazy;
    use tempfile::TempDir;
    use tokio::sync::OnceCell;

    static TEST_DIR: Lazy<TempDir> = Lazy::new(|| TempDir::new().unwrap());
    static INIT: OnceCell<()> = OnceCell::const_new();

    pub async fn init_test_db() {
        INIT.get_or_init(|| async {
            let path = TEST_DIR.path().join("soundsink-test.db");
            super::setup_sqlite_at(&path).await.unwrap();
        })
        .await;
    }
}
