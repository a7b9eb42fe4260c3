//! libSQL database handle — connection wrapper and schema init.

use std::path::Path;
use std::sync::Arc;

use libsql::{Connection, Database as LibSqlDatabase};
use tracing::info;

use crate::error::StoreError;

/// Shared database handle.
///
/// Stores a single connection reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use;
/// check-then-write sequences are serialized by the stores that own this.
pub struct LexiconDb {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LexiconDb {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Open(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let handle = Self {
            db: Arc::new(db),
            conn,
        };
        handle.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(handle)
    }

    /// Create an in-memory database (for tests).
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to create in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let handle = Self {
            db: Arc::new(db),
            conn,
        };
        handle.init_schema().await?;
        Ok(handle)
    }

    /// Get the connection.
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Create tables if they don't exist.
    ///
    /// All themes live in one `vocabulary` table partitioned by the `theme`
    /// column; `UNIQUE(lemma, theme)` backs the merge-or-insert write path.
    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS vocabulary (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    word TEXT NOT NULL,
                    lemma TEXT NOT NULL,
                    pos TEXT,
                    gender TEXT,
                    translation TEXT NOT NULL,
                    source_lang TEXT,
                    target_lang TEXT,
                    examples TEXT NOT NULL DEFAULT '[]',
                    source TEXT,
                    theme TEXT NOT NULL,
                    added_at TEXT NOT NULL,
                    UNIQUE(lemma, theme)
                );
                CREATE INDEX IF NOT EXISTS idx_vocabulary_theme ON vocabulary(theme);

                CREATE TABLE IF NOT EXISTS theme_registry (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    description TEXT NOT NULL,
                    source_lang TEXT NOT NULL,
                    target_lang TEXT NOT NULL,
                    deck_name TEXT NOT NULL,
                    word_count INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );",
            )
            .await
            .map_err(|e| StoreError::Query(format!("init_schema: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_creates_tables() {
        let db = LexiconDb::open_in_memory().await.unwrap();
        let mut rows = db
            .conn()
            .query(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('vocabulary', 'theme_registry')",
                (),
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let count: i64 = row.get(0).unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn open_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("vocab.db");
        let db = LexiconDb::open(&db_path).await.unwrap();
        assert!(db_path.exists());
        drop(db);
    }

    #[tokio::test]
    async fn schema_init_is_idempotent() {
        let db = LexiconDb::open_in_memory().await.unwrap();
        db.init_schema().await.unwrap();
    }
}
