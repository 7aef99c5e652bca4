// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and schema
//! migration.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use noema_core::NoemaError;
use tokio_rusqlite::Connection;
use tracing::debug;

/// Convert tokio_rusqlite errors into NoemaError::Storage.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error) -> NoemaError {
    NoemaError::Storage {
        source: Box::new(e),
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS thoughts (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    text TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    classification TEXT,
    analysis TEXT,
    value_impact TEXT,
    action_plan TEXT,
    priority TEXT,
    embedding BLOB,
    context_version INTEGER,
    error_kind TEXT,
    error_message TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    processed_at TEXT,
    processing_started_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_thoughts_status ON thoughts(status, processing_started_at);
CREATE INDEX IF NOT EXISTS idx_thoughts_user ON thoughts(user_id, created_at);

CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY NOT NULL,
    profile TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS cache_entries (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    outputs TEXT NOT NULL,
    hit_count INTEGER NOT NULL DEFAULT 0,
    last_hit_at TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_user_expiry ON cache_entries(user_id, expires_at);
";

/// Handle to the SQLite database backing the sink, the user-context store,
/// and the semantic cache.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply pragmas and schema.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, NoemaError> {
        let conn = Connection::open(path).await.map_err(map_tr_err)?;

        conn.call(move |conn: &mut rusqlite::Connection| -> Result<(), tokio_rusqlite::Error> {
            if wal_mode {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (tests).
    pub async fn open_in_memory() -> Result<Self, NoemaError> {
        let conn = Connection::open_in_memory().await.map_err(map_tr_err)?;
        conn.call(|conn: &mut rusqlite::Connection| -> Result<(), tokio_rusqlite::Error> {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        Ok(Self { conn })
    }

    /// The shared write connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint WAL before shutdown.
    pub async fn close(&self) -> Result<(), NoemaError> {
        self.conn
            .call(|conn: &mut rusqlite::Connection| -> Result<(), tokio_rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, tokio_rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .unwrap();

        assert!(tables.contains(&"thoughts".to_string()));
        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"cache_entries".to_string()));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("twice.db");
        let db1 = Database::open(path.to_str().unwrap(), true).await.unwrap();
        db1.close().await.unwrap();
        drop(db1);
        // Second open must not fail on existing schema.
        let db2 = Database::open(path.to_str().unwrap(), true).await.unwrap();
        db2.close().await.unwrap();
    }
}
