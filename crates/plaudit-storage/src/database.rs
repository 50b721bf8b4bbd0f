// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes in a process are serialized through tokio-rusqlite's single
//! background thread. Across processes, read-then-write operations open
//! `BEGIN IMMEDIATE` transactions so SQLite's write lock orders them.

use std::path::Path;

use plaudit_config::model::StorageConfig;
use plaudit_core::PlauditError;
use tracing::{debug, info};

use crate::migrations;

/// Milliseconds a connection waits on a locked database before failing.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Handle to the SQLite store. Cloning shares the same writer thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` in WAL mode and run migrations.
    pub async fn open(path: &str) -> Result<Self, PlauditError> {
        Self::open_with(path, true).await
    }

    /// Open using the `[storage]` configuration section.
    pub async fn open_from_config(config: &StorageConfig) -> Result<Self, PlauditError> {
        Self::open_with(&config.database_path, config.wal_mode).await
    }

    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, PlauditError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(PlauditError::storage)?;
            }
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(PlauditError::storage)?;

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            if wal_mode {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.busy_timeout(std::time::Duration::from_millis(u64::from(BUSY_TIMEOUT_MS)))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| migrations::run_migrations(conn))
            .await
            .map_err(PlauditError::storage)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying connection, for query modules and sibling crates.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Cheap liveness probe used by health checks.
    pub async fn ping(&self) -> Result<(), PlauditError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Close the connection, flushing the WAL.
    pub async fn close(self) -> Result<(), PlauditError> {
        self.conn.close().await.map_err(PlauditError::storage)?;
        info!("database closed");
        Ok(())
    }
}

/// Convert a tokio-rusqlite error into `PlauditError::Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> PlauditError {
    PlauditError::Storage {
        source: Box::new(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_runs_migrations_and_enables_pragmas() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/dir/plaudit.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();

        let (journal, fks, tables): (String, i64, i64) = db
            .connection()
            .call(|conn| -> Result<_, rusqlite::Error> {
                let journal: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?;
                let fks: i64 = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0))?;
                let tables: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                     AND name IN ('dispatches', 'audit_events', 'suppressions', 'usage_counters')",
                    [],
                    |r| r.get(0),
                )?;
                Ok((journal, fks, tables))
            })
            .await
            .unwrap();

        assert_eq!(journal.to_lowercase(), "wal");
        assert_eq!(fks, 1);
        assert_eq!(tables, 4);
        db.ping().await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopening_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plaudit.db");
        let path = path.to_str().unwrap();

        Database::open(path).await.unwrap().close().await.unwrap();
        let db = Database::open(path).await.unwrap();
        db.ping().await.unwrap();
        db.close().await.unwrap();
    }
}
