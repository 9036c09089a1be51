// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and migrations.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::path::Path;

use parley_core::ParleyError;
use tracing::info;

use crate::migrations;

/// Convert a tokio-rusqlite error into ParleyError::Storage.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> ParleyError {
    ParleyError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the SQLite database behind the catalog and the usage ledger.
///
/// Wraps a single `tokio_rusqlite::Connection`; query modules accept
/// `&Database` and go through [`Database::connection`].
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database file, apply PRAGMAs, and run migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ParleyError> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(|e| ParleyError::Storage {
                source: Box::new(e),
            })?;
        let db = Self::prepare(conn).await?;
        info!(path = %path.display(), "sqlite storage opened");
        Ok(db)
    }

    /// Open a fresh in-memory database with the full schema applied.
    ///
    /// Intended for tests and ephemeral deployments; nothing survives drop.
    pub async fn open_in_memory() -> Result<Self, ParleyError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| ParleyError::Storage {
                source: Box::new(e),
            })?;
        Self::prepare(conn).await
    }

    async fn prepare(conn: tokio_rusqlite::Connection) -> Result<Self, ParleyError> {
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL; \
                 PRAGMA synchronous=NORMAL; \
                 PRAGMA foreign_keys=ON; \
                 PRAGMA busy_timeout=5000;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        conn.call(migrations::run_migrations)
            .await
            .map_err(|e| ParleyError::Storage {
                source: Box::new(e),
            })?;
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Verify the database answers a trivial query.
    pub async fn ping(&self) -> Result<(), ParleyError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL and release the connection.
    pub async fn close(&self) -> Result<(), ParleyError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}
