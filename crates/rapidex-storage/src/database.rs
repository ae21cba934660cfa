// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use rapidex_core::RapidexError;
use tracing::debug;

use crate::migrations;

/// Handle to the relay's SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` in WAL mode and run migrations.
    pub async fn open(path: &str) -> Result<Self, RapidexError> {
        Self::open_with_options(path, true).await
    }

    /// Open the database, choosing the journal mode.
    pub async fn open_with_options(path: &str, wal_mode: bool) -> Result<Self, RapidexError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| RapidexError::Storage {
                source: Box::new(e),
            })?;
        }

        // Schema changes run on a short-lived synchronous connection.
        let migrate_path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), RapidexError> {
            let mut conn = rusqlite::Connection::open(&migrate_path).map_err(storage_err)?;
            let journal = if wal_mode { "WAL" } else { "DELETE" };
            conn.execute_batch(&format!("PRAGMA journal_mode = {journal};"))
                .map_err(storage_err)?;
            migrations::run_migrations(&mut conn)
        })
        .await
        .map_err(|e| RapidexError::Internal(format!("migration task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(storage_err)?;

        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(
                "PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The shared tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Close the background connection thread.
    pub async fn close(self) -> Result<(), RapidexError> {
        self.conn.close().await.map_err(map_tr_err)
    }
}

fn storage_err(e: rusqlite::Error) -> RapidexError {
    RapidexError::Storage {
        source: Box::new(e),
    }
}

/// Convert a tokio-rusqlite error into `RapidexError::Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> RapidexError {
    RapidexError::Storage {
        source: Box::new(e),
    }
}
