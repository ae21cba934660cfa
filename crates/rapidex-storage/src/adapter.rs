// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the QueueStore trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use rapidex_config::model::StorageConfig;
use rapidex_core::{
    AdapterType, DeliveryLogEntry, DeliveryStatus, HealthStatus, PluginAdapter, QueueCounts,
    QueueMessage, QueueStore, RapidexError,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed queue store.
///
/// The database is opened on the first call to [`QueueStore::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage. Nothing is opened until `initialize`.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, RapidexError> {
        self.db.get().ok_or_else(|| RapidexError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(&self, db: &Database) -> Result<(), RapidexError> {
        if !self.config.wal_mode {
            return Ok(());
        }
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, RapidexError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> { conn.execute_batch("SELECT 1;") })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RapidexError> {
        if let Some(db) = self.db.get() {
            self.checkpoint(db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl QueueStore for SqliteStorage {
    async fn initialize(&self) -> Result<(), RapidexError> {
        let db = Database::open_with_options(&self.config.database_path, self.config.wal_mode)
            .await?;
        self.db.set(db).map_err(|_| RapidexError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), RapidexError> {
        let db = self.db()?;
        self.checkpoint(db).await
    }

    async fn enqueue(
        &self,
        eid: &str,
        to_number: &str,
        message: &str,
    ) -> Result<i64, RapidexError> {
        queries::queue::enqueue(self.db()?, eid, to_number, message).await
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<QueueMessage>, RapidexError> {
        queries::queue::fetch_pending(self.db()?, limit).await
    }

    async fn mark_sending(&self, id: i64) -> Result<bool, RapidexError> {
        queries::queue::mark_sending(self.db()?, id).await
    }

    async fn finish(
        &self,
        id: i64,
        status: DeliveryStatus,
        note: &str,
    ) -> Result<(), RapidexError> {
        queries::queue::finish(self.db()?, id, status, note).await
    }

    async fn fail_interrupted(&self, note: &str) -> Result<Vec<QueueMessage>, RapidexError> {
        queries::queue::fail_interrupted(self.db()?, note).await
    }

    async fn get_message(&self, id: i64) -> Result<Option<QueueMessage>, RapidexError> {
        queries::queue::get_message(self.db()?, id).await
    }

    async fn counts(&self) -> Result<QueueCounts, RapidexError> {
        queries::queue::counts(self.db()?).await
    }

    async fn list_log(
        &self,
        eid: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DeliveryLogEntry>, RapidexError> {
        queries::delivery_log::list(self.db()?, eid, limit).await
    }
}
