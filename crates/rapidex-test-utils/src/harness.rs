// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a connection manager backed by [`MockConnector`],
//! a temporary sessions directory and an initialized SQLite queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rapidex_config::model::{RapidexConfig, StorageConfig};
use rapidex_core::{ConnectionEvent, QueueStore, RapidexError, TenantId};
use rapidex_session::{ConnectionManager, ManagerSettings};
use rapidex_storage::SqliteStorage;
use tempfile::TempDir;

use crate::mock_protocol::MockConnector;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    auto_open: bool,
    initial_events: Vec<ConnectionEvent>,
    registered: Vec<String>,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    qr_grace: Duration,
    queue_enabled: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            auto_open: true,
            initial_events: Vec::new(),
            registered: Vec::new(),
            reconnect_delay: Duration::from_millis(200),
            connect_timeout: Duration::from_secs(2),
            qr_grace: Duration::from_millis(500),
            queue_enabled: true,
        }
    }

    /// Connections stay in the pairing phase until a test emits `Open`.
    pub fn without_auto_open(mut self) -> Self {
        self.auto_open = false;
        self
    }

    /// Events delivered on every new connection.
    pub fn with_initial_events(mut self, events: Vec<ConnectionEvent>) -> Self {
        self.initial_events = events;
        self
    }

    /// Numbers the mock backend reports as existing on WhatsApp.
    pub fn with_registered_numbers(mut self, numbers: &[&str]) -> Self {
        self.registered = numbers.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_qr_grace(mut self, grace: Duration) -> Self {
        self.qr_grace = grace;
        self
    }

    pub fn with_queue_disabled(mut self) -> Self {
        self.queue_enabled = false;
        self
    }

    /// Build the harness, creating the temp directory and database.
    pub async fn build(self) -> Result<TestHarness, RapidexError> {
        let temp_dir = TempDir::new().map_err(|e| RapidexError::Storage { source: e.into() })?;
        let sessions_dir = temp_dir.path().join("sessions");
        let db_path = temp_dir.path().join("test.db");

        let mut config = RapidexConfig::default();
        config.sessions.dir = sessions_dir.to_string_lossy().to_string();
        config.queue.enabled = self.queue_enabled;
        config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        };

        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;

        let mut connector = MockConnector::new().with_initial_events(self.initial_events);
        if self.auto_open {
            connector = connector.with_auto_open();
        }
        for number in &self.registered {
            connector.register_number(number).await;
        }

        let manager = ConnectionManager::new(
            Arc::new(connector.clone()),
            ManagerSettings {
                sessions_dir: sessions_dir.clone(),
                reconnect_delay: self.reconnect_delay,
                connect_timeout: self.connect_timeout,
                qr_grace: self.qr_grace,
            },
        );

        Ok(TestHarness {
            config,
            connector,
            manager,
            storage,
            sessions_dir,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete relay stack over mock adapters.
pub struct TestHarness {
    config: RapidexConfig,
    connector: MockConnector,
    manager: ConnectionManager,
    storage: Arc<SqliteStorage>,
    sessions_dir: PathBuf,
    _temp_dir: TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Configuration pointing at the harness temp directory.
    pub fn config(&self) -> &RapidexConfig {
        &self.config
    }

    pub fn connector(&self) -> &MockConnector {
        &self.connector
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn storage(&self) -> Arc<SqliteStorage> {
        Arc::clone(&self.storage)
    }

    /// The queue storage behind its trait object.
    pub fn queue(&self) -> Arc<dyn QueueStore> {
        self.storage.clone()
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Open a tenant connection and wait for it to come up.
    pub async fn connect(&self, eid: &str) -> Result<(), RapidexError> {
        let tenant = TenantId::parse(eid)?;
        let handle = self.manager.get_or_create(&tenant).await?;
        handle.wait_connected(Duration::from_secs(3)).await
    }

    /// Stop all connections and close the database.
    pub async fn shutdown(&self) -> Result<(), RapidexError> {
        self.manager.shutdown().await;
        self.storage.close().await
    }
}
