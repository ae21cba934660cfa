// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Rapidex relay.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Rapidex configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to the production deployment values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RapidexConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// HTTP listener and CORS settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-tenant session lifecycle settings.
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Background delivery queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// WhatsApp gateway settings.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name used in logs and the health endpoint.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "rapidex".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind the HTTP listener to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by the CORS policy.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "https://rapidex.app.br".to_string(),
        "https://painel.rapidex.app.br".to_string(),
    ]
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionsConfig {
    /// Directory holding per-tenant credentials and the QR/status artifacts.
    #[serde(default = "default_sessions_dir")]
    pub dir: String,

    /// Delay before reconnecting after an unexpected close.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// How long `/qr` waits for a freshly created session to publish a QR.
    #[serde(default = "default_qr_grace_secs")]
    pub qr_grace_secs: u64,

    /// How long a send waits for a freshly created session to open.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Reconnect every tenant with stored credentials at startup.
    #[serde(default = "default_true")]
    pub restore_on_startup: bool,
}

impl SessionsConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn qr_grace(&self) -> Duration {
        Duration::from_secs(self.qr_grace_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            dir: default_sessions_dir(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            qr_grace_secs: default_qr_grace_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            restore_on_startup: true,
        }
    }
}

fn default_sessions_dir() -> String {
    "sessions".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_qr_grace_secs() -> u64 {
    3
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

/// Delivery queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Run the drainer and mount `POST /queue`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between drain ticks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum rows processed per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_batch_size() -> usize {
    5
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    "rapidex.db".to_string()
}

/// WhatsApp gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    /// Base URL of the WhatsApp HTTP gateway.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Global API key sent as the `apikey` header.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Prefix prepended to the establishment id to form the gateway instance name.
    #[serde(default = "default_instance_prefix")]
    pub instance_prefix: String,

    /// Client name reported to the gateway in the `User-Agent` header.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Interval between connection-state polls.
    #[serde(default = "default_whatsapp_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-request timeout for gateway calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            instance_prefix: default_instance_prefix(),
            device_name: default_device_name(),
            poll_interval_ms: default_whatsapp_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_instance_prefix() -> String {
    "rapidex-".to_string()
}

fn default_device_name() -> String {
    "Rapidex".to_string()
}

fn default_whatsapp_poll_interval_ms() -> u64 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    30
}
