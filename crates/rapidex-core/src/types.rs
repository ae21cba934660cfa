// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the session layer, the queue and the HTTP surface.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::RapidexError;

/// Maximum accepted length of an establishment id.
const MAX_TENANT_ID_LEN: usize = 64;

/// Establishment (tenant) identifier, the `eid` of the HTTP API.
///
/// Tenant ids name directories and files under the sessions directory, so
/// only `[A-Za-z0-9_-]` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Validate and wrap a raw establishment id.
    pub fn parse(raw: &str) -> Result<Self, RapidexError> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= MAX_TENANT_ID_LEN
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(RapidexError::InvalidTenant(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = RapidexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TenantId::parse(&value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

/// Externally visible connection status of a tenant, as written to the status artifact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Unknown,
}

/// Lifecycle status of a queue row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

/// Outcome recorded in the delivery log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// A persisted outbound message waiting in (or drained from) the delivery queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: i64,
    /// Raw establishment id as stored; validated by the drainer before use.
    pub eid: String,
    /// Destination as submitted (not normalized).
    pub to_number: String,
    pub message: String,
    pub status: QueueStatus,
    pub result: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A row of the append-only delivery log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub id: i64,
    pub eid: String,
    pub to_number: String,
    pub message: String,
    pub status: DeliveryStatus,
    pub response: String,
    pub created_at: String,
}

/// Row counts per queue status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub sending: u64,
    pub sent: u64,
    pub failed: u64,
}

/// Persisted protocol credentials of one tenant.
///
/// The protocol backend owns the contents: `creds` is the primary credential
/// document and `keys` holds any additional named key material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    pub creds: Option<serde_json::Value>,
    #[serde(default)]
    pub keys: BTreeMap<String, serde_json::Value>,
}

impl AuthState {
    /// True when nothing has been persisted for the tenant yet.
    pub fn is_empty(&self) -> bool {
        self.creds.is_none() && self.keys.is_empty()
    }
}

/// A destination confirmed to exist on the messaging network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedContact {
    /// Canonical network address (JID), e.g. `5511999990000@s.whatsapp.net`.
    pub address: String,
}

/// Why a protocol connection closed.
///
/// Status codes follow the WhatsApp Web disconnect codes used by the common
/// client libraries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// The device was unlinked; stored credentials are no longer valid.
    LoggedOut,
    ConnectionClosed,
    ConnectionLost,
    ConnectionReplaced,
    RestartRequired,
    BadSession,
    Unknown(u16),
}

impl DisconnectReason {
    pub fn from_status_code(code: u16) -> Self {
        match code {
            401 => DisconnectReason::LoggedOut,
            428 => DisconnectReason::ConnectionClosed,
            408 => DisconnectReason::ConnectionLost,
            440 => DisconnectReason::ConnectionReplaced,
            515 => DisconnectReason::RestartRequired,
            500 => DisconnectReason::BadSession,
            other => DisconnectReason::Unknown(other),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            DisconnectReason::LoggedOut => 401,
            DisconnectReason::ConnectionClosed => 428,
            DisconnectReason::ConnectionLost => 408,
            DisconnectReason::ConnectionReplaced => 440,
            DisconnectReason::RestartRequired => 515,
            DisconnectReason::BadSession => 500,
            DisconnectReason::Unknown(code) => *code,
        }
    }

    pub fn is_logged_out(&self) -> bool {
        matches!(self, DisconnectReason::LoggedOut)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::LoggedOut => write!(f, "logged out"),
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
            DisconnectReason::ConnectionLost => write!(f, "connection lost"),
            DisconnectReason::ConnectionReplaced => write!(f, "connection replaced"),
            DisconnectReason::RestartRequired => write!(f, "restart required"),
            DisconnectReason::BadSession => write!(f, "bad session"),
            DisconnectReason::Unknown(code) => write!(f, "unknown ({code})"),
        }
    }
}

/// Lifecycle events emitted by a protocol connection, in the order they occur.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A pairing challenge; the payload is the raw QR content to render.
    QrChallenge(String),
    /// The session is authenticated and ready to send.
    Open,
    /// The connection ended.
    Close(DisconnectReason),
    /// Credentials changed and must be persisted before they are relied upon.
    CredentialsUpdated(AuthState),
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Protocol,
    Storage,
}
