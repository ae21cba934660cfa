// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Rapidex relay.

use thiserror::Error;

/// The primary error type used across all Rapidex crates.
#[derive(Debug, Error)]
pub enum RapidexError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Per-tenant credential persistence failed. Fatal for that tenant's connection attempt.
    #[error("session store error for tenant {tenant}: {message}")]
    Session {
        tenant: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Messaging-protocol errors (transport failure, rejected request, bad response).
    #[error("{message}")]
    Protocol {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A tenant id that cannot be used (empty, too long, or unsafe as a path component).
    #[error("invalid establishment id `{0}`")]
    InvalidTenant(String),

    /// The tenant's session did not reach the connected state in time.
    #[error("session {tenant} is not connected")]
    NotConnected { tenant: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RapidexError {
    /// Shorthand for a protocol error without an underlying source.
    pub fn protocol(message: impl Into<String>) -> Self {
        RapidexError::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an I/O failure on a tenant's session files.
    pub fn session_io(tenant: &str, context: &str, err: std::io::Error) -> Self {
        RapidexError::Session {
            tenant: tenant.to_string(),
            message: format!("{context}: {err}"),
            source: Some(Box::new(err)),
        }
    }
}
