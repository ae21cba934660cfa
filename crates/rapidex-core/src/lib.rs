// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Rapidex WhatsApp relay.
//!
//! This crate provides the trait seams (protocol backend, queue storage), the
//! error type, and the shared value types used throughout the workspace.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::RapidexError;
pub use types::{
    AdapterType, AuthState, ConnectionEvent, ConnectionStatus, DeliveryLogEntry, DeliveryStatus,
    DisconnectReason, HealthStatus, QueueCounts, QueueMessage, QueueStatus, ResolvedContact,
    TenantId,
};

pub use traits::{PluginAdapter, ProtocolConnection, ProtocolConnector, ProtocolSession, QueueStore};
