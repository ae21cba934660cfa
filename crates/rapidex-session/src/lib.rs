// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant WhatsApp session lifecycle for the Rapidex relay.
//!
//! - [`store`]: durable credential persistence, one directory per tenant.
//! - [`publisher`]: status and QR artifacts read by external pollers.
//! - [`state`]: the pure connection state machine.
//! - [`manager`]: lazy connect, event handling and reconnection.

pub mod manager;
pub mod publisher;
pub mod qr;
pub mod registry;
pub mod state;
pub mod store;

pub use manager::{ConnectionManager, ManagerSettings};
pub use publisher::StatusPublisher;
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use state::{Effect, TenantState};
pub use store::SessionStore;
