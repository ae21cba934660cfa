// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging-protocol seam.
//!
//! The relay never talks to WhatsApp directly. A [`ProtocolConnector`] opens one
//! connection per tenant and hands back the live [`ProtocolConnection`] plus the
//! receiving end of its lifecycle event stream.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::RapidexError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{AuthState, ConnectionEvent, ResolvedContact, TenantId};

/// A freshly opened connection and its event stream.
pub struct ProtocolSession {
    pub connection: Arc<dyn ProtocolConnection>,
    pub events: mpsc::Receiver<ConnectionEvent>,
}

/// Opens protocol connections for tenants.
#[async_trait]
pub trait ProtocolConnector: PluginAdapter {
    /// Start a connection for `tenant` using its persisted credentials.
    ///
    /// Must return as soon as the connection object exists; authentication and
    /// the QR/open/close lifecycle continue asynchronously on the event stream.
    async fn connect(
        &self,
        tenant: &TenantId,
        auth: AuthState,
    ) -> Result<ProtocolSession, RapidexError>;
}

/// One live tenant connection.
#[async_trait]
pub trait ProtocolConnection: Send + Sync {
    /// Check whether a digits-only phone number is registered on the network.
    async fn resolve(&self, number: &str) -> Result<Option<ResolvedContact>, RapidexError>;

    /// Send a plain-text message to a resolved address.
    async fn send_text(&self, address: &str, text: &str) -> Result<(), RapidexError>;

    /// Stop the connection without logging the device out.
    async fn disconnect(&self) -> Result<(), RapidexError>;
}
