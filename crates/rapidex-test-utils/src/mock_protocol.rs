// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock protocol backend for deterministic testing.
//!
//! `MockConnector` records every connection attempt, lets tests push lifecycle
//! events into a tenant's latest connection, and captures outbound texts.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use rapidex_core::traits::adapter::PluginAdapter;
use rapidex_core::traits::protocol::{ProtocolConnection, ProtocolConnector, ProtocolSession};
use rapidex_core::types::{
    AdapterType, AuthState, ConnectionEvent, HealthStatus, ResolvedContact, TenantId,
};
use rapidex_core::RapidexError;

/// A text captured by a mock connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentText {
    pub tenant: TenantId,
    pub address: String,
    pub text: String,
}

#[derive(Default)]
struct MockState {
    connects: Vec<(TenantId, AuthState)>,
    senders: HashMap<TenantId, mpsc::Sender<ConnectionEvent>>,
    registered: HashSet<String>,
    resolved: Vec<String>,
    sent: Vec<SentText>,
    disconnects: Vec<TenantId>,
    send_error: Option<String>,
    resolve_error: Option<String>,
    connect_error: Option<String>,
}

/// A mock messaging-protocol connector.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
    auto_open: bool,
    initial_events: Vec<ConnectionEvent>,
}

impl MockConnector {
    /// A connector whose connections stay silent until events are emitted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every new connection immediately reports `Open`.
    pub fn with_auto_open(mut self) -> Self {
        self.auto_open = true;
        self
    }

    /// Events delivered on every new connection before `Open` (if auto-open is set).
    pub fn with_initial_events(mut self, events: Vec<ConnectionEvent>) -> Self {
        self.initial_events = events;
        self
    }

    /// Mark a digits-only number as existing on the network.
    pub async fn register_number(&self, number: &str) {
        self.state.lock().await.registered.insert(number.to_string());
    }

    /// Make every subsequent `send_text` fail with `message`.
    pub async fn fail_sends_with(&self, message: &str) {
        self.state.lock().await.send_error = Some(message.to_string());
    }

    /// Make every subsequent `resolve` fail with `message`.
    pub async fn fail_resolves_with(&self, message: &str) {
        self.state.lock().await.resolve_error = Some(message.to_string());
    }

    /// Make every subsequent `connect` fail with `message`.
    pub async fn fail_connects_with(&self, message: &str) {
        self.state.lock().await.connect_error = Some(message.to_string());
    }

    /// Push an event into the tenant's most recent connection.
    ///
    /// Returns `false` if the tenant never connected or its event loop is gone.
    pub async fn emit(&self, tenant: &TenantId, event: ConnectionEvent) -> bool {
        let sender = self.state.lock().await.senders.get(tenant).cloned();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Drop the tenant's event sender, ending its event stream.
    pub async fn end_stream(&self, tenant: &TenantId) {
        self.state.lock().await.senders.remove(tenant);
    }

    /// Number of `connect` calls for `tenant`.
    pub async fn connect_count(&self, tenant: &TenantId) -> usize {
        self.state
            .lock()
            .await
            .connects
            .iter()
            .filter(|(t, _)| t == tenant)
            .count()
    }

    /// Credentials passed to the tenant's most recent `connect`.
    pub async fn last_auth(&self, tenant: &TenantId) -> Option<AuthState> {
        self.state
            .lock()
            .await
            .connects
            .iter()
            .rev()
            .find(|(t, _)| t == tenant)
            .map(|(_, auth)| auth.clone())
    }

    /// Poll until `tenant` has been connected at least `n` times.
    pub async fn wait_for_connects(&self, tenant: &TenantId, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.connect_count(tenant).await >= n {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Numbers passed to `resolve`, in call order.
    pub async fn resolved_numbers(&self) -> Vec<String> {
        self.state.lock().await.resolved.clone()
    }

    /// Texts passed to `send_text`, in call order.
    pub async fn sent_messages(&self) -> Vec<SentText> {
        self.state.lock().await.sent.clone()
    }

    /// Tenants whose connection was explicitly disconnected.
    pub async fn disconnected(&self) -> Vec<TenantId> {
        self.state.lock().await.disconnects.clone()
    }
}

#[async_trait]
impl PluginAdapter for MockConnector {
    fn name(&self) -> &str {
        "mock-protocol"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Protocol
    }

    async fn health_check(&self) -> Result<HealthStatus, RapidexError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RapidexError> {
        Ok(())
    }
}

#[async_trait]
impl ProtocolConnector for MockConnector {
    async fn connect(
        &self,
        tenant: &TenantId,
        auth: AuthState,
    ) -> Result<ProtocolSession, RapidexError> {
        let (tx, rx) = mpsc::channel(32);
        {
            let mut state = self.state.lock().await;
            if let Some(message) = &state.connect_error {
                return Err(RapidexError::protocol(message.clone()));
            }
            state.connects.push((tenant.clone(), auth));
            state.senders.insert(tenant.clone(), tx.clone());
        }

        for event in &self.initial_events {
            let _ = tx.send(event.clone()).await;
        }
        if self.auto_open {
            let _ = tx.send(ConnectionEvent::Open).await;
        }

        Ok(ProtocolSession {
            connection: Arc::new(MockConnection {
                tenant: tenant.clone(),
                state: self.state.clone(),
            }),
            events: rx,
        })
    }
}

struct MockConnection {
    tenant: TenantId,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl ProtocolConnection for MockConnection {
    async fn resolve(&self, number: &str) -> Result<Option<ResolvedContact>, RapidexError> {
        let mut state = self.state.lock().await;
        state.resolved.push(number.to_string());
        if let Some(message) = &state.resolve_error {
            return Err(RapidexError::protocol(message.clone()));
        }
        Ok(state.registered.contains(number).then(|| ResolvedContact {
            address: format!("{number}@s.whatsapp.net"),
        }))
    }

    async fn send_text(&self, address: &str, text: &str) -> Result<(), RapidexError> {
        let mut state = self.state.lock().await;
        if let Some(message) = &state.send_error {
            return Err(RapidexError::protocol(message.clone()));
        }
        state.sent.push(SentText {
            tenant: self.tenant.clone(),
            address: address.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), RapidexError> {
        let mut state = self.state.lock().await;
        state.disconnects.push(self.tenant.clone());
        Ok(())
    }
}
