// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live connection registry, at most one handle per tenant.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rapidex_core::{ProtocolConnection, RapidexError, TenantId};
use tokio::sync::watch;

use crate::state::TenantState;

/// A registered tenant connection.
///
/// The handle stays valid after deregistration; its state simply stops at
/// `Disconnected` or `LoggedOut`.
pub struct ConnectionHandle {
    tenant: TenantId,
    generation: u64,
    connection: Arc<dyn ProtocolConnection>,
    state_rx: watch::Receiver<TenantState>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        tenant: TenantId,
        generation: u64,
        connection: Arc<dyn ProtocolConnection>,
        state_rx: watch::Receiver<TenantState>,
    ) -> Self {
        Self {
            tenant,
            generation,
            connection,
            state_rx,
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Monotonic connection number, unique across all tenants.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> TenantState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn connection(&self) -> &Arc<dyn ProtocolConnection> {
        &self.connection
    }

    /// Wait until the connection is open.
    ///
    /// Fails with `NotConnected` if the connection closes first or `timeout`
    /// elapses.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), RapidexError> {
        let mut rx = self.state_rx.clone();
        let not_connected = || RapidexError::NotConnected {
            tenant: self.tenant.to_string(),
        };

        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|state| state.is_connected() || state.is_closed()),
        )
        .await;

        match waited {
            Ok(Ok(state)) if state.is_connected() => Ok(()),
            _ => Err(not_connected()),
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("tenant", &self.tenant)
            .field("generation", &self.generation)
            .field("state", &self.state())
            .finish()
    }
}

/// Tenant to live-connection map.
#[derive(Default)]
pub struct ConnectionRegistry {
    handles: DashMap<TenantId, Arc<ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant: &TenantId) -> Option<Arc<ConnectionHandle>> {
        self.handles.get(tenant).map(|h| Arc::clone(h.value()))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Registered tenants, sorted by id.
    pub fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self.handles.iter().map(|e| e.key().clone()).collect();
        tenants.sort();
        tenants
    }

    /// Register a handle. Returns `false` if the tenant already has one.
    pub(crate) fn insert(&self, handle: Arc<ConnectionHandle>) -> bool {
        match self.handles.entry(handle.tenant().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    /// Remove the tenant's handle only if it is still `generation`.
    ///
    /// A stale connection must never evict its replacement.
    pub(crate) fn remove_if_generation(&self, tenant: &TenantId, generation: u64) -> bool {
        self.handles
            .remove_if(tenant, |_, h| h.generation() == generation)
            .is_some()
    }

    /// Remove and return every handle.
    pub(crate) fn drain(&self) -> Vec<Arc<ConnectionHandle>> {
        let tenants: Vec<TenantId> = self.handles.iter().map(|e| e.key().clone()).collect();
        tenants
            .into_iter()
            .filter_map(|t| self.handles.remove(&t).map(|(_, h)| h))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapidex_core::ProtocolConnector;
    use rapidex_core::types::AuthState;
    use rapidex_test_utils::mock_protocol::MockConnector;

    fn tenant(id: &str) -> TenantId {
        TenantId::parse(id).unwrap()
    }

    async fn handle(
        id: &str,
        generation: u64,
    ) -> (Arc<ConnectionHandle>, watch::Sender<TenantState>) {
        let session = MockConnector::new()
            .connect(&tenant(id), AuthState::default())
            .await
            .unwrap();
        let (tx, rx) = watch::channel(TenantState::Initializing);
        (
            Arc::new(ConnectionHandle::new(
                tenant(id),
                generation,
                session.connection,
                rx,
            )),
            tx,
        )
    }

    #[tokio::test]
    async fn insert_refuses_second_handle_for_tenant() {
        let registry = ConnectionRegistry::new();
        let (a, _ta) = handle("1", 1).await;
        let (b, _tb) = handle("1", 2).await;

        assert!(registry.insert(a));
        assert!(!registry.insert(b));
        assert_eq!(registry.get(&tenant("1")).unwrap().generation(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn stale_generation_does_not_evict_replacement() {
        let registry = ConnectionRegistry::new();
        let (h, _tx) = handle("1", 7).await;
        registry.insert(h);

        assert!(!registry.remove_if_generation(&tenant("1"), 6));
        assert!(registry.get(&tenant("1")).is_some());
        assert!(registry.remove_if_generation(&tenant("1"), 7));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn drain_and_tenants() {
        let registry = ConnectionRegistry::new();
        for (i, id) in ["b", "a", "c"].iter().enumerate() {
            let (h, _tx) = handle(id, i as u64).await;
            registry.insert(h);
        }
        assert_eq!(registry.tenants(), vec![tenant("a"), tenant("b"), tenant("c")]);
        assert_eq!(registry.drain().len(), 3);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn wait_connected_resolves_on_open() {
        let (h, tx) = handle("1", 1).await;
        let waiter = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.wait_connected(Duration::from_secs(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send_replace(TenantState::Connected);
        waiter.await.unwrap().unwrap();
        assert!(h.is_connected());
    }

    #[tokio::test]
    async fn wait_connected_fails_on_close_or_timeout() {
        let (h, tx) = handle("1", 1).await;
        let err = h
            .wait_connected(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, RapidexError::NotConnected { .. }));

        tx.send_replace(TenantState::Disconnected);
        let err = h.wait_connected(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, RapidexError::NotConnected { .. }));
    }

    #[tokio::test]
    async fn wait_connected_fails_when_event_loop_is_gone() {
        let (h, tx) = handle("1", 1).await;
        drop(tx);
        assert!(h.wait_connected(Duration::from_secs(5)).await.is_err());
    }
}
