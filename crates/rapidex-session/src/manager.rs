// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection manager: lazy per-tenant connect, lifecycle event handling,
//! and delayed reconnection.
//!
//! Each live connection owns one event-loop task. The task folds protocol
//! events through [`TenantState::on_event`] and performs the resulting
//! effects in order, so credential writes and artifact updates for a tenant
//! are never interleaved.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use rapidex_config::model::SessionsConfig;
use rapidex_core::{
    ConnectionEvent, ConnectionStatus, DisconnectReason, ProtocolConnector, RapidexError, TenantId,
};
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::publisher::StatusPublisher;
use crate::qr;
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::state::{Effect, TenantState};
use crate::store::SessionStore;

/// Timing and location settings for the connection manager.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub sessions_dir: PathBuf,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub qr_grace: Duration,
}

impl From<&SessionsConfig> for ManagerSettings {
    fn from(config: &SessionsConfig) -> Self {
        Self {
            sessions_dir: PathBuf::from(&config.dir),
            reconnect_delay: config.reconnect_delay(),
            connect_timeout: config.connect_timeout(),
            qr_grace: config.qr_grace(),
        }
    }
}

/// Owns every tenant connection in the process.
///
/// Cheap to clone; all clones share the same registry.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn ProtocolConnector>,
    store: SessionStore,
    publisher: StatusPublisher,
    registry: ConnectionRegistry,
    /// Serializes connection creation per tenant.
    gates: DashMap<TenantId, Arc<Mutex<()>>>,
    /// At most one pending reconnect per tenant, keyed by schedule id.
    reconnects: DashMap<TenantId, (u64, CancellationToken)>,
    sequence: AtomicU64,
    settings: ManagerSettings,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn ProtocolConnector>, settings: ManagerSettings) -> Self {
        let store = SessionStore::new(&settings.sessions_dir);
        let publisher = StatusPublisher::new(&settings.sessions_dir);
        Self {
            inner: Arc::new(Inner {
                connector,
                store,
                publisher,
                registry: ConnectionRegistry::new(),
                gates: DashMap::new(),
                reconnects: DashMap::new(),
                sequence: AtomicU64::new(0),
                settings,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.inner.settings
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    pub fn publisher(&self) -> &StatusPublisher {
        &self.inner.publisher
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn connector(&self) -> &Arc<dyn ProtocolConnector> {
        &self.inner.connector
    }

    /// Number of tenants with a reconnect waiting to fire.
    pub fn pending_reconnects(&self) -> usize {
        self.inner.reconnects.len()
    }

    /// Last published status for `tenant`.
    pub async fn status(&self, tenant: &TenantId) -> Result<ConnectionStatus, RapidexError> {
        self.inner.publisher.status(tenant).await
    }

    /// Return the tenant's live connection, opening one if none exists.
    ///
    /// Concurrent callers for the same tenant share a single connection
    /// attempt. The returned handle may still be waiting for authentication.
    pub async fn get_or_create(
        &self,
        tenant: &TenantId,
    ) -> Result<Arc<ConnectionHandle>, RapidexError> {
        if let Some(handle) = self.inner.registry.get(tenant) {
            return Ok(handle);
        }
        if self.inner.shutdown.is_cancelled() {
            return Err(RapidexError::Internal(
                "connection manager is shutting down".into(),
            ));
        }

        let gate = self
            .inner
            .gates
            .entry(tenant.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        if let Some(handle) = self.inner.registry.get(tenant) {
            return Ok(handle);
        }
        self.connect(tenant).await
    }

    /// Open a connection for every tenant with persisted credentials.
    ///
    /// Per-tenant failures are logged and skipped. Returns how many tenants
    /// were started.
    pub async fn restore_persisted(&self) -> Result<usize, RapidexError> {
        let tenants = self.inner.store.list_tenants().await?;
        let mut restored = 0;
        for tenant in tenants {
            match self.get_or_create(&tenant).await {
                Ok(_) => restored += 1,
                Err(e) => warn!(tenant = %tenant, error = %e, "failed to restore session"),
            }
        }
        info!(restored, "persisted sessions restored");
        Ok(restored)
    }

    /// Stop every connection and cancel pending reconnects.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.reconnects.clear();

        for handle in self.inner.registry.drain() {
            let tenant = handle.tenant();
            if let Err(e) = handle.connection().disconnect().await {
                warn!(tenant = %tenant, error = %e, "disconnect failed during shutdown");
            }
            self.publish_status(tenant, ConnectionStatus::Disconnected)
                .await;
        }
        info!("connection manager stopped");
    }

    async fn connect(&self, tenant: &TenantId) -> Result<Arc<ConnectionHandle>, RapidexError> {
        let auth = self.inner.store.load(tenant).await?;
        let generation = self.inner.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            tenant = %tenant,
            generation,
            has_creds = auth.creds.is_some(),
            "opening connection"
        );

        let session = self.inner.connector.connect(tenant, auth).await?;
        let (state_tx, state_rx) = watch::channel(TenantState::Initializing);
        let handle = Arc::new(ConnectionHandle::new(
            tenant.clone(),
            generation,
            Arc::clone(&session.connection),
            state_rx,
        ));

        if !self.inner.registry.insert(Arc::clone(&handle)) {
            // Creation is gated per tenant, so this only happens if the gate
            // map was bypassed. Keep the registered connection.
            warn!(tenant = %tenant, "connection already registered, dropping new one");
            if let Err(e) = session.connection.disconnect().await {
                warn!(tenant = %tenant, error = %e, "failed to disconnect duplicate connection");
            }
            return self
                .inner
                .registry
                .get(tenant)
                .ok_or_else(|| RapidexError::Internal("registry lost connection".into()));
        }
        self.cancel_reconnect(tenant);

        let manager = self.clone();
        let task_handle = Arc::clone(&handle);
        tokio::spawn(async move {
            manager
                .run_events(task_handle, session.events, state_tx)
                .await;
        });

        Ok(handle)
    }

    async fn run_events(
        self,
        handle: Arc<ConnectionHandle>,
        mut events: mpsc::Receiver<ConnectionEvent>,
        state_tx: watch::Sender<TenantState>,
    ) {
        let tenant = handle.tenant().clone();
        let mut state = TenantState::Initializing;

        loop {
            let event = tokio::select! {
                _ = self.inner.shutdown.cancelled() => {
                    debug!(tenant = %tenant, "event loop stopped by shutdown");
                    state_tx.send_replace(TenantState::Disconnected);
                    return;
                }
                event = events.recv() => event.unwrap_or_else(|| {
                    debug!(tenant = %tenant, "event stream ended");
                    ConnectionEvent::Close(DisconnectReason::ConnectionClosed)
                }),
            };

            let (mut next, effects) = state.on_event(event);
            for effect in effects {
                if let Err(e) = self.apply(&handle, effect).await {
                    self.abandon(&handle, &e).await;
                    next = TenantState::Disconnected;
                    break;
                }
            }

            if next != state {
                info!(tenant = %tenant, from = %state, to = %next, "connection state changed");
            }
            state = next;
            state_tx.send_replace(state);

            if state.is_closed() {
                debug!(tenant = %tenant, generation = handle.generation(), "event loop finished");
                return;
            }
        }
    }

    /// Perform one effect. Only credential persistence failures are returned;
    /// artifact failures are logged and skipped.
    async fn apply(&self, handle: &ConnectionHandle, effect: Effect) -> Result<(), RapidexError> {
        let tenant = handle.tenant();
        match effect {
            Effect::PublishQr(raw) => match qr::render_data_url(&raw) {
                Ok(url) => {
                    if let Err(e) = self.inner.publisher.write_qr(tenant, &url).await {
                        warn!(tenant = %tenant, error = %e, "failed to publish QR");
                    } else {
                        info!(tenant = %tenant, "QR challenge published");
                    }
                }
                Err(e) => warn!(tenant = %tenant, error = %e, "failed to render QR"),
            },
            Effect::PublishStatus(status) => self.publish_status(tenant, status).await,
            Effect::ClearQr => {
                if let Err(e) = self.inner.publisher.clear_qr(tenant).await {
                    warn!(tenant = %tenant, error = %e, "failed to remove QR");
                }
            }
            Effect::PersistCredentials(auth) => self.inner.store.save(tenant, &auth).await?,
            Effect::Deregister => {
                self.inner
                    .registry
                    .remove_if_generation(tenant, handle.generation());
            }
            Effect::ScheduleReconnect(reason) => self.schedule_reconnect(tenant.clone(), reason),
            Effect::CancelReconnect => self.cancel_reconnect(tenant),
            Effect::DiscardCredentials => {
                info!(tenant = %tenant, "device logged out, discarding credentials");
                if let Err(e) = self.inner.store.clear(tenant).await {
                    warn!(tenant = %tenant, error = %e, "failed to discard credentials");
                }
                if let Err(e) = self.inner.publisher.clear_qr(tenant).await {
                    warn!(tenant = %tenant, error = %e, "failed to remove QR");
                }
            }
        }
        Ok(())
    }

    /// Tear down a connection whose credentials could not be stored.
    async fn abandon(&self, handle: &ConnectionHandle, cause: &RapidexError) {
        let tenant = handle.tenant();
        error!(tenant = %tenant, error = %cause, "credential persistence failed, closing connection");
        self.inner
            .registry
            .remove_if_generation(tenant, handle.generation());
        self.publish_status(tenant, ConnectionStatus::Disconnected)
            .await;
        if let Err(e) = handle.connection().disconnect().await {
            warn!(tenant = %tenant, error = %e, "disconnect failed");
        }
    }

    async fn publish_status(&self, tenant: &TenantId, status: ConnectionStatus) {
        if let Err(e) = self.inner.publisher.write_status(tenant, status).await {
            warn!(tenant = %tenant, status = %status, error = %e, "failed to publish status");
        }
    }

    /// Arrange a single reconnect after the configured delay.
    ///
    /// Replaces any reconnect already pending for the tenant. Intentionally
    /// synchronous: it only spawns the task that will call `get_or_create`.
    fn schedule_reconnect(&self, tenant: TenantId, reason: DisconnectReason) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }

        let id = self.inner.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.inner.shutdown.child_token();
        if let Some((_, previous)) = self
            .inner
            .reconnects
            .insert(tenant.clone(), (id, token.clone()))
        {
            previous.cancel();
        }

        let delay = self.inner.settings.reconnect_delay;
        info!(
            tenant = %tenant,
            reason = %reason,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );

        let manager = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(tenant = %tenant, "pending reconnect cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            manager
                .inner
                .reconnects
                .remove_if(&tenant, |_, (pending, _)| *pending == id);

            match manager.get_or_create(&tenant).await {
                Ok(handle) => {
                    debug!(tenant = %tenant, generation = handle.generation(), "reconnect started");
                }
                Err(e @ RapidexError::Session { .. }) => {
                    error!(tenant = %tenant, error = %e, "reconnect abandoned, stored session unusable");
                }
                Err(e) => {
                    warn!(tenant = %tenant, error = %e, "reconnect failed, retrying");
                    manager.schedule_reconnect(tenant, reason);
                }
            }
        });
    }

    fn cancel_reconnect(&self, tenant: &TenantId) {
        if let Some((_, (_, token))) = self.inner.reconnects.remove(tenant) {
            debug!(tenant = %tenant, "pending reconnect cancelled");
            token.cancel();
        }
    }
}
