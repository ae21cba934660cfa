// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant connections over the gateway.
//!
//! Each tenant owns one gateway instance. A poller task per connection turns
//! the gateway's connection state into lifecycle events:
//!
//! | gateway                          | event                     |
//! |----------------------------------|---------------------------|
//! | pairing, new QR code             | `QrChallenge`             |
//! | state `open`                     | `Open`                    |
//! | state `close` after open         | `Close(ConnectionClosed)` |
//! | instance not found (404)         | `Close(LoggedOut)`        |
//! | gateway unreachable              | `Close(ConnectionLost)`   |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rapidex_config::model::WhatsAppConfig;
use rapidex_core::{
    AdapterType, AuthState, ConnectionEvent, DisconnectReason, HealthStatus, PluginAdapter,
    ProtocolConnection, ProtocolConnector, ProtocolSession, RapidexError, ResolvedContact,
    TenantId,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::EvolutionClient;
use crate::types::InstanceCredentials;

/// Buffered lifecycle events per connection.
const EVENT_BUFFER: usize = 16;

/// Protocol connector backed by an Evolution-API gateway.
pub struct EvolutionConnector {
    client: EvolutionClient,
    instance_prefix: String,
    poll_interval: Duration,
}

impl EvolutionConnector {
    pub fn new(config: &WhatsAppConfig) -> Result<Self, RapidexError> {
        Ok(Self {
            client: EvolutionClient::new(config)?,
            instance_prefix: config.instance_prefix.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    /// Instance credentials from stored auth, or `None` for a tenant that
    /// has never paired.
    fn stored_credentials(
        tenant: &TenantId,
        auth: &AuthState,
    ) -> Result<Option<InstanceCredentials>, RapidexError> {
        let Some(creds) = &auth.creds else {
            return Ok(None);
        };
        serde_json::from_value(creds.clone())
            .map(Some)
            .map_err(|e| RapidexError::Session {
                tenant: tenant.to_string(),
                message: format!("stored credentials are not gateway instance credentials: {e}"),
                source: Some(Box::new(e)),
            })
    }
}

#[async_trait]
impl PluginAdapter for EvolutionConnector {
    fn name(&self) -> &str {
        "evolution"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Protocol
    }

    async fn health_check(&self) -> Result<HealthStatus, RapidexError> {
        match self.client.ping().await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Degraded(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), RapidexError> {
        Ok(())
    }
}

#[async_trait]
impl ProtocolConnector for EvolutionConnector {
    async fn connect(
        &self,
        tenant: &TenantId,
        auth: AuthState,
    ) -> Result<ProtocolSession, RapidexError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let creds = match Self::stored_credentials(tenant, &auth)? {
            Some(creds) => {
                debug!(tenant = %tenant, instance = %creds.instance, "reusing gateway instance");
                creds
            }
            None => {
                let creds = InstanceCredentials {
                    instance: format!("{}{}", self.instance_prefix, tenant),
                    token: uuid::Uuid::new_v4().to_string(),
                };
                if self
                    .client
                    .create_instance(&creds.instance, &creds.token)
                    .await?
                {
                    info!(tenant = %tenant, instance = %creds.instance, "gateway instance created");
                } else {
                    info!(tenant = %tenant, instance = %creds.instance, "gateway instance already exists");
                }

                let value = serde_json::to_value(&creds)
                    .map_err(|e| RapidexError::Internal(format!("serialize credentials: {e}")))?;
                let persisted = tx
                    .send(ConnectionEvent::CredentialsUpdated(AuthState {
                        creds: Some(value),
                        keys: Default::default(),
                    }))
                    .await;
                if persisted.is_err() {
                    warn!(
                        tenant = %tenant,
                        instance = %creds.instance,
                        "event stream closed before new credentials were handed over"
                    );
                }
                creds
            }
        };

        let cancel = CancellationToken::new();
        let poller = Poller {
            client: self.client.clone(),
            tenant: tenant.clone(),
            instance: creds.instance.clone(),
            interval: self.poll_interval,
            events: tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(poller.run());

        Ok(ProtocolSession {
            connection: Arc::new(EvolutionConnection {
                client: self.client.clone(),
                instance: creds.instance,
                cancel,
            }),
            events: rx,
        })
    }
}

/// Translates gateway connection state into lifecycle events.
struct Poller {
    client: EvolutionClient,
    tenant: TenantId,
    instance: String,
    interval: Duration,
    events: mpsc::Sender<ConnectionEvent>,
    cancel: CancellationToken,
}

impl Poller {
    async fn run(self) {
        let mut opened = false;
        let mut last_qr: Option<String> = None;

        loop {
            if self.cancel.is_cancelled() {
                debug!(tenant = %self.tenant, "poller stopped");
                return;
            }

            let event = match self.client.connection_state(&self.instance).await {
                Err(e) => {
                    warn!(tenant = %self.tenant, error = %e, "gateway unreachable");
                    Some(ConnectionEvent::Close(DisconnectReason::ConnectionLost))
                }
                Ok(None) => Some(ConnectionEvent::Close(DisconnectReason::LoggedOut)),
                Ok(Some(state)) if state == "open" => {
                    (!opened).then_some(ConnectionEvent::Open)
                }
                Ok(Some(state)) if state == "close" && opened => {
                    Some(ConnectionEvent::Close(DisconnectReason::ConnectionClosed))
                }
                Ok(Some(_)) => match self.client.qr_code(&self.instance).await {
                    Ok(Some(code)) if last_qr.as_deref() != Some(code.as_str()) => {
                        last_qr = Some(code.clone());
                        Some(ConnectionEvent::QrChallenge(code))
                    }
                    Ok(_) => None,
                    Err(e) => {
                        debug!(tenant = %self.tenant, error = %e, "QR fetch failed");
                        None
                    }
                },
            };

            if let Some(event) = event {
                let closing = matches!(event, ConnectionEvent::Close(_));
                opened |= matches!(event, ConnectionEvent::Open);
                if self.cancel.is_cancelled() || self.events.send(event).await.is_err() {
                    return;
                }
                if closing {
                    return;
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

struct EvolutionConnection {
    client: EvolutionClient,
    instance: String,
    cancel: CancellationToken,
}

#[async_trait]
impl ProtocolConnection for EvolutionConnection {
    async fn resolve(&self, number: &str) -> Result<Option<ResolvedContact>, RapidexError> {
        let checks = self.client.whatsapp_numbers(&self.instance, &[number]).await?;
        Ok(checks
            .into_iter()
            .find(|c| c.exists)
            .map(|c| ResolvedContact { address: c.jid }))
    }

    async fn send_text(&self, address: &str, text: &str) -> Result<(), RapidexError> {
        self.client.send_text(&self.instance, address, text).await
    }

    async fn disconnect(&self) -> Result<(), RapidexError> {
        self.cancel.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector(server: &MockServer) -> EvolutionConnector {
        EvolutionConnector::new(&WhatsAppConfig {
            api_url: server.uri(),
            poll_interval_ms: 20,
            ..WhatsAppConfig::default()
        })
        .unwrap()
    }

    fn tenant(id: &str) -> TenantId {
        TenantId::parse(id).unwrap()
    }

    fn stored(instance: &str) -> AuthState {
        AuthState {
            creds: Some(json!({"instance": instance, "token": "t"})),
            ..Default::default()
        }
    }

    async fn mount_state(server: &MockServer, instance: &str, state: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/instance/connectionState/{instance}")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"instance": {"state": state}})),
            )
            .mount(server)
            .await;
    }

    async fn next(session: &mut ProtocolSession) -> ConnectionEvent {
        tokio::time::timeout(Duration::from_secs(2), session.events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn new_tenant_creates_instance_and_announces_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instance/create"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        mount_state(&server, "rapidex-42", "connecting").await;
        Mock::given(method("GET"))
            .and(path("/instance/connect/rapidex-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": "2@qr"})))
            .mount(&server)
            .await;

        let mut session = connector(&server)
            .connect(&tenant("42"), AuthState::default())
            .await
            .unwrap();

        match next(&mut session).await {
            ConnectionEvent::CredentialsUpdated(auth) => {
                let creds: InstanceCredentials =
                    serde_json::from_value(auth.creds.unwrap()).unwrap();
                assert_eq!(creds.instance, "rapidex-42");
                assert!(!creds.token.is_empty());
            }
            other => panic!("expected credentials, got {other:?}"),
        }
        assert_eq!(
            next(&mut session).await,
            ConnectionEvent::QrChallenge("2@qr".into())
        );
        session.connection.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn same_qr_is_not_repeated_and_open_follows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/instance/connectionState/rapidex-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"instance": {"state": "connecting"}})),
            )
            .up_to_n_times(3)
            .mount(&server)
            .await;
        mount_state(&server, "rapidex-1", "open").await;
        Mock::given(method("GET"))
            .and(path("/instance/connect/rapidex-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": "2@same"})))
            .mount(&server)
            .await;

        let mut session = connector(&server)
            .connect(&tenant("1"), stored("rapidex-1"))
            .await
            .unwrap();

        assert_eq!(
            next(&mut session).await,
            ConnectionEvent::QrChallenge("2@same".into())
        );
        assert_eq!(next(&mut session).await, ConnectionEvent::Open);
        session.connection.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn missing_instance_is_logged_out() {
        let server = MockServer::start().await;
        let mut session = connector(&server)
            .connect(&tenant("1"), stored("rapidex-1"))
            .await
            .unwrap();
        assert_eq!(
            next(&mut session).await,
            ConnectionEvent::Close(DisconnectReason::LoggedOut)
        );
        // The stream ends after a close.
        assert!(session.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_after_open_is_a_recoverable_close() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/instance/connectionState/rapidex-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"instance": {"state": "open"}})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_state(&server, "rapidex-1", "close").await;

        let mut session = connector(&server)
            .connect(&tenant("1"), stored("rapidex-1"))
            .await
            .unwrap();
        assert_eq!(next(&mut session).await, ConnectionEvent::Open);
        assert_eq!(
            next(&mut session).await,
            ConnectionEvent::Close(DisconnectReason::ConnectionClosed)
        );
    }

    #[tokio::test]
    async fn resolve_and_send_use_tenant_instance() {
        let server = MockServer::start().await;
        mount_state(&server, "rapidex-1", "open").await;
        Mock::given(method("POST"))
            .and(path("/chat/whatsappNumbers/rapidex-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"exists": true, "jid": "5511999990000@s.whatsapp.net", "number": "5511999990000"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/message/sendText/rapidex-1"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"key": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let session = connector(&server)
            .connect(&tenant("1"), stored("rapidex-1"))
            .await
            .unwrap();
        let contact = session
            .connection
            .resolve("5511999990000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contact.address, "5511999990000@s.whatsapp.net");
        session
            .connection
            .send_text(&contact.address, "oi")
            .await
            .unwrap();
        session.connection.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_number_resolves_to_none() {
        let server = MockServer::start().await;
        mount_state(&server, "rapidex-1", "open").await;
        Mock::given(method("POST"))
            .and(path("/chat/whatsappNumbers/rapidex-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"exists": false, "jid": "0@s.whatsapp.net", "number": "0"}
            ])))
            .mount(&server)
            .await;

        let session = connector(&server)
            .connect(&tenant("1"), stored("rapidex-1"))
            .await
            .unwrap();
        assert!(session.connection.resolve("0").await.unwrap().is_none());
        session.connection.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn foreign_credentials_are_a_session_error() {
        let server = MockServer::start().await;
        let auth = AuthState {
            creds: Some(json!({"noise": true})),
            ..Default::default()
        };
        let err = connector(&server)
            .connect(&tenant("1"), auth)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RapidexError::Session { .. }));
    }
}
