// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The single delivery routine shared by the HTTP send path and the queue
//! drainer: obtain a connection, normalize, resolve, send.

use rapidex_core::{RapidexError, TenantId};
use rapidex_session::ConnectionManager;
use tracing::{debug, info};

/// Result of a delivery that reached the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The text was handed to WhatsApp for this resolved address.
    Sent { address: String },
    /// The destination is not a WhatsApp account. Nothing was sent.
    NotOnWhatsApp,
}

/// Strip everything but ASCII digits (`+55 (11) 9999-0000` -> `551199990000`).
pub fn normalize_destination(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Sends texts through tenant connections owned by a [`ConnectionManager`].
#[derive(Clone)]
pub struct Deliverer {
    manager: ConnectionManager,
}

impl Deliverer {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Deliver `text` to `destination` on behalf of `tenant`.
    ///
    /// A fresh connection gets the configured connect timeout to open. Errors
    /// are transport or session failures; an unknown number is an outcome.
    pub async fn deliver(
        &self,
        tenant: &TenantId,
        destination: &str,
        text: &str,
    ) -> Result<DeliveryOutcome, RapidexError> {
        let handle = self.manager.get_or_create(tenant).await?;
        handle
            .wait_connected(self.manager.settings().connect_timeout)
            .await?;

        let number = normalize_destination(destination);
        if number.is_empty() {
            debug!(tenant = %tenant, destination, "destination has no digits");
            return Ok(DeliveryOutcome::NotOnWhatsApp);
        }

        let Some(contact) = handle.connection().resolve(&number).await? else {
            info!(tenant = %tenant, number = %number, "number is not on WhatsApp");
            return Ok(DeliveryOutcome::NotOnWhatsApp);
        };

        info!(tenant = %tenant, address = %contact.address, "sending text");
        handle
            .connection()
            .send_text(&contact.address, text)
            .await?;
        Ok(DeliveryOutcome::Sent {
            address: contact.address,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use rapidex_test_utils::TestHarness;

    fn tenant(id: &str) -> TenantId {
        TenantId::parse(id).unwrap()
    }

    #[test]
    fn normalize_keeps_only_digits() {
        assert_eq!(normalize_destination("+55 (11) 99999-0000"), "5511999990000");
        assert_eq!(normalize_destination("5511999990000"), "5511999990000");
        assert_eq!(normalize_destination("abc"), "");
        assert_eq!(normalize_destination("٣٤"), "");
    }

    #[tokio::test]
    async fn deliver_resolves_and_sends_to_resolved_address() {
        let harness = TestHarness::builder()
            .with_registered_numbers(&["5511999990000"])
            .build()
            .await
            .unwrap();
        let deliverer = Deliverer::new(harness.manager().clone());

        let outcome = deliverer
            .deliver(&tenant("1"), "+55 11 99999-0000", "Pedido saiu")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DeliveryOutcome::Sent {
                address: "5511999990000@s.whatsapp.net".into()
            }
        );

        let sent = harness.connector().sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].address, "5511999990000@s.whatsapp.net");
        assert_eq!(sent[0].text, "Pedido saiu");
        assert_eq!(
            harness.connector().resolved_numbers().await,
            vec!["5511999990000"]
        );
    }

    #[tokio::test]
    async fn unknown_number_sends_nothing() {
        let harness = TestHarness::builder().build().await.unwrap();
        let deliverer = Deliverer::new(harness.manager().clone());

        let outcome = deliverer
            .deliver(&tenant("1"), "5500000000000", "oi")
            .await
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::NotOnWhatsApp);
        assert!(harness.connector().sent_messages().await.is_empty());
    }

    #[tokio::test]
    async fn digitless_destination_skips_resolution() {
        let harness = TestHarness::builder().build().await.unwrap();
        let deliverer = Deliverer::new(harness.manager().clone());

        let outcome = deliverer.deliver(&tenant("1"), "n/a", "oi").await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::NotOnWhatsApp);
        assert!(harness.connector().resolved_numbers().await.is_empty());
    }

    #[tokio::test]
    async fn send_failure_is_an_error() {
        let harness = TestHarness::builder()
            .with_registered_numbers(&["5511"])
            .build()
            .await
            .unwrap();
        harness.connector().fail_sends_with("stream errored").await;
        let deliverer = Deliverer::new(harness.manager().clone());

        let err = deliverer
            .deliver(&tenant("1"), "5511", "oi")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "stream errored");
    }

    #[tokio::test]
    async fn unopened_connection_fails_as_not_connected() {
        let harness = TestHarness::builder()
            .without_auto_open()
            .with_connect_timeout(Duration::from_millis(100))
            .build()
            .await
            .unwrap();
        let deliverer = Deliverer::new(harness.manager().clone());

        let err = deliverer
            .deliver(&tenant("1"), "5511", "oi")
            .await
            .unwrap_err();
        assert!(matches!(err, RapidexError::NotConnected { .. }));
        assert!(harness.connector().resolved_numbers().await.is_empty());
    }
}
