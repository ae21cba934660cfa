// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant connection state machine.
//!
//! The machine is pure: it maps `(state, event)` to the next state and the
//! list of side effects the connection manager must perform, in order.
//!
//! ```text
//! Initializing --qr--> Initializing
//! Initializing --open--> Connected
//! any live --close(logged out)--> LoggedOut
//! any live --close(other)--> Disconnected
//! ```

use std::fmt;

use rapidex_core::{AuthState, ConnectionEvent, ConnectionStatus, DisconnectReason};

/// Lifecycle state of one tenant connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantState {
    /// Connecting or waiting for the QR to be scanned.
    Initializing,
    /// Authenticated and able to send.
    Connected,
    /// Closed for a recoverable reason; a reconnect is scheduled.
    Disconnected,
    /// The device was unlinked. Terminal for this connection.
    LoggedOut,
}

impl TenantState {
    /// Whether the connection has ended (no further events are processed).
    pub fn is_closed(&self) -> bool {
        matches!(self, TenantState::Disconnected | TenantState::LoggedOut)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, TenantState::Connected)
    }

    /// Apply one lifecycle event.
    pub fn on_event(self, event: ConnectionEvent) -> (TenantState, Vec<Effect>) {
        if self.is_closed() {
            return (self, Vec::new());
        }

        match event {
            ConnectionEvent::QrChallenge(qr) => (
                TenantState::Initializing,
                vec![
                    Effect::PublishQr(qr),
                    Effect::PublishStatus(ConnectionStatus::Disconnected),
                ],
            ),
            ConnectionEvent::Open => (
                TenantState::Connected,
                vec![
                    Effect::PublishStatus(ConnectionStatus::Connected),
                    Effect::ClearQr,
                ],
            ),
            ConnectionEvent::Close(reason) if reason.is_logged_out() => (
                TenantState::LoggedOut,
                vec![
                    Effect::PublishStatus(ConnectionStatus::Disconnected),
                    Effect::Deregister,
                    Effect::CancelReconnect,
                    Effect::DiscardCredentials,
                ],
            ),
            ConnectionEvent::Close(reason) => (
                TenantState::Disconnected,
                vec![
                    Effect::PublishStatus(ConnectionStatus::Disconnected),
                    Effect::Deregister,
                    Effect::ScheduleReconnect(reason),
                ],
            ),
            ConnectionEvent::CredentialsUpdated(auth) => {
                (self, vec![Effect::PersistCredentials(auth)])
            }
        }
    }
}

impl fmt::Display for TenantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantState::Initializing => write!(f, "initializing"),
            TenantState::Connected => write!(f, "connected"),
            TenantState::Disconnected => write!(f, "disconnected"),
            TenantState::LoggedOut => write!(f, "logged_out"),
        }
    }
}

/// A side effect requested by a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Render and persist the QR artifact.
    PublishQr(String),
    PublishStatus(ConnectionStatus),
    ClearQr,
    /// Durably store updated credentials before the next event is handled.
    PersistCredentials(AuthState),
    /// Remove this connection's handle from the registry.
    Deregister,
    ScheduleReconnect(DisconnectReason),
    CancelReconnect,
    /// Delete stored credentials so the next access pairs from scratch.
    DiscardCredentials,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn qr_publishes_and_stays_initializing() {
        let (next, effects) =
            TenantState::Initializing.on_event(ConnectionEvent::QrChallenge("ref".into()));
        assert_eq!(next, TenantState::Initializing);
        assert_eq!(
            effects,
            vec![
                Effect::PublishQr("ref".into()),
                Effect::PublishStatus(ConnectionStatus::Disconnected)
            ]
        );
    }

    #[test]
    fn open_connects_and_clears_qr() {
        let (next, effects) = TenantState::Initializing.on_event(ConnectionEvent::Open);
        assert_eq!(next, TenantState::Connected);
        assert!(effects.contains(&Effect::ClearQr));
        assert!(effects.contains(&Effect::PublishStatus(ConnectionStatus::Connected)));
    }

    #[test]
    fn recoverable_close_schedules_exactly_one_reconnect() {
        for state in [TenantState::Initializing, TenantState::Connected] {
            let (next, effects) = state.on_event(ConnectionEvent::Close(
                DisconnectReason::ConnectionLost,
            ));
            assert_eq!(next, TenantState::Disconnected);
            assert_eq!(
                effects
                    .iter()
                    .filter(|e| matches!(e, Effect::ScheduleReconnect(_)))
                    .count(),
                1
            );
            assert!(effects.contains(&Effect::Deregister));
            assert!(!effects.contains(&Effect::DiscardCredentials));
        }
    }

    #[test]
    fn logged_out_close_never_reconnects() {
        let (next, effects) = TenantState::Connected
            .on_event(ConnectionEvent::Close(DisconnectReason::LoggedOut));
        assert_eq!(next, TenantState::LoggedOut);
        assert!(
            !effects
                .iter()
                .any(|e| matches!(e, Effect::ScheduleReconnect(_)))
        );
        assert!(effects.contains(&Effect::CancelReconnect));
        assert!(effects.contains(&Effect::DiscardCredentials));
        assert!(effects.contains(&Effect::PublishStatus(ConnectionStatus::Disconnected)));
    }

    #[test]
    fn closed_states_ignore_further_events() {
        for state in [TenantState::Disconnected, TenantState::LoggedOut] {
            for event in [
                ConnectionEvent::Open,
                ConnectionEvent::QrChallenge("x".into()),
                ConnectionEvent::Close(DisconnectReason::ConnectionClosed),
            ] {
                let (next, effects) = state.on_event(event);
                assert_eq!(next, state);
                assert!(effects.is_empty());
            }
        }
    }

    #[test]
    fn credential_update_persists_without_state_change() {
        let auth = AuthState {
            creds: Some(json!({"token": "t"})),
            ..Default::default()
        };
        let (next, effects) = TenantState::Connected
            .on_event(ConnectionEvent::CredentialsUpdated(auth.clone()));
        assert_eq!(next, TenantState::Connected);
        assert_eq!(effects, vec![Effect::PersistCredentials(auth)]);
    }

    #[test]
    fn display_is_snake_case() {
        assert_eq!(TenantState::LoggedOut.to_string(), "logged_out");
        assert_eq!(TenantState::Initializing.to_string(), "initializing");
    }
}
