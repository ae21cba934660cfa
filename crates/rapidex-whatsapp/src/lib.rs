// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp protocol backend for the Rapidex relay.
//!
//! This crate implements [`ProtocolConnector`](rapidex_core::ProtocolConnector)
//! on top of an Evolution-API HTTP gateway, one gateway instance per tenant.

pub mod client;
pub mod connector;
pub mod types;

pub use client::EvolutionClient;
pub use connector::EvolutionConnector;
pub use types::InstanceCredentials;
