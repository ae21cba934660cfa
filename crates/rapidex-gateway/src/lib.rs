// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface of the Rapidex relay.
//!
//! The gateway exposes QR pairing, connection status, direct sends and queue
//! submission over a small JSON API consumed by the Rapidex panel.

pub mod handlers;
pub mod server;

pub use server::{GatewayState, build_router, start_server};
