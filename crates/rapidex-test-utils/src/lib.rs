// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Rapidex integration tests.
//!
//! Provides a mock protocol backend and a harness that wires a temporary
//! sessions directory, a temporary SQLite queue and a connection manager
//! together, so tests run without a WhatsApp gateway.
//!
//! # Components
//!
//! - [`MockConnector`] - Mock protocol backend with event injection and send capture
//! - [`TestHarness`] - Temp-dir backed manager plus queue storage

pub mod harness;
pub mod mock_protocol;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_protocol::{MockConnector, SentText};
