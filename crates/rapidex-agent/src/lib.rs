// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery paths for the Rapidex relay.
//!
//! - [`delivery`]: the shared normalize/resolve/send routine used by `POST /send`
//! - [`drainer`]: the interval worker that empties the `whatsapp_queue` table
//! - [`shutdown`]: signal handling for graceful stop

pub mod delivery;
pub mod drainer;
pub mod shutdown;

pub use delivery::{Deliverer, DeliveryOutcome, normalize_destination};
pub use drainer::{DrainReport, QueueDrainer};
pub use shutdown::install_signal_handler;
