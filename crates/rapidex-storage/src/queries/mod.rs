// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query functions over the relay database.

pub mod delivery_log;
pub mod queue;
