// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable delivery queue and audit log.

use async_trait::async_trait;

use crate::error::RapidexError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{DeliveryLogEntry, DeliveryStatus, QueueCounts, QueueMessage};

/// Storage for the outbound message queue and the append-only delivery log.
///
/// Status changes are conditional on the row's current status so that a row
/// only ever moves `pending -> sending -> {sent | failed}`.
#[async_trait]
pub trait QueueStore: PluginAdapter {
    /// Initializes the storage backend (migrations, pragmas).
    async fn initialize(&self) -> Result<(), RapidexError>;

    /// Flushes pending writes and releases the connection.
    async fn close(&self) -> Result<(), RapidexError>;

    /// Insert a `pending` row and return its id.
    async fn enqueue(&self, eid: &str, to_number: &str, message: &str)
    -> Result<i64, RapidexError>;

    /// Up to `limit` `pending` rows, oldest (lowest id) first.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<QueueMessage>, RapidexError>;

    /// Claim a row: `pending -> sending`. Returns `false` if the row was not pending.
    async fn mark_sending(&self, id: i64) -> Result<bool, RapidexError>;

    /// `sending -> sent | failed` with a result note, plus the matching
    /// delivery log entry.
    ///
    /// Both writes commit together; on error neither is visible and the row
    /// stays in `sending`.
    async fn finish(&self, id: i64, status: DeliveryStatus, note: &str)
    -> Result<(), RapidexError>;

    /// Fail every row left in `sending` (e.g. by a crashed process), appending
    /// one `failed` log entry per row in the same transaction.
    ///
    /// Returns the affected rows with their new status.
    async fn fail_interrupted(&self, note: &str) -> Result<Vec<QueueMessage>, RapidexError>;

    /// Fetch a single row by id.
    async fn get_message(&self, id: i64) -> Result<Option<QueueMessage>, RapidexError>;

    /// Row counts per status.
    async fn counts(&self) -> Result<QueueCounts, RapidexError>;

    /// Most recent log entries first, optionally filtered by establishment.
    async fn list_log(
        &self,
        eid: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DeliveryLogEntry>, RapidexError>;
}
