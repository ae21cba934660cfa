// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background delivery queue drainer.
//!
//! A single worker wakes on a fixed interval, claims up to `batch_size`
//! pending rows (oldest first) and delivers them one at a time. A tick always
//! runs to completion before the next one starts; ticks missed while a slow
//! batch was running are skipped.

use std::sync::Arc;
use std::time::Duration;

use rapidex_config::model::QueueConfig;
use rapidex_core::{DeliveryStatus, QueueMessage, QueueStore, RapidexError, TenantId};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::delivery::{Deliverer, DeliveryOutcome};

/// Result note for a delivered row.
pub const NOTE_SENT: &str = "OK";
/// Result note for a destination that is not on WhatsApp.
pub const NOTE_NOT_FOUND: &str = "number does not exist";
pub const NOTE_INVALID_TENANT: &str = "invalid establishment id";
/// Result note for rows a previous process left in `sending`.
pub const NOTE_INTERRUPTED: &str = "interrupted before completion";

/// Attempts at recording a row's outcome before leaving it in `sending`.
const FINISH_ATTEMPTS: u32 = 3;
const FINISH_RETRY_DELAY: Duration = Duration::from_millis(100);

/// What a single drain tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub fetched: usize,
    pub sent: usize,
    pub failed: usize,
    /// Rows another worker claimed between fetch and claim.
    pub skipped: usize,
}

/// Drains the delivery queue through a [`Deliverer`].
pub struct QueueDrainer {
    queue: Arc<dyn QueueStore>,
    deliverer: Deliverer,
    batch_size: usize,
    interval: Duration,
}

impl QueueDrainer {
    pub fn new(queue: Arc<dyn QueueStore>, deliverer: Deliverer, config: &QueueConfig) -> Self {
        Self {
            queue,
            deliverer,
            batch_size: config.batch_size,
            interval: config.poll_interval(),
        }
    }

    /// Fail every row a crashed process left in `sending`.
    ///
    /// Such rows may or may not have reached WhatsApp; they are never resent.
    /// The store appends their `failed` log entries.
    pub async fn recover_interrupted(&self) -> Result<usize, RapidexError> {
        let rows = self.queue.fail_interrupted(NOTE_INTERRUPTED).await?;
        for row in &rows {
            warn!(queue_id = row.id, tenant = %row.eid, "row interrupted before completion");
        }
        Ok(rows.len())
    }

    /// Run one drain tick.
    ///
    /// Only a failure to fetch the batch is returned; per-row failures are
    /// recorded on the row and never stop the rest of the batch.
    pub async fn drain_once(&self) -> Result<DrainReport, RapidexError> {
        let rows = self.queue.fetch_pending(self.batch_size).await?;
        let mut report = DrainReport {
            fetched: rows.len(),
            ..Default::default()
        };

        for row in rows {
            match self.queue.mark_sending(row.id).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(queue_id = row.id, "row already claimed, skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(queue_id = row.id, error = %e, "failed to claim row");
                    report.skipped += 1;
                    continue;
                }
            }

            match self.deliver(&row).await {
                Ok(()) => {
                    self.finish(&row, DeliveryStatus::Sent, NOTE_SENT).await;
                    report.sent += 1;
                }
                Err(note) => {
                    self.finish(&row, DeliveryStatus::Failed, &note).await;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Tick until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "queue drainer started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.drain_once().await {
                Ok(report) if report.fetched > 0 => info!(
                    fetched = report.fetched,
                    sent = report.sent,
                    failed = report.failed,
                    skipped = report.skipped,
                    "drain tick finished"
                ),
                Ok(_) => debug!("queue empty"),
                Err(e) => error!(error = %e, "failed to fetch pending rows"),
            }
        }

        info!("queue drainer stopped");
    }

    /// Deliver one claimed row, returning the failure note on error.
    async fn deliver(&self, row: &QueueMessage) -> Result<(), String> {
        let tenant = TenantId::parse(&row.eid).map_err(|_| {
            warn!(queue_id = row.id, eid = %row.eid, "row has an invalid establishment id");
            NOTE_INVALID_TENANT.to_string()
        })?;

        match self
            .deliverer
            .deliver(&tenant, &row.to_number, &row.message)
            .await
        {
            Ok(DeliveryOutcome::Sent { .. }) => Ok(()),
            Ok(DeliveryOutcome::NotOnWhatsApp) => Err(NOTE_NOT_FOUND.to_string()),
            Err(e) => {
                warn!(queue_id = row.id, tenant = %tenant, error = %e, "delivery failed");
                Err(e.to_string())
            }
        }
    }

    /// Record the row's outcome and its log entry together.
    ///
    /// A row whose outcome still cannot be stored stays in `sending` with no
    /// log entry; `recover_interrupted` settles it on the next start.
    async fn finish(&self, row: &QueueMessage, status: DeliveryStatus, note: &str) {
        for attempt in 1..=FINISH_ATTEMPTS {
            match self.queue.finish(row.id, status, note).await {
                Ok(()) => return,
                Err(e) if attempt < FINISH_ATTEMPTS => {
                    warn!(
                        queue_id = row.id,
                        status = %status,
                        attempt,
                        error = %e,
                        "failed to record outcome, retrying"
                    );
                    tokio::time::sleep(FINISH_RETRY_DELAY).await;
                }
                Err(e) => {
                    error!(
                        queue_id = row.id,
                        status = %status,
                        error = %e,
                        "failed to record outcome, row left in sending"
                    );
                }
            }
        }
    }
}
