// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound delivery queue.
//!
//! Every status change is a conditional `UPDATE` on the row's current status,
//! so a row can only move `pending -> sending -> sent | failed`.

use std::str::FromStr;

use rapidex_core::{DeliveryStatus, QueueCounts, QueueMessage, QueueStatus, RapidexError};
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::queries::delivery_log;

const SELECT_COLUMNS: &str =
    "SELECT id, eid, to_number, message, status, result, created_at, updated_at FROM whatsapp_queue";

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueMessage> {
    let status: String = row.get(4)?;
    let status = QueueStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(QueueMessage {
        id: row.get(0)?,
        eid: row.get(1)?,
        to_number: row.get(2)?,
        message: row.get(3)?,
        status,
        result: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Insert a `pending` row. Returns the new row id.
pub async fn enqueue(
    db: &Database,
    eid: &str,
    to_number: &str,
    message: &str,
) -> Result<i64, RapidexError> {
    let (eid, to_number, message) = (eid.to_string(), to_number.to_string(), message.to_string());
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO whatsapp_queue (eid, to_number, message) VALUES (?1, ?2, ?3)",
                params![eid, to_number, message],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Oldest `pending` rows first, at most `limit`.
pub async fn fetch_pending(db: &Database, limit: usize) -> Result<Vec<QueueMessage>, RapidexError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<QueueMessage>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE status = 'pending' ORDER BY id ASC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], row_to_message)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Claim a row for delivery. Returns `false` when the row is no longer `pending`.
pub async fn mark_sending(db: &Database, id: i64) -> Result<bool, RapidexError> {
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE whatsapp_queue SET status = 'sending',
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND status = 'pending'",
                params![id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(changed == 1)
}

/// Finish a claimed row with a terminal status and a result note, appending
/// the matching delivery log entry in the same transaction.
pub async fn finish(
    db: &Database,
    id: i64,
    status: DeliveryStatus,
    note: &str,
) -> Result<(), RapidexError> {
    let note = note.to_string();
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE whatsapp_queue SET status = ?1, result = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3 AND status = 'sending'",
                params![status.to_string(), note, id],
            )?;
            if changed == 1 {
                delivery_log::append_for_row(&tx, id, status, &note)?;
                tx.commit()?;
            }
            Ok(changed)
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(RapidexError::Storage {
            source: format!("queue row {id} is not in sending state").into(),
        });
    }
    Ok(())
}

/// Fail every row stuck in `sending`. Returns the rows as updated.
pub async fn fail_interrupted(db: &Database, note: &str) -> Result<Vec<QueueMessage>, RapidexError> {
    let note = note.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<QueueMessage>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let ids = {
                let mut stmt = tx
                    .prepare("SELECT id FROM whatsapp_queue WHERE status = 'sending' ORDER BY id ASC")?;
                let ids = stmt.query_map([], |row| row.get::<_, i64>(0))?;
                ids.collect::<Result<Vec<_>, _>>()?
            };
            tx.execute(
                "UPDATE whatsapp_queue SET status = 'failed', result = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'sending'",
                params![note],
            )?;
            for id in &ids {
                delivery_log::append_for_row(&tx, *id, DeliveryStatus::Failed, &note)?;
            }
            let rows = {
                let mut stmt = tx.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
                ids.iter()
                    .map(|id| stmt.query_row(params![id], row_to_message))
                    .collect::<Result<Vec<_>, _>>()?
            };
            tx.commit()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a single row.
pub async fn get_message(db: &Database, id: i64) -> Result<Option<QueueMessage>, RapidexError> {
    db.connection()
        .call(move |conn| -> Result<Option<QueueMessage>, rusqlite::Error> {
            match conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                row_to_message,
            ) {
                Ok(message) => Ok(Some(message)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Row counts grouped by status.
pub async fn counts(db: &Database) -> Result<QueueCounts, RapidexError> {
    let grouped = db
        .connection()
        .call(|conn| -> Result<Vec<(String, i64)>, rusqlite::Error> {
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM whatsapp_queue GROUP BY status")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)?;

    let mut counts = QueueCounts::default();
    for (status, n) in grouped {
        let n = u64::try_from(n).unwrap_or_default();
        match QueueStatus::from_str(&status) {
            Ok(QueueStatus::Pending) => counts.pending = n,
            Ok(QueueStatus::Sending) => counts.sending = n,
            Ok(QueueStatus::Sent) => counts.sent = n,
            Ok(QueueStatus::Failed) => counts.failed = n,
            Err(_) => tracing::warn!(status = %status, "unexpected queue status in database"),
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn fetch_pending_is_oldest_first_and_bounded() {
        let (db, _dir) = setup_db().await;
        let mut ids = Vec::new();
        for i in 0..7 {
            ids.push(enqueue(&db, "shop1", &format!("55119999900{i:02}"), "hi").await.unwrap());
        }

        let batch = fetch_pending(&db, 5).await.unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(
            batch.iter().map(|m| m.id).collect::<Vec<_>>(),
            ids[..5].to_vec()
        );
        assert!(batch.iter().all(|m| m.status == QueueStatus::Pending));
        assert!(batch[0].result.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claimed_rows_are_not_fetched_again() {
        let (db, _dir) = setup_db().await;
        let a = enqueue(&db, "shop1", "1", "a").await.unwrap();
        let b = enqueue(&db, "shop1", "2", "b").await.unwrap();

        assert!(mark_sending(&db, a).await.unwrap());
        let batch = fetch_pending(&db, 5).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, b);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mark_sending_is_conditional() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "shop1", "1", "a").await.unwrap();

        assert!(mark_sending(&db, id).await.unwrap());
        assert!(!mark_sending(&db, id).await.unwrap(), "second claim must lose");
        assert!(!mark_sending(&db, 9999).await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn finish_records_status_and_note() {
        let (db, _dir) = setup_db().await;
        let sent = enqueue(&db, "shop1", "1", "a").await.unwrap();
        let failed = enqueue(&db, "shop1", "2", "b").await.unwrap();
        mark_sending(&db, sent).await.unwrap();
        mark_sending(&db, failed).await.unwrap();

        finish(&db, sent, DeliveryStatus::Sent, "OK").await.unwrap();
        finish(&db, failed, DeliveryStatus::Failed, "number does not exist")
            .await
            .unwrap();

        let row = get_message(&db, sent).await.unwrap().unwrap();
        assert_eq!(row.status, QueueStatus::Sent);
        assert_eq!(row.result.as_deref(), Some("OK"));
        let row = get_message(&db, failed).await.unwrap().unwrap();
        assert_eq!(row.status, QueueStatus::Failed);
        assert_eq!(row.result.as_deref(), Some("number does not exist"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn transitions_never_go_backwards() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "shop1", "1", "a").await.unwrap();

        // pending -> sent skips the claim and is refused.
        assert!(finish(&db, id, DeliveryStatus::Sent, "OK").await.is_err());

        mark_sending(&db, id).await.unwrap();
        finish(&db, id, DeliveryStatus::Sent, "OK").await.unwrap();

        // terminal rows cannot be finished again or re-claimed.
        assert!(finish(&db, id, DeliveryStatus::Failed, "late").await.is_err());
        assert!(!mark_sending(&db, id).await.unwrap());

        let row = get_message(&db, id).await.unwrap().unwrap();
        assert_eq!(row.status, QueueStatus::Sent);

        // Refused transitions leave no log entry behind.
        let log = delivery_log::list(&db, None, 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, DeliveryStatus::Sent);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fail_interrupted_only_touches_sending_rows() {
        let (db, _dir) = setup_db().await;
        let stuck = enqueue(&db, "shop1", "1", "a").await.unwrap();
        let waiting = enqueue(&db, "shop1", "2", "b").await.unwrap();
        mark_sending(&db, stuck).await.unwrap();

        let failed = fail_interrupted(&db, "interrupted before completion")
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, stuck);
        assert_eq!(failed[0].status, QueueStatus::Failed);

        let row = get_message(&db, waiting).await.unwrap().unwrap();
        assert_eq!(row.status, QueueStatus::Pending);

        let log = delivery_log::list(&db, None, 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, DeliveryStatus::Failed);
        assert_eq!(log[0].response, "interrupted before completion");

        assert!(fail_interrupted(&db, "again").await.unwrap().is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn counts_group_by_status() {
        let (db, _dir) = setup_db().await;
        for n in 0..4 {
            enqueue(&db, "shop1", &n.to_string(), "m").await.unwrap();
        }
        mark_sending(&db, 1).await.unwrap();
        mark_sending(&db, 2).await.unwrap();
        finish(&db, 2, DeliveryStatus::Sent, "OK").await.unwrap();

        let counts = counts(&db).await.unwrap();
        assert_eq!(
            counts,
            QueueCounts {
                pending: 2,
                sending: 1,
                sent: 1,
                failed: 0
            }
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_missing_row_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_message(&db, 42).await.unwrap().is_none());
        db.close().await.unwrap();
    }
}
