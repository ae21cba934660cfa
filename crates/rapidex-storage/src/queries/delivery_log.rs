// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only delivery log.

use std::str::FromStr;

use rapidex_core::{DeliveryLogEntry, DeliveryStatus, RapidexError};
use rusqlite::params;

use crate::database::{Database, map_tr_err};

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeliveryLogEntry> {
    let status: String = row.get(4)?;
    let status = DeliveryStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(DeliveryLogEntry {
        id: row.get(0)?,
        eid: row.get(1)?,
        to_number: row.get(2)?,
        message: row.get(3)?,
        status,
        response: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Append the outcome of queue row `queue_id`, copying its tenant,
/// destination and body. Runs on the caller's connection so it can share the
/// row update's transaction.
pub(crate) fn append_for_row(
    conn: &rusqlite::Connection,
    queue_id: i64,
    status: DeliveryStatus,
    response: &str,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO whatsapp_log (eid, to_number, message, status, response)
         SELECT eid, to_number, message, ?1, ?2 FROM whatsapp_queue WHERE id = ?3",
        params![status.to_string(), response, queue_id],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent entries first, optionally for one establishment only.
pub async fn list(
    db: &Database,
    eid: Option<&str>,
    limit: usize,
) -> Result<Vec<DeliveryLogEntry>, RapidexError> {
    let eid = eid.map(str::to_string);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<DeliveryLogEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, eid, to_number, message, status, response, created_at
                 FROM whatsapp_log
                 WHERE ?1 IS NULL OR eid = ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![eid, limit], row_to_entry)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::queue;
    use tempfile::tempdir;

    #[tokio::test]
    async fn entries_copy_the_row_and_list_newest_first() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("log.db").to_str().unwrap())
            .await
            .unwrap();

        let outcomes = [
            ("shop1", DeliveryStatus::Sent, "OK"),
            ("shop2", DeliveryStatus::Failed, "number does not exist"),
            ("shop1", DeliveryStatus::Failed, "timeout"),
        ];
        for (eid, status, note) in outcomes {
            let id = queue::enqueue(&db, eid, "5511999990000", "pedido saiu para entrega")
                .await
                .unwrap();
            assert!(queue::mark_sending(&db, id).await.unwrap());
            queue::finish(&db, id, status, note).await.unwrap();
        }

        let all = list(&db, None, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].response, "timeout");
        assert_eq!(all[0].to_number, "5511999990000");
        assert_eq!(all[0].message, "pedido saiu para entrega");
        assert_eq!(all[2].status, DeliveryStatus::Sent);
        assert!(!all[0].created_at.is_empty());

        let shop1 = list(&db, Some("shop1"), 10).await.unwrap();
        assert_eq!(shop1.len(), 2);
        assert!(shop1.iter().all(|e| e.eid == "shop1"));

        let limited = list(&db, None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);

        db.close().await.unwrap();
    }
}
