//! Append-only notification log.

use rusqlite::Connection;
use serde::Serialize;
use splitvault_types::{LedgerEvent, SplitId};

use crate::{now_secs, DbError, Result};

/// A stored notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventRow {
    pub seq: i64,
    pub recorded_at: i64,
    pub event: LedgerEvent,
}

/// Append an event; returns its sequence number.
pub fn append(conn: &Connection, event: &LedgerEvent) -> Result<i64> {
    let payload =
        serde_json::to_string(event).map_err(|e| DbError::Serialization(e.to_string()))?;
    conn.execute(
        "INSERT INTO event_log (event_type, split_id, payload, recorded_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            event.name(),
            event.split_id().as_bytes().as_slice(),
            payload,
            now_secs(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent events first, optionally restricted to one split.
pub fn recent(conn: &Connection, limit: u32, split_id: Option<&SplitId>) -> Result<Vec<EventRow>> {
    let mut stmt = conn.prepare(
        "SELECT seq, recorded_at, payload FROM event_log
         WHERE ?1 IS NULL OR split_id = ?1
         ORDER BY seq DESC LIMIT ?2",
    )?;

    let filter = split_id.map(|id| id.as_bytes().to_vec());
    let rows = stmt
        .query_map(rusqlite::params![filter, limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(seq, recorded_at, payload)| -> Result<EventRow> {
            let event = serde_json::from_str(&payload)
                .map_err(|e| DbError::Serialization(format!("event {seq}: {e}")))?;
            Ok(EventRow {
                seq,
                recorded_at,
                event,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitvault_types::{AccountId, TokenId};

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    fn deposit(split: u8, amount: u64) -> LedgerEvent {
        LedgerEvent::Deposit {
            split_id: SplitId([split; 32]),
            token: TokenId::NATIVE,
            amount,
            sender: AccountId([3; 32]),
        }
    }

    #[test]
    fn test_append_assigns_increasing_seq() {
        let conn = test_db();
        let a = append(&conn, &deposit(1, 10)).expect("append");
        let b = append(&conn, &deposit(1, 20)).expect("append");
        assert!(b > a);
    }

    #[test]
    fn test_recent_newest_first() {
        let conn = test_db();
        append(&conn, &deposit(1, 10)).expect("append");
        append(&conn, &deposit(1, 20)).expect("append");
        append(&conn, &deposit(1, 30)).expect("append");

        let rows = recent(&conn, 2, None).expect("recent");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].event, deposit(1, 30));
        assert_eq!(rows[1].event, deposit(1, 20));
    }

    #[test]
    fn test_recent_filters_by_split() {
        let conn = test_db();
        append(&conn, &deposit(1, 10)).expect("append");
        append(&conn, &deposit(2, 20)).expect("append");
        append(&conn, &deposit(1, 30)).expect("append");

        let rows = recent(&conn, 10, Some(&SplitId([2; 32]))).expect("recent");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event, deposit(2, 20));
    }
}
