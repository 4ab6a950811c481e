//! Forward-only schema migrations keyed on `PRAGMA user_version`.

use rusqlite::Connection;

use crate::{schema, DbError, Result, SCHEMA_VERSION};

/// Ordered migration steps; entry `n` brings the schema to version `n + 1`.
const STEPS: &[&str] = &[schema::SCHEMA_V1];

fn user_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the schema up to [`SCHEMA_VERSION`].
///
/// Each step is applied in its own transaction together with the version
/// bump, so an interrupted upgrade leaves the last completed version.
pub fn run(conn: &mut Connection) -> Result<()> {
    let found = user_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "schema v{found} was written by a newer build (this build knows v{SCHEMA_VERSION})"
        )));
    }

    for target in (found + 1)..=SCHEMA_VERSION {
        let sql = step(target)?;
        tracing::info!(from = target - 1, to = target, "Migrating ledger schema");
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", target)?;
        tx.commit()?;
    }

    Ok(())
}

fn step(target: u32) -> Result<&'static str> {
    target
        .checked_sub(1)
        .and_then(|index| STEPS.get(index as usize))
        .copied()
        .ok_or_else(|| DbError::Migration(format!("no migration step for v{target}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch("PRAGMA foreign_keys = ON;").expect("pragma");
        conn
    }

    #[test]
    fn test_blank_database_reaches_current_version() {
        let mut conn = blank();
        run(&mut conn).expect("migrate");
        assert_eq!(user_version(&conn).expect("version"), SCHEMA_VERSION);
    }

    #[test]
    fn test_rerun_is_noop() {
        let mut conn = blank();
        run(&mut conn).expect("first");
        run(&mut conn).expect("second");
        assert_eq!(user_version(&conn).expect("version"), SCHEMA_VERSION);
    }

    #[test]
    fn test_future_schema_refused() {
        let mut conn = blank();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .expect("bump");
        assert!(matches!(run(&mut conn), Err(DbError::Migration(_))));
    }

    #[test]
    fn test_every_version_has_a_step() {
        for target in 1..=SCHEMA_VERSION {
            step(target).expect("step");
        }
        assert!(step(0).is_err());
        assert!(step(SCHEMA_VERSION + 1).is_err());
    }

    #[test]
    fn test_ledger_tables_exist() {
        let mut conn = blank();
        run(&mut conn).expect("migrate");

        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .expect("prepare");
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .expect("query")
            .collect::<std::result::Result<_, _>>()
            .expect("collect");

        for table in [
            "agreements",
            "balances",
            "creator_nonces",
            "event_log",
            "reservations",
            "split_recipients",
            "splits",
        ] {
            assert!(names.iter().any(|n| n == table), "missing table {table}");
        }
    }

    #[test]
    fn test_reserved_cannot_exceed_balance() {
        let mut conn = blank();
        run(&mut conn).expect("migrate");
        conn.execute(
            "INSERT INTO splits (split_id, owner, creator_nonce) VALUES (?1, ?2, 0)",
            rusqlite::params![[1u8; 32].as_slice(), [2u8; 32].as_slice()],
        )
        .expect("split");
        let result = conn.execute(
            "INSERT INTO balances (split_id, token, balance, reserved) VALUES (?1, ?2, 10, 11)",
            rusqlite::params![[1u8; 32].as_slice(), [3u8; 32].as_slice()],
        );
        assert!(result.is_err());
    }
}
