//! Ledger snapshot persistence.
//!
//! The engine's whole state is rewritten in a single transaction after each
//! committed mutation, so the stored state is always one the engine produced.

use std::collections::HashMap;

use rusqlite::{params, Connection, Transaction};
use splitvault_types::{
    AccountId, AgreementRecord, BalanceRecord, CreatorNonce, LedgerEvent, LedgerSnapshot,
    Reservation,
    ReservationState, ScheduleHandle, Split, SplitId, TokenId,
};

use crate::{blob32, from_sql_amount, to_sql_amount, DbError, Result};

/// Replace the stored ledger state with `snapshot`.
///
/// All-or-nothing: on any error the previous state is left untouched.
pub fn save_snapshot(conn: &mut Connection, snapshot: &LedgerSnapshot) -> Result<()> {
    save_with_events(conn, snapshot, &[])
}

/// Replace the stored ledger state and append `events` to the notification
/// log in one transaction. Either both land or neither does.
pub fn save_with_events(
    conn: &mut Connection,
    snapshot: &LedgerSnapshot,
    events: &[LedgerEvent],
) -> Result<()> {
    let tx = conn.transaction()?;
    clear(&tx)?;
    write_splits(&tx, &snapshot.splits)?;
    write_nonces(&tx, &snapshot.nonces)?;
    write_balances(&tx, &snapshot.balances)?;
    write_reservations(&tx, &snapshot.reservations)?;
    write_agreements(&tx, &snapshot.agreements)?;
    for event in events {
        crate::queries::events::append(&tx, event)?;
    }
    tx.commit()?;

    tracing::debug!(
        splits = snapshot.splits.len(),
        balances = snapshot.balances.len(),
        reservations = snapshot.reservations.len(),
        events = events.len(),
        "ledger snapshot saved"
    );
    Ok(())
}

/// Load the stored ledger state, in the same order the engine produces it.
pub fn load_snapshot(conn: &Connection) -> Result<LedgerSnapshot> {
    Ok(LedgerSnapshot {
        splits: read_splits(conn)?,
        nonces: read_nonces(conn)?,
        balances: read_balances(conn)?,
        reservations: read_reservations(conn)?,
        agreements: read_agreements(conn)?,
    })
}

fn clear(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(
        "DELETE FROM reservations;
         DELETE FROM balances;
         DELETE FROM agreements;
         DELETE FROM split_recipients;
         DELETE FROM splits;
         DELETE FROM creator_nonces;",
    )?;
    Ok(())
}

fn write_splits(tx: &Transaction<'_>, splits: &[Split]) -> Result<()> {
    let mut split_stmt = tx.prepare(
        "INSERT INTO splits (split_id, owner, allowance_mode, creator_nonce)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    let mut recipient_stmt = tx.prepare(
        "INSERT INTO split_recipients (split_id, position, account, weight)
         VALUES (?1, ?2, ?3, ?4)",
    )?;

    for split in splits {
        if split.recipients.len() != split.weights.len() {
            return Err(DbError::Constraint(format!(
                "split {} has {} recipients and {} weights",
                split.id,
                split.recipients.len(),
                split.weights.len()
            )));
        }
        split_stmt.execute(params![
            split.id.as_bytes().as_slice(),
            split.owner.as_bytes().as_slice(),
            split.allowance_mode,
            to_sql_amount(split.creator_nonce)?,
        ])?;
        for (position, (account, weight)) in split.recipients.iter().zip(&split.weights).enumerate()
        {
            recipient_stmt.execute(params![
                split.id.as_bytes().as_slice(),
                position as i64,
                account.as_bytes().as_slice(),
                *weight,
            ])?;
        }
    }
    Ok(())
}

fn write_nonces(tx: &Transaction<'_>, nonces: &[CreatorNonce]) -> Result<()> {
    let mut stmt = tx.prepare("INSERT INTO creator_nonces (creator, next_nonce) VALUES (?1, ?2)")?;
    for nonce in nonces {
        stmt.execute(params![
            nonce.creator.as_bytes().as_slice(),
            to_sql_amount(nonce.next_nonce)?,
        ])?;
    }
    Ok(())
}

fn write_balances(tx: &Transaction<'_>, balances: &[BalanceRecord]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO balances (split_id, token, balance, reserved) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for record in balances {
        stmt.execute(params![
            record.split_id.as_bytes().as_slice(),
            record.token.as_bytes().as_slice(),
            to_sql_amount(record.balance)?,
            to_sql_amount(record.reserved)?,
        ])?;
    }
    Ok(())
}

fn write_reservations(tx: &Transaction<'_>, reservations: &[Reservation]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO reservations (handle, split_id, token, amount, state)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for reservation in reservations {
        stmt.execute(params![
            reservation.handle.as_bytes().as_slice(),
            reservation.split_id.as_bytes().as_slice(),
            reservation.token.as_bytes().as_slice(),
            to_sql_amount(reservation.amount)?,
            reservation.state.as_str(),
        ])?;
    }
    Ok(())
}

fn write_agreements(tx: &Transaction<'_>, agreements: &[AgreementRecord]) -> Result<()> {
    let mut stmt = tx.prepare("INSERT INTO agreements (split_id, reference_id) VALUES (?1, ?2)")?;
    for record in agreements {
        stmt.execute(params![
            record.split_id.as_bytes().as_slice(),
            record.reference_id,
        ])?;
    }
    Ok(())
}

fn read_splits(conn: &Connection) -> Result<Vec<Split>> {
    let mut stmt = conn.prepare(
        "SELECT split_id, account, weight FROM split_recipients
         ORDER BY split_id, position",
    )?;
    let recipient_rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut members: HashMap<[u8; 32], (Vec<AccountId>, Vec<u8>)> = HashMap::new();
    for (split_id, account, weight) in recipient_rows {
        let weight = u8::try_from(weight)
            .map_err(|_| DbError::Serialization(format!("weight {weight} out of range")))?;
        let entry = members.entry(blob32(split_id)?).or_default();
        entry.0.push(AccountId(blob32(account)?));
        entry.1.push(weight);
    }

    let mut stmt = conn.prepare(
        "SELECT split_id, owner, allowance_mode, creator_nonce FROM splits ORDER BY split_id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, owner, allowance_mode, nonce)| -> Result<Split> {
            let id = blob32(id)?;
            let (recipients, weights) = members.remove(&id).unwrap_or_default();
            Ok(Split {
                id: SplitId(id),
                owner: AccountId(blob32(owner)?),
                recipients,
                weights,
                allowance_mode,
                creator_nonce: from_sql_amount(nonce)?,
            })
        })
        .collect()
}

fn read_nonces(conn: &Connection) -> Result<Vec<CreatorNonce>> {
    let mut stmt =
        conn.prepare("SELECT creator, next_nonce FROM creator_nonces ORDER BY creator")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(creator, next_nonce)| -> Result<CreatorNonce> {
            Ok(CreatorNonce {
                creator: AccountId(blob32(creator)?),
                next_nonce: from_sql_amount(next_nonce)?,
            })
        })
        .collect()
}

fn read_balances(conn: &Connection) -> Result<Vec<BalanceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT split_id, token, balance, reserved FROM balances ORDER BY split_id, token",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(split_id, token, balance, reserved)| -> Result<BalanceRecord> {
            Ok(BalanceRecord {
                split_id: SplitId(blob32(split_id)?),
                token: TokenId(blob32(token)?),
                balance: from_sql_amount(balance)?,
                reserved: from_sql_amount(reserved)?,
            })
        })
        .collect()
}

fn read_reservations(conn: &Connection) -> Result<Vec<Reservation>> {
    let mut stmt = conn.prepare(
        "SELECT handle, split_id, token, amount, state FROM reservations ORDER BY handle",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(handle, split_id, token, amount, state)| -> Result<Reservation> {
            let state = ReservationState::parse(&state)
                .ok_or_else(|| DbError::Serialization(format!("unknown reservation state '{state}'")))?;
            Ok(Reservation {
                handle: ScheduleHandle(blob32(handle)?),
                split_id: SplitId(blob32(split_id)?),
                token: TokenId(blob32(token)?),
                amount: from_sql_amount(amount)?,
                state,
            })
        })
        .collect()
}

fn read_agreements(conn: &Connection) -> Result<Vec<AgreementRecord>> {
    let mut stmt =
        conn.prepare("SELECT split_id, reference_id FROM agreements ORDER BY split_id")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(split_id, reference_id)| -> Result<AgreementRecord> {
            Ok(AgreementRecord {
                split_id: SplitId(blob32(split_id)?),
                reference_id,
            })
        })
        .collect()
}
