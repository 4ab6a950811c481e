//! IPC command handlers.
//!
//! Each submodule implements the commands for one IPC category. Every
//! mutating handler runs with the engine lock held from the ledger call
//! through [`commit`], so persisted state always matches acknowledged state.

pub mod dev;
pub mod distribution;
pub mod queries;
pub mod splits;

use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;
use splitvault_types::{AccountId, IdParseError, TokenId};
use tracing::error;

use crate::events::{now_secs, Event};
use crate::rpc::RpcError;
use crate::{DaemonState, SandboxEngine};

/// Handler result: a JSON value or an RPC error.
pub type Result = std::result::Result<Value, RpcError>;

/// Parse a required hex identifier parameter.
pub(crate) fn parse_id<T>(params: &Value, key: &str) -> std::result::Result<T, RpcError>
where
    T: FromStr<Err = IdParseError>,
{
    let raw = params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))?;
    raw.parse()
        .map_err(|e: IdParseError| RpcError::invalid_params(&format!("{key}: {e}")))
}

/// Parse an optional hex identifier parameter.
pub(crate) fn parse_optional_id<T>(
    params: &Value,
    key: &str,
) -> std::result::Result<Option<T>, RpcError>
where
    T: FromStr<Err = IdParseError>,
{
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => parse_id(params, key).map(Some),
    }
}

/// The account the request acts as.
pub(crate) fn caller(params: &Value) -> std::result::Result<AccountId, RpcError> {
    parse_id(params, "caller")
}

/// A token parameter: hex id, or `"native"` for the native currency.
pub(crate) fn token(params: &Value) -> std::result::Result<TokenId, RpcError> {
    match params.get("token").and_then(|v| v.as_str()) {
        Some("native") => Ok(TokenId::NATIVE),
        _ => parse_id(params, "token"),
    }
}

/// A required non-negative integer parameter.
pub(crate) fn amount(params: &Value, key: &str) -> std::result::Result<u64, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} must be a non-negative integer")))
}

/// Serialize a handler result.
pub(crate) fn to_json<T: Serialize>(value: &T) -> Result {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(&e.to_string()))
}

/// Persist the engine after a committed mutation and publish its events.
///
/// Must be called with the engine lock held. A failure here means the
/// gateways already acted on a change the database does not record.
pub(crate) async fn commit(
    state: &DaemonState,
    engine: &mut SandboxEngine,
) -> std::result::Result<(), RpcError> {
    let snapshot = engine.snapshot();
    let ledger_events = engine.drain_events();

    let mut db = state.db.lock().await;
    if let Err(e) =
        splitvault_db::queries::state::save_with_events(&mut db, &snapshot, &ledger_events)
    {
        error!(
            error = %e,
            events = ledger_events.len(),
            state_divergence = true,
            "failed to persist committed ledger state"
        );
        return Err(RpcError::internal_error(&format!("persist failed: {e}")));
    }
    drop(db);

    let timestamp = now_secs();
    for event in &ledger_events {
        state.event_bus.emit(Event::ledger(event, timestamp));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::DaemonConfig;

    pub const OWNER: &str = "0101010101010101010101010101010101010101010101010101010101010101";
    pub const ALICE: &str = "a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1";
    pub const BOB: &str = "b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0";
    pub const STRANGER: &str = "6666666666666666666666666666666666666666666666666666666666666666";
    pub const TOKEN: &str = "7070707070707070707070707070707070707070707070707070707070707070";

    pub fn state() -> DaemonState {
        let mut config = DaemonConfig::default();
        config.advanced.dev_commands = true;
        let conn = splitvault_db::open_memory().expect("open db");
        DaemonState::build(config, conn).expect("build state")
    }

    /// Create the [alice:60, bob:40] split and fund it with 1000 TOKEN.
    pub async fn funded(state: &DaemonState) -> String {
        let created = splits::create_split(
            state,
            &serde_json::json!({
                "caller": OWNER,
                "recipients": [ALICE, BOB],
                "weights": [60, 40],
            }),
        )
        .await
        .expect("create");
        let split_id = created["split_id"].as_str().expect("id").to_string();
        splits::deposit_token(
            state,
            &serde_json::json!({
                "caller": OWNER,
                "split_id": split_id,
                "token": TOKEN,
                "amount": 1000,
            }),
        )
        .await
        .expect("deposit");
        split_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_param() {
        let native = token(&serde_json::json!({"token": "native"})).expect("native");
        assert!(native.is_native());
        let hex = token(&serde_json::json!({"token": testing::TOKEN})).expect("hex");
        assert_eq!(hex, TokenId([0x70; 32]));
        assert!(token(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_amount_param() {
        assert_eq!(amount(&serde_json::json!({"amount": 5}), "amount").expect("ok"), 5);
        assert!(amount(&serde_json::json!({"amount": -5}), "amount").is_err());
        assert!(amount(&serde_json::json!({"amount": "5"}), "amount").is_err());
    }

    #[tokio::test]
    async fn test_unloggable_events_fail_the_call() {
        let state = testing::state();
        let split_id = testing::funded(&state).await;
        state
            .db
            .lock()
            .await
            .execute_batch("DROP TABLE event_log;")
            .expect("drop log");
        let mut rx = state.event_bus.subscribe();

        let err = splits::record_agreement(
            &state,
            &serde_json::json!({
                "caller": testing::OWNER,
                "split_id": split_id,
                "reference_id": "bafy",
            }),
        )
        .await
        .expect_err("log append fails");
        assert_eq!(err.code, -32603);
        assert!(rx.try_recv().is_err());

        let db = state.db.lock().await;
        let stored = splitvault_db::queries::state::load_snapshot(&db).expect("load");
        assert!(stored.agreements.is_empty());
    }

    #[tokio::test]
    async fn test_commit_persists_and_broadcasts() {
        let state = testing::state();
        let mut rx = state.event_bus.subscribe();
        let split_id = testing::funded(&state).await;

        let first = rx.try_recv().expect("created event");
        assert_eq!(first.event_type, "split_created");
        let second = rx.try_recv().expect("deposit event");
        assert_eq!(second.event_type, "deposit");

        let db = state.db.lock().await;
        let snapshot = splitvault_db::queries::state::load_snapshot(&db).expect("load");
        assert_eq!(snapshot.splits.len(), 1);
        assert_eq!(snapshot.splits[0].id.to_hex(), split_id);
        assert_eq!(snapshot.balances[0].balance, 1000);

        let logged = splitvault_db::queries::events::recent(&db, 10, None).expect("events");
        assert_eq!(logged.len(), 2);
    }
}
