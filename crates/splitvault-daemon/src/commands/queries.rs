//! Read-only query handlers.

use serde_json::Value;
use splitvault_types::{ScheduleHandle, SplitId};

use super::{parse_id, parse_optional_id, to_json, token, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

const DEFAULT_EVENT_LIMIT: u32 = 50;
const MAX_EVENT_LIMIT: u32 = 1000;

pub async fn balance_of(state: &DaemonState, params: &Value) -> Result {
    let split_id: SplitId = parse_id(params, "split_id")?;
    let token = token(params)?;
    let engine = state.engine.lock().await;
    Ok(serde_json::json!({ "balance": engine.balance_of(&split_id, &token) }))
}

pub async fn reserved_of(state: &DaemonState, params: &Value) -> Result {
    let split_id: SplitId = parse_id(params, "split_id")?;
    let token = token(params)?;
    let engine = state.engine.lock().await;
    Ok(serde_json::json!({ "reserved": engine.reserved_of(&split_id, &token) }))
}

pub async fn available_balance(state: &DaemonState, params: &Value) -> Result {
    let split_id: SplitId = parse_id(params, "split_id")?;
    let token = token(params)?;
    let engine = state.engine.lock().await;
    let available = engine.available_balance(&split_id, &token)?;
    Ok(serde_json::json!({ "available": available }))
}

pub async fn get_split(state: &DaemonState, params: &Value) -> Result {
    let split_id: SplitId = parse_id(params, "split_id")?;
    let engine = state.engine.lock().await;
    to_json(engine.split(&split_id)?)
}

pub async fn get_reservation(state: &DaemonState, params: &Value) -> Result {
    let handle: ScheduleHandle = parse_id(params, "handle")?;
    let engine = state.engine.lock().await;
    to_json(engine.reservation(&handle)?)
}

pub async fn get_agreement(state: &DaemonState, params: &Value) -> Result {
    let split_id: SplitId = parse_id(params, "split_id")?;
    let engine = state.engine.lock().await;
    let reference_id = engine.agreement(&split_id)?;
    Ok(serde_json::json!({ "reference_id": reference_id }))
}

/// Active reservations, optionally for one split.
pub async fn list_reservations(state: &DaemonState, params: &Value) -> Result {
    let split_id: Option<SplitId> = parse_optional_id(params, "split_id")?;
    let engine = state.engine.lock().await;
    to_json(&engine.list_reservations(split_id.as_ref()))
}

/// Most recent notifications from the event log, newest first.
pub async fn recent_events(state: &DaemonState, params: &Value) -> Result {
    let split_id: Option<SplitId> = parse_optional_id(params, "split_id")?;
    let limit = match params.get("limit").and_then(|v| v.as_u64()) {
        Some(n) => u32::try_from(n).unwrap_or(MAX_EVENT_LIMIT).min(MAX_EVENT_LIMIT),
        None => DEFAULT_EVENT_LIMIT,
    };

    let db = state.db.lock().await;
    let rows = splitvault_db::queries::events::recent(&db, limit, split_id.as_ref())
        .map_err(|e| RpcError::internal_error(&format!("db error: {e}")))?;
    to_json(&rows)
}
