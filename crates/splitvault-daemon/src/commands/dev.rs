//! Sandbox manipulation, available when `advanced.dev_commands` is set.

use serde_json::Value;
use splitvault_types::{AccountId, ScheduleHandle, ScheduleStatus};
use tracing::info;

use super::{amount, parse_id, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Set the status the sandbox scheduler reports for a handle.
pub async fn dev_set_schedule_status(state: &DaemonState, params: &Value) -> Result {
    let handle: ScheduleHandle = parse_id(params, "handle")?;
    let status = params
        .get("status")
        .and_then(|v| v.as_str())
        .and_then(ScheduleStatus::parse)
        .ok_or_else(|| RpcError::invalid_params("status must be pending|executed|deleted|invalid|unknown"))?;

    let mut engine = state.engine.lock().await;
    let updated = engine.scheduler_mut().set_status(&handle, status);
    info!(handle = %handle, ?status, updated, "sandbox schedule status set");
    Ok(serde_json::json!({ "updated": updated }))
}

/// Grant the custodian an allowance over the owner's native currency.
pub async fn dev_set_allowance(state: &DaemonState, params: &Value) -> Result {
    let owner: AccountId = parse_id(params, "owner")?;
    let amount = amount(params, "amount")?;

    let mut engine = state.engine.lock().await;
    let custodian = engine.config().custodian;
    engine.allowances_mut().grant(owner, custodian, amount);
    info!(owner = %owner, amount, "sandbox allowance granted");
    Ok(serde_json::json!({ "owner": owner, "spender": custodian, "amount": amount }))
}
