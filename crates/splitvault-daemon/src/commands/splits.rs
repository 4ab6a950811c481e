//! Split lifecycle and deposit handlers.

use serde_json::Value;
use splitvault_types::{AccountId, SplitId};

use super::{amount, caller, commit, parse_id, token, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

fn recipients(params: &Value) -> std::result::Result<Vec<AccountId>, RpcError> {
    let list = params
        .get("recipients")
        .and_then(|v| v.as_array())
        .ok_or_else(|| RpcError::invalid_params("recipients array required"))?;
    list.iter()
        .enumerate()
        .map(|(i, v)| -> std::result::Result<AccountId, RpcError> {
            v.as_str()
                .ok_or_else(|| RpcError::invalid_params(&format!("recipients[{i}] must be hex")))?
                .parse::<AccountId>()
                .map_err(|e| RpcError::invalid_params(&format!("recipients[{i}]: {e}")))
        })
        .collect()
}

fn weights(params: &Value) -> std::result::Result<Vec<u8>, RpcError> {
    let list = params
        .get("weights")
        .and_then(|v| v.as_array())
        .ok_or_else(|| RpcError::invalid_params("weights array required"))?;
    list.iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_u64()
                .and_then(|w| u8::try_from(w).ok())
                .ok_or_else(|| RpcError::invalid_params(&format!("weights[{i}] must be 0..=255")))
        })
        .collect()
}

/// Create a split owned by the caller.
pub async fn create_split(state: &DaemonState, params: &Value) -> Result {
    let caller = caller(params)?;
    let recipients = recipients(params)?;
    let weights = weights(params)?;

    let mut engine = state.engine.lock().await;
    let split_id = engine.create_split(caller, recipients, weights)?;
    commit(state, &mut engine).await?;

    Ok(serde_json::json!({ "split_id": split_id }))
}

/// Enable or disable allowance mode. Owner only.
pub async fn configure_hbar_allowance(state: &DaemonState, params: &Value) -> Result {
    let caller = caller(params)?;
    let split_id: SplitId = parse_id(params, "split_id")?;
    let enabled = params
        .get("enabled")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| RpcError::invalid_params("enabled must be a boolean"))?;

    let mut engine = state.engine.lock().await;
    engine.configure_hbar_allowance(caller, split_id, enabled)?;
    commit(state, &mut engine).await?;

    Ok(serde_json::json!({ "split_id": split_id, "allowance_mode": enabled }))
}

/// Attach an agreement reference. Owner only.
pub async fn record_agreement(state: &DaemonState, params: &Value) -> Result {
    let caller = caller(params)?;
    let split_id: SplitId = parse_id(params, "split_id")?;
    let reference_id = params
        .get("reference_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params("reference_id required"))?
        .to_string();

    let mut engine = state.engine.lock().await;
    engine.record_agreement(caller, split_id, reference_id)?;
    commit(state, &mut engine).await?;

    Ok(serde_json::json!({ "recorded": true }))
}

/// Pull a fungible token from the caller into custody.
pub async fn deposit_token(state: &DaemonState, params: &Value) -> Result {
    let caller = caller(params)?;
    let split_id: SplitId = parse_id(params, "split_id")?;
    let token = token(params)?;
    let amount = amount(params, "amount")?;

    let mut engine = state.engine.lock().await;
    engine.deposit_token(caller, split_id, token, amount)?;
    commit(state, &mut engine).await?;

    Ok(serde_json::json!({ "balance": engine.balance_of(&split_id, &token) }))
}

/// Credit native currency attached to the call (`amount`).
pub async fn deposit_native(state: &DaemonState, params: &Value) -> Result {
    let caller = caller(params)?;
    let split_id: SplitId = parse_id(params, "split_id")?;
    let amount = amount(params, "amount")?;

    let mut engine = state.engine.lock().await;
    engine.deposit_native(caller, split_id, amount)?;
    commit(state, &mut engine).await?;

    let balance = engine.balance_of(&split_id, &splitvault_types::TokenId::NATIVE);
    Ok(serde_json::json!({ "balance": balance }))
}
