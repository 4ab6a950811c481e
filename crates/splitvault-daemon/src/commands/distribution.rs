//! Distribution handlers: immediate, allowance-funded and scheduled.

use serde_json::Value;
use splitvault_ledger::engine::PollOutcome;
use splitvault_types::{ScheduleHandle, SplitId};

use super::{amount, caller, commit, parse_id, to_json, token, Result};
use crate::rpc::RpcError;
use crate::{DaemonState, SandboxEngine};

/// Pay out of custody to the split's recipients now.
pub async fn distribute(state: &DaemonState, params: &Value) -> Result {
    let caller = caller(params)?;
    let split_id: SplitId = parse_id(params, "split_id")?;
    let token = token(params)?;
    let amount = amount(params, "amount")?;

    let mut engine = state.engine.lock().await;
    engine.distribute(caller, split_id, token, amount)?;
    commit(state, &mut engine).await?;

    Ok(serde_json::json!({ "balance": engine.balance_of(&split_id, &token) }))
}

/// Pay native currency from the owner's allowance.
pub async fn distribute_from_hbar_allowance(state: &DaemonState, params: &Value) -> Result {
    let caller = caller(params)?;
    let split_id: SplitId = parse_id(params, "split_id")?;
    let amount = amount(params, "amount")?;

    let mut engine = state.engine.lock().await;
    engine.distribute_from_hbar_allowance(caller, split_id, amount)?;
    spend_sandbox_allowance(&mut engine);
    commit(state, &mut engine).await?;

    Ok(serde_json::json!({ "distributed": amount }))
}

/// The sandbox rail does not talk to the allowance service, so draw the
/// approved legs of the last batch down by hand.
fn spend_sandbox_allowance(engine: &mut SandboxEngine) {
    let legs = engine
        .rail()
        .last_batch()
        .map(|batch| batch.debits.clone())
        .unwrap_or_default();
    let custodian = engine.config().custodian;
    engine.allowances_mut().consume(custodian, &legs);
}

/// Submit a deferred distribution and reserve its amount.
pub async fn schedule_distribute(state: &DaemonState, params: &Value) -> Result {
    let caller = caller(params)?;
    let split_id: SplitId = parse_id(params, "split_id")?;
    let token = token(params)?;
    let amount = amount(params, "amount")?;

    let mut engine = state.engine.lock().await;
    let handle = engine.schedule_distribute(caller, split_id, token, amount)?;
    commit(state, &mut engine).await?;

    Ok(serde_json::json!({
        "handle": handle,
        "reserved": engine.reserved_of(&split_id, &token),
    }))
}

/// Settle an executed schedule. Owner only.
pub async fn finalize_scheduled_distribution(state: &DaemonState, params: &Value) -> Result {
    let caller = caller(params)?;
    let handle: ScheduleHandle = parse_id(params, "handle")?;

    let mut engine = state.engine.lock().await;
    let outcome = engine.finalize_scheduled_distribution(caller, handle)?;
    poll_result(state, &mut engine, outcome).await
}

/// Return a deleted or invalid schedule's funds to availability. Owner only.
pub async fn release_scheduled_distribution(state: &DaemonState, params: &Value) -> Result {
    let caller = caller(params)?;
    let handle: ScheduleHandle = parse_id(params, "handle")?;

    let mut engine = state.engine.lock().await;
    let outcome = engine.release_scheduled_distribution(caller, handle)?;
    poll_result(state, &mut engine, outcome).await
}

async fn poll_result(
    state: &DaemonState,
    engine: &mut SandboxEngine,
    outcome: PollOutcome,
) -> std::result::Result<Value, RpcError> {
    match outcome {
        PollOutcome::StillPending => Ok(serde_json::json!({ "status": "pending" })),
        PollOutcome::Applied(reservation) => {
            commit(state, engine).await?;
            Ok(serde_json::json!({
                "status": "applied",
                "reservation": to_json(&reservation)?,
            }))
        }
    }
}
