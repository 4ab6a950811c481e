//! Notifications emitted by ledger operations.

use serde::{Deserialize, Serialize};

use crate::{AccountId, ScheduleHandle, SplitId, TokenId};

/// A notification produced by a committed ledger operation.
///
/// Serialized with an `event_type` tag, e.g.
/// `{"event_type":"deposit","split_id":"..","token":"..","amount":1000,"sender":".."}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LedgerEvent {
    SplitCreated {
        split_id: SplitId,
        owner: AccountId,
        recipients: Vec<AccountId>,
        weights: Vec<u8>,
    },
    Deposit {
        split_id: SplitId,
        token: TokenId,
        amount: u64,
        sender: AccountId,
    },
    HbarAllowanceConfigured {
        split_id: SplitId,
        enabled: bool,
    },
    DistributionExecuted {
        split_id: SplitId,
        token: TokenId,
        amount: u64,
        /// True when the debit came from the owner's allowance.
        from_allowance: bool,
    },
    ScheduleReserved {
        split_id: SplitId,
        token: TokenId,
        amount: u64,
        handle: ScheduleHandle,
    },
    ScheduleFinalized {
        split_id: SplitId,
        token: TokenId,
        amount: u64,
        handle: ScheduleHandle,
    },
    ScheduleReleased {
        split_id: SplitId,
        token: TokenId,
        amount: u64,
        handle: ScheduleHandle,
    },
    AgreementRecorded {
        split_id: SplitId,
        reference_id: String,
    },
}

impl LedgerEvent {
    /// The `event_type` tag of this event.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::SplitCreated { .. } => "split_created",
            LedgerEvent::Deposit { .. } => "deposit",
            LedgerEvent::HbarAllowanceConfigured { .. } => "hbar_allowance_configured",
            LedgerEvent::DistributionExecuted { .. } => "distribution_executed",
            LedgerEvent::ScheduleReserved { .. } => "schedule_reserved",
            LedgerEvent::ScheduleFinalized { .. } => "schedule_finalized",
            LedgerEvent::ScheduleReleased { .. } => "schedule_released",
            LedgerEvent::AgreementRecorded { .. } => "agreement_recorded",
        }
    }

    /// The split this event concerns.
    pub fn split_id(&self) -> &SplitId {
        match self {
            LedgerEvent::SplitCreated { split_id, .. }
            | LedgerEvent::Deposit { split_id, .. }
            | LedgerEvent::HbarAllowanceConfigured { split_id, .. }
            | LedgerEvent::DistributionExecuted { split_id, .. }
            | LedgerEvent::ScheduleReserved { split_id, .. }
            | LedgerEvent::ScheduleFinalized { split_id, .. }
            | LedgerEvent::ScheduleReleased { split_id, .. }
            | LedgerEvent::AgreementRecorded { split_id, .. } => split_id,
        }
    }
}
