//! Interfaces to the external collaborators.
//!
//! Three services sit outside the ledger: the settlement rail that moves
//! value, the scheduler that executes a transfer later, and the allowance
//! service that reports owner-granted spend. Each is a trait with a small
//! fixed set of calls returning a [`ResponseCode`], so any backend can be
//! plugged in. All calls are synchronous.

use std::fmt;

use serde::{Deserialize, Serialize};
use splitvault_types::{AccountId, ScheduleHandle, ScheduleStatus, TokenId};

/// Status code returned by an external service.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseCode(pub i32);

impl ResponseCode {
    pub const UNKNOWN: ResponseCode = ResponseCode(21);
    pub const SUCCESS: ResponseCode = ResponseCode(22);
    pub const INSUFFICIENT_ACCOUNT_BALANCE: ResponseCode = ResponseCode(28);
    pub const INVALID_SCHEDULE_ID: ResponseCode = ResponseCode(201);
    pub const SCHEDULE_ALREADY_DELETED: ResponseCode = ResponseCode(211);
    pub const SCHEDULE_ALREADY_EXECUTED: ResponseCode = ResponseCode(212);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }

    fn name(&self) -> Option<&'static str> {
        match *self {
            Self::UNKNOWN => Some("UNKNOWN"),
            Self::SUCCESS => Some("SUCCESS"),
            Self::INSUFFICIENT_ACCOUNT_BALANCE => Some("INSUFFICIENT_ACCOUNT_BALANCE"),
            Self::INVALID_SCHEDULE_ID => Some("INVALID_SCHEDULE_ID"),
            Self::SCHEDULE_ALREADY_DELETED => Some("SCHEDULE_ALREADY_DELETED"),
            Self::SCHEDULE_ALREADY_EXECUTED => Some("SCHEDULE_ALREADY_EXECUTED"),
            _ => None,
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "code {}", self.0),
        }
    }
}

impl fmt::Debug for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Interpret a scheduler status query result.
///
/// | Code | Status |
/// |---|---|
/// | `SUCCESS` (22) | Pending |
/// | `SCHEDULE_ALREADY_EXECUTED` (212) | Executed |
/// | `SCHEDULE_ALREADY_DELETED` (211) | Deleted |
/// | `INVALID_SCHEDULE_ID` (201) | Invalid |
/// | anything else | Unknown |
pub fn interpret_schedule_status(code: ResponseCode) -> ScheduleStatus {
    match code {
        ResponseCode::SUCCESS => ScheduleStatus::Pending,
        ResponseCode::SCHEDULE_ALREADY_EXECUTED => ScheduleStatus::Executed,
        ResponseCode::SCHEDULE_ALREADY_DELETED => ScheduleStatus::Deleted,
        ResponseCode::INVALID_SCHEDULE_ID => ScheduleStatus::Invalid,
        _ => ScheduleStatus::Unknown,
    }
}

/// Inverse of [`interpret_schedule_status`], used by test doubles.
pub fn schedule_status_code(status: ScheduleStatus) -> ResponseCode {
    match status {
        ScheduleStatus::Pending => ResponseCode::SUCCESS,
        ScheduleStatus::Executed => ResponseCode::SCHEDULE_ALREADY_EXECUTED,
        ScheduleStatus::Deleted => ResponseCode::SCHEDULE_ALREADY_DELETED,
        ScheduleStatus::Invalid => ResponseCode::INVALID_SCHEDULE_ID,
        ScheduleStatus::Unknown => ResponseCode::UNKNOWN,
    }
}

/// One side of a transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLeg {
    pub account: AccountId,
    /// Signed rail unit; always positive, the side is given by the list it is in.
    pub amount: i64,
    /// Debit drawn from an allowance the account granted, not from its own spend.
    pub is_approval: bool,
}

/// A batched transfer of one token: debits balance credits exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferBatch {
    pub token: TokenId,
    pub debits: Vec<TransferLeg>,
    pub credits: Vec<TransferLeg>,
}

impl TransferBatch {
    /// Sum of debit legs, `None` on overflow.
    pub fn total_debit(&self) -> Option<i64> {
        self.debits
            .iter()
            .try_fold(0i64, |acc, leg| acc.checked_add(leg.amount))
    }

    /// Sum of credit legs, `None` on overflow.
    pub fn total_credit(&self) -> Option<i64> {
        self.credits
            .iter()
            .try_fold(0i64, |acc, leg| acc.checked_add(leg.amount))
    }

    /// Whether debits and credits balance.
    pub fn is_balanced(&self) -> bool {
        matches!(
            (self.total_debit(), self.total_credit()),
            (Some(d), Some(c)) if d == c
        )
    }
}

/// The rail that physically moves value.
pub trait SettlementGateway {
    /// Move `amount` of `token` from `from` to `to`.
    fn transfer_single(
        &mut self,
        token: TokenId,
        from: AccountId,
        to: AccountId,
        amount: i64,
    ) -> ResponseCode;

    /// Execute a batched transfer atomically.
    fn transfer_batch(&mut self, batch: &TransferBatch) -> ResponseCode;
}

/// The service that executes a submitted transfer at a later point.
///
/// There is no push channel: completion is observed by polling
/// [`ScheduleGateway::query_status`].
pub trait ScheduleGateway {
    /// Submit a transfer for deferred execution. On success returns the handle.
    fn submit(
        &mut self,
        payload: &TransferBatch,
        submitter: AccountId,
    ) -> (ResponseCode, Option<ScheduleHandle>);

    /// Authorize a submitted schedule so it can execute.
    fn authorize(&mut self, handle: ScheduleHandle) -> ResponseCode;

    /// Query the schedule. Interpret with [`interpret_schedule_status`].
    fn query_status(&mut self, handle: ScheduleHandle) -> ResponseCode;
}

/// The delegation service holding owner-granted allowances.
pub trait AllowanceGateway {
    /// Remaining native-currency allowance `owner` granted to `spender`.
    fn query_allowance(&mut self, owner: AccountId, spender: AccountId) -> (ResponseCode, u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        assert_eq!(
            interpret_schedule_status(ResponseCode::SUCCESS),
            ScheduleStatus::Pending
        );
        assert_eq!(
            interpret_schedule_status(ResponseCode(212)),
            ScheduleStatus::Executed
        );
        assert_eq!(
            interpret_schedule_status(ResponseCode(211)),
            ScheduleStatus::Deleted
        );
        assert_eq!(
            interpret_schedule_status(ResponseCode(201)),
            ScheduleStatus::Invalid
        );
        assert_eq!(
            interpret_schedule_status(ResponseCode::UNKNOWN),
            ScheduleStatus::Unknown
        );
        assert_eq!(
            interpret_schedule_status(ResponseCode(9999)),
            ScheduleStatus::Unknown
        );
    }

    #[test]
    fn test_status_code_inverse() {
        for status in [
            ScheduleStatus::Pending,
            ScheduleStatus::Executed,
            ScheduleStatus::Deleted,
            ScheduleStatus::Invalid,
            ScheduleStatus::Unknown,
        ] {
            assert_eq!(interpret_schedule_status(schedule_status_code(status)), status);
        }
    }

    #[test]
    fn test_response_code_display() {
        assert_eq!(ResponseCode::SUCCESS.to_string(), "SUCCESS (22)");
        assert_eq!(ResponseCode(7).to_string(), "code 7");
    }

    #[test]
    fn test_batch_balance() {
        let leg = |byte: u8, amount: i64| TransferLeg {
            account: AccountId([byte; 32]),
            amount,
            is_approval: false,
        };
        let batch = TransferBatch {
            token: TokenId::NATIVE,
            debits: vec![leg(1, 100)],
            credits: vec![leg(2, 60), leg(3, 40)],
        };
        assert!(batch.is_balanced());

        let overflowing = TransferBatch {
            token: TokenId::NATIVE,
            debits: vec![leg(1, i64::MAX), leg(1, 1)],
            credits: vec![],
        };
        assert_eq!(overflowing.total_debit(), None);
        assert!(!overflowing.is_balanced());
    }
}
