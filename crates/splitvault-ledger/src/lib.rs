//! # splitvault-ledger
//!
//! Custodial ledger and reservation engine for revenue splits.
//!
//! A split owner defines recipients and percentage weights; inbound funds
//! accumulate in a custodial balance per (split, token). Funds leave custody
//! through an immediate batched transfer, through a scheduled transfer that
//! is reserved locally until the external scheduler confirms it, or (for the
//! native currency) directly from an allowance the owner granted.
//!
//! Every operation that calls an external gateway applies its local mutation
//! only after the gateway reports success.
//!
//! ## Modules
//!
//! - [`shares`]: Proportional share computation with exact remainder handling
//! - [`ledger`]: Per-(split, token) balance and reserved bookkeeping
//! - [`registry`]: Split definitions, identifier derivation, agreements
//! - [`reservations`]: Scheduled-distribution reservation state machine
//! - [`gateway`]: Settlement, schedule and allowance gateway traits
//! - [`sandbox`]: In-memory gateway implementations
//! - [`engine`]: [`engine::SplitEngine`], the composition root

pub mod engine;
pub mod gateway;
pub mod ledger;
pub mod registry;
pub mod reservations;
pub mod sandbox;
pub mod shares;

use splitvault_types::{AccountId, ScheduleHandle, SplitId};

use crate::gateway::ResponseCode;

/// Error types for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Malformed input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown split.
    #[error("split not found: {0}")]
    SplitNotFound(SplitId),

    /// Unknown reservation handle.
    #[error("reservation not found: {0}")]
    ReservationNotFound(ScheduleHandle),

    /// Caller is not the split owner.
    #[error("caller {caller} is not the owner {owner}")]
    Unauthorized {
        /// The rejected caller.
        caller: AccountId,
        /// The split owner.
        owner: AccountId,
    },

    /// Available balance or allowance too low.
    #[error("insufficient funds: have {available}, need {required}")]
    InsufficientFunds {
        /// Amount available to the operation.
        available: u64,
        /// Amount requested.
        required: u64,
    },

    /// Amount outside the rail's representable range.
    #[error("amount exceeds the settlement rail's representable range")]
    Overflow,

    /// The settlement rail rejected a transfer.
    #[error("settlement rail returned {0}")]
    ExternalRail(ResponseCode),

    /// The scheduler rejected a submission or authorization.
    #[error("scheduler returned {0}")]
    ExternalSchedule(ResponseCode),

    /// The allowance query failed.
    #[error("allowance service returned {0}")]
    ExternalAllowance(ResponseCode),

    /// Reservation not active, or external status does not permit the transition.
    #[error("reservation state: {0}")]
    ReservationState(String),

    /// An identifier or handle is already in use.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A ledger invariant was violated.
    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),
}

/// Stable category names for [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Authorization,
    InsufficientFunds,
    Overflow,
    ExternalRail,
    ExternalSchedule,
    ExternalAllowance,
    ReservationState,
    Conflict,
    InternalConsistency,
}

impl LedgerError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::SplitNotFound(_) | LedgerError::ReservationNotFound(_) => {
                ErrorKind::NotFound
            }
            LedgerError::Unauthorized { .. } => ErrorKind::Authorization,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::Overflow => ErrorKind::Overflow,
            LedgerError::ExternalRail(_) => ErrorKind::ExternalRail,
            LedgerError::ExternalSchedule(_) => ErrorKind::ExternalSchedule,
            LedgerError::ExternalAllowance(_) => ErrorKind::ExternalAllowance,
            LedgerError::ReservationState(_) => ErrorKind::ReservationState,
            LedgerError::Conflict(_) => ErrorKind::Conflict,
            LedgerError::InternalConsistency(_) => ErrorKind::InternalConsistency,
        }
    }
}

impl ErrorKind {
    /// Upper snake case name, e.g. `INSUFFICIENT_FUNDS`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Authorization => "NOT_OWNER",
            ErrorKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorKind::Overflow => "OVERFLOW",
            ErrorKind::ExternalRail => "EXTERNAL_RAIL",
            ErrorKind::ExternalSchedule => "EXTERNAL_SCHEDULE",
            ErrorKind::ExternalAllowance => "EXTERNAL_ALLOWANCE",
            ErrorKind::ReservationState => "RESERVATION_STATE",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::InternalConsistency => "INTERNAL_CONSISTENCY",
        }
    }
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            LedgerError::SplitNotFound(SplitId([0; 32])).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            LedgerError::ReservationNotFound(ScheduleHandle([0; 32])).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(LedgerError::Overflow.kind().as_str(), "OVERFLOW");
        assert_eq!(
            LedgerError::ExternalRail(ResponseCode::UNKNOWN).kind(),
            ErrorKind::ExternalRail
        );
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::InsufficientFunds {
            available: 50,
            required: 100,
        };
        assert_eq!(err.to_string(), "insufficient funds: have 50, need 100");
    }
}
