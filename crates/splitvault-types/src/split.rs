//! Split definitions and reservation records.

use serde::{Deserialize, Serialize};

use crate::{AccountId, ScheduleHandle, SplitId, TokenId};

/// A revenue split: ordered recipients with parallel percentage weights.
///
/// Recipients, weights and owner are fixed at creation. Only
/// `allowance_mode` can change afterwards, and only by the owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub id: SplitId,
    pub owner: AccountId,
    pub recipients: Vec<AccountId>,
    /// Percentage weight per recipient; sums to [`crate::PERCENT_TOTAL`].
    pub weights: Vec<u8>,
    /// When set, native-currency payouts are drawn from the owner's external
    /// allowance instead of the custodial balance.
    pub allowance_mode: bool,
    /// The creator nonce the identifier was derived from.
    pub creator_nonce: u64,
}

impl Split {
    /// Whether `account` owns this split.
    pub fn is_owner(&self, account: &AccountId) -> bool {
        self.owner == *account
    }
}

/// Lifecycle of a scheduled-distribution reservation.
///
/// `Active` is the only non-terminal state. A reservation moves to exactly
/// one of `Finalized` or `Released` and is then discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Active,
    Finalized,
    Released,
}

impl ReservationState {
    /// Stable lowercase name, used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Active => "active",
            ReservationState::Finalized => "finalized",
            ReservationState::Released => "released",
        }
    }

    /// Parse the name produced by [`ReservationState::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ReservationState::Active),
            "finalized" => Some(ReservationState::Finalized),
            "released" => Some(ReservationState::Released),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationState::Active)
    }
}

/// Funds earmarked for a scheduled settlement that has not been confirmed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub handle: ScheduleHandle,
    pub split_id: SplitId,
    pub token: TokenId,
    pub amount: u64,
    pub state: ReservationState,
}

/// External status of a scheduled transfer, as reported by the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Submitted, not yet executed.
    Pending,
    /// Executed; funds have left custody.
    Executed,
    /// Deleted before execution.
    Deleted,
    /// The scheduler does not recognise the handle.
    Invalid,
    /// The status query failed or returned an unmapped code.
    Unknown,
}

impl ScheduleStatus {
    /// Parse a lowercase status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ScheduleStatus::Pending),
            "executed" => Some(ScheduleStatus::Executed),
            "deleted" => Some(ScheduleStatus::Deleted),
            "invalid" => Some(ScheduleStatus::Invalid),
            "unknown" => Some(ScheduleStatus::Unknown),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservation_state_round_trip_names() {
        for state in [
            ReservationState::Active,
            ReservationState::Finalized,
            ReservationState::Released,
        ] {
            assert_eq!(ReservationState::parse(state.as_str()), Some(state));
        }
        assert_eq!(ReservationState::parse("stuck"), None);
    }

    #[test]
    fn test_only_active_is_non_terminal() {
        assert!(!ReservationState::Active.is_terminal());
        assert!(ReservationState::Finalized.is_terminal());
        assert!(ReservationState::Released.is_terminal());
    }

    #[test]
    fn test_schedule_status_serde_names() {
        let json = serde_json::to_string(&ScheduleStatus::Executed).expect("serialize");
        assert_eq!(json, "\"executed\"");
        assert_eq!(ScheduleStatus::parse("deleted"), Some(ScheduleStatus::Deleted));
    }

    #[test]
    fn test_is_owner() {
        let split = Split {
            id: SplitId([1; 32]),
            owner: AccountId([2; 32]),
            recipients: vec![AccountId([3; 32])],
            weights: vec![100],
            allowance_mode: false,
            creator_nonce: 0,
        };
        assert!(split.is_owner(&AccountId([2; 32])));
        assert!(!split.is_owner(&AccountId([3; 32])));
    }
}
