//! Scheduled-distribution reservations.
//!
//! ```text
//!            finalize (status Executed)
//!   Active ────────────────────────────▶ Finalized
//!     │
//!     └──────────────────────────────▶ Released
//!            release (status Deleted | Invalid)
//! ```
//!
//! Confirmation is pulled, not pushed: a reservation stays `Active` until
//! someone polls the scheduler through finalize or release. A reservation
//! nobody polls stays `Active` indefinitely, and one whose status query keeps
//! failing (`Unknown`) cannot leave `Active` at all.

use std::collections::HashMap;

use splitvault_types::{Reservation, ReservationState, ScheduleHandle, ScheduleStatus, SplitId, TokenId};

use crate::{LedgerError, Result};

/// The terminal transition a caller is asking for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Finalize,
    Release,
}

impl Transition {
    /// The state a successful transition ends in.
    pub fn target(&self) -> ReservationState {
        match self {
            Transition::Finalize => ReservationState::Finalized,
            Transition::Release => ReservationState::Released,
        }
    }
}

/// What to do with a reservation given the scheduler's status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollDecision {
    /// Apply the requested transition.
    Apply,
    /// Schedule still pending; nothing to do yet.
    Wait,
    /// The status does not permit the transition.
    Reject(String),
}

/// Decide whether `transition` may proceed under external `status`.
///
/// Unknown always blocks: an ambiguous answer must never move funds.
pub fn decide(transition: Transition, status: ScheduleStatus) -> PollDecision {
    match (transition, status) {
        (_, ScheduleStatus::Unknown) => PollDecision::Reject(
            "scheduler status unknown; transition blocked until the status query succeeds"
                .to_string(),
        ),
        (_, ScheduleStatus::Pending) => PollDecision::Wait,
        (Transition::Finalize, ScheduleStatus::Executed) => PollDecision::Apply,
        (Transition::Release, ScheduleStatus::Deleted | ScheduleStatus::Invalid) => {
            PollDecision::Apply
        }
        (Transition::Finalize, other) => {
            PollDecision::Reject(format!("cannot finalize: schedule is {other:?}"))
        }
        (Transition::Release, other) => {
            PollDecision::Reject(format!("cannot release: schedule is {other:?}"))
        }
    }
}

/// Tracks active reservations keyed by scheduler handle.
#[derive(Debug, Default)]
pub struct ReservationManager {
    active: HashMap<ScheduleHandle, Reservation>,
}

impl ReservationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `handle` is already tracked.
    pub fn contains(&self, handle: &ScheduleHandle) -> bool {
        self.active.contains_key(handle)
    }

    /// Open an `Active` reservation.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Conflict`] if `handle` is already tracked
    pub fn open(
        &mut self,
        handle: ScheduleHandle,
        split_id: SplitId,
        token: TokenId,
        amount: u64,
    ) -> Result<&Reservation> {
        if self.contains(&handle) {
            return Err(LedgerError::Conflict(format!(
                "schedule handle {handle} is already tracked"
            )));
        }
        let reservation = Reservation {
            handle,
            split_id,
            token,
            amount,
            state: ReservationState::Active,
        };
        Ok(&*self.active.entry(handle).or_insert(reservation))
    }

    /// Drop a reservation without a transition, undoing an [`open`](Self::open)
    /// whose companion balance change failed.
    pub fn discard(&mut self, handle: &ScheduleHandle) -> Option<Reservation> {
        self.active.remove(handle)
    }

    /// Look up a reservation.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ReservationNotFound`] if `handle` is not tracked
    pub fn get(&self, handle: &ScheduleHandle) -> Result<&Reservation> {
        self.active
            .get(handle)
            .ok_or(LedgerError::ReservationNotFound(*handle))
    }

    /// Look up a reservation that must be `Active`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ReservationState`] if no active reservation exists
    pub fn require_active(&self, handle: &ScheduleHandle) -> Result<&Reservation> {
        match self.active.get(handle) {
            Some(r) if r.state == ReservationState::Active => Ok(r),
            _ => Err(LedgerError::ReservationState(format!(
                "no active reservation for handle {handle}"
            ))),
        }
    }

    /// Move an active reservation to its terminal state and discard it.
    ///
    /// Returns the reservation as it was at the moment of transition.
    pub fn close(&mut self, handle: &ScheduleHandle, transition: Transition) -> Result<Reservation> {
        self.require_active(handle)?;
        let mut reservation = self
            .active
            .remove(handle)
            .ok_or(LedgerError::ReservationNotFound(*handle))?;
        reservation.state = transition.target();
        Ok(reservation)
    }

    /// Active reservations, optionally for one split, sorted by handle.
    pub fn list(&self, split_id: Option<&SplitId>) -> Vec<Reservation> {
        let mut out: Vec<Reservation> = self
            .active
            .values()
            .filter(|r| split_id.map_or(true, |id| r.split_id == *id))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.handle.cmp(&b.handle));
        out
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Rebuild from persisted records; only `Active` reservations are valid.
    pub fn from_records(records: Vec<Reservation>) -> Result<Self> {
        let mut manager = Self::new();
        for record in records {
            if record.state != ReservationState::Active {
                return Err(LedgerError::InternalConsistency(format!(
                    "persisted reservation {} is {:?}",
                    record.handle, record.state
                )));
            }
            if manager.active.insert(record.handle, record).is_some() {
                return Err(LedgerError::InternalConsistency(
                    "duplicate reservation record".to_string(),
                ));
            }
        }
        Ok(manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPLIT: SplitId = SplitId([1; 32]);
    const TOKEN: TokenId = TokenId([2; 32]);

    fn handle(byte: u8) -> ScheduleHandle {
        ScheduleHandle([byte; 32])
    }

    #[test]
    fn test_discard_undoes_open() {
        let mut manager = ReservationManager::new();
        manager.open(handle(1), SPLIT, TOKEN, 50).expect("open");
        assert_eq!(manager.discard(&handle(1)).expect("discarded").amount, 50);
        assert!(!manager.contains(&handle(1)));
        assert!(manager.discard(&handle(1)).is_none());
        manager.open(handle(1), SPLIT, TOKEN, 60).expect("reopen");
    }

    #[test]
    fn test_decision_table() {
        use ScheduleStatus::*;
        assert_eq!(decide(Transition::Finalize, Executed), PollDecision::Apply);
        assert_eq!(decide(Transition::Finalize, Pending), PollDecision::Wait);
        assert!(matches!(decide(Transition::Finalize, Deleted), PollDecision::Reject(_)));
        assert!(matches!(decide(Transition::Finalize, Invalid), PollDecision::Reject(_)));
        assert!(matches!(decide(Transition::Finalize, Unknown), PollDecision::Reject(_)));

        assert_eq!(decide(Transition::Release, Deleted), PollDecision::Apply);
        assert_eq!(decide(Transition::Release, Invalid), PollDecision::Apply);
        assert_eq!(decide(Transition::Release, Pending), PollDecision::Wait);
        assert!(matches!(decide(Transition::Release, Executed), PollDecision::Reject(_)));
        assert!(matches!(decide(Transition::Release, Unknown), PollDecision::Reject(_)));
    }

    #[test]
    fn test_open_and_close() {
        let mut manager = ReservationManager::new();
        manager.open(handle(1), SPLIT, TOKEN, 300).expect("open");
        assert_eq!(manager.get(&handle(1)).expect("get").state, ReservationState::Active);

        let closed = manager.close(&handle(1), Transition::Finalize).expect("close");
        assert_eq!(closed.state, ReservationState::Finalized);
        assert_eq!(closed.amount, 300);
        assert!(manager.is_empty());
        assert!(matches!(
            manager.get(&handle(1)),
            Err(LedgerError::ReservationNotFound(_))
        ));
    }

    #[test]
    fn test_terminal_only_once() {
        let mut manager = ReservationManager::new();
        manager.open(handle(1), SPLIT, TOKEN, 300).expect("open");
        manager.close(&handle(1), Transition::Release).expect("release");
        assert!(matches!(
            manager.close(&handle(1), Transition::Finalize),
            Err(LedgerError::ReservationState(_))
        ));
    }

    #[test]
    fn test_duplicate_handle_conflicts() {
        let mut manager = ReservationManager::new();
        manager.open(handle(1), SPLIT, TOKEN, 300).expect("open");
        assert!(matches!(
            manager.open(handle(1), SPLIT, TOKEN, 5),
            Err(LedgerError::Conflict(_))
        ));
        assert_eq!(manager.get(&handle(1)).expect("get").amount, 300);
    }

    #[test]
    fn test_list_filters_by_split() {
        let mut manager = ReservationManager::new();
        manager.open(handle(2), SPLIT, TOKEN, 1).expect("open");
        manager.open(handle(1), SPLIT, TOKEN, 2).expect("open");
        manager.open(handle(3), SplitId([9; 32]), TOKEN, 3).expect("open");

        let all = manager.list(None);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].handle, handle(1));

        let mine = manager.list(Some(&SPLIT));
        assert_eq!(mine.len(), 2);
    }

    #[test]
    fn test_from_records_rejects_terminal() {
        let record = Reservation {
            handle: handle(1),
            split_id: SPLIT,
            token: TOKEN,
            amount: 1,
            state: ReservationState::Finalized,
        };
        assert!(ReservationManager::from_records(vec![record]).is_err());
    }
}
