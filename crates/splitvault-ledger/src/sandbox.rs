//! In-memory gateway implementations.
//!
//! These stand in for the real settlement rail, scheduler and allowance
//! service in local daemons and tests. They record what they were asked to
//! do and can be told to fail the next call with a given code.

use std::collections::{HashMap, HashSet, VecDeque};

use splitvault_crypto::blake3;
use splitvault_types::{AccountId, ScheduleHandle, ScheduleStatus, TokenId};

use crate::gateway::{
    schedule_status_code, AllowanceGateway, ResponseCode, ScheduleGateway, SettlementGateway,
    TransferBatch, TransferLeg,
};

/// A transfer the sandbox rail accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedTransfer {
    Single {
        token: TokenId,
        from: AccountId,
        to: AccountId,
        amount: i64,
    },
    Batch(TransferBatch),
}

/// Settlement rail that accepts every transfer unless a failure is queued.
#[derive(Debug, Default)]
pub struct SandboxRail {
    transfers: Vec<RecordedTransfer>,
    failures: VecDeque<ResponseCode>,
}

impl SandboxRail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next transfer call with `code`.
    pub fn fail_next(&mut self, code: ResponseCode) {
        self.failures.push_back(code);
    }

    /// Accepted transfers, oldest first.
    pub fn transfers(&self) -> &[RecordedTransfer] {
        &self.transfers
    }

    /// The most recently accepted batch.
    pub fn last_batch(&self) -> Option<&TransferBatch> {
        self.transfers.iter().rev().find_map(|t| match t {
            RecordedTransfer::Batch(batch) => Some(batch),
            RecordedTransfer::Single { .. } => None,
        })
    }
}

impl SettlementGateway for SandboxRail {
    fn transfer_single(
        &mut self,
        token: TokenId,
        from: AccountId,
        to: AccountId,
        amount: i64,
    ) -> ResponseCode {
        if let Some(code) = self.failures.pop_front() {
            return code;
        }
        self.transfers.push(RecordedTransfer::Single {
            token,
            from,
            to,
            amount,
        });
        ResponseCode::SUCCESS
    }

    fn transfer_batch(&mut self, batch: &TransferBatch) -> ResponseCode {
        if let Some(code) = self.failures.pop_front() {
            return code;
        }
        if !batch.is_balanced() {
            return ResponseCode::INSUFFICIENT_ACCOUNT_BALANCE;
        }
        self.transfers.push(RecordedTransfer::Batch(batch.clone()));
        ResponseCode::SUCCESS
    }
}

/// A schedule held by [`SandboxScheduler`].
#[derive(Clone, Debug)]
pub struct SandboxSchedule {
    pub payload: TransferBatch,
    pub submitter: AccountId,
    pub authorized: bool,
    pub status: ScheduleStatus,
}

/// Scheduler that never executes anything on its own.
///
/// Tests and dev tooling drive the status with [`SandboxScheduler::set_status`].
#[derive(Debug)]
pub struct SandboxScheduler {
    sequence: u64,
    schedules: HashMap<ScheduleHandle, SandboxSchedule>,
    retired: HashSet<ScheduleHandle>,
    initial_status: ScheduleStatus,
    submit_failures: VecDeque<ResponseCode>,
    authorize_failures: VecDeque<ResponseCode>,
    reused_handles: VecDeque<ScheduleHandle>,
    query_unavailable: bool,
}

impl Default for SandboxScheduler {
    fn default() -> Self {
        Self::new(ScheduleStatus::Pending)
    }
}

impl SandboxScheduler {
    /// Create a scheduler whose new schedules start in `initial_status`.
    pub fn new(initial_status: ScheduleStatus) -> Self {
        Self {
            sequence: 0,
            schedules: HashMap::new(),
            retired: HashSet::new(),
            initial_status,
            submit_failures: VecDeque::new(),
            authorize_failures: VecDeque::new(),
            reused_handles: VecDeque::new(),
            query_unavailable: false,
        }
    }

    /// Never issue any of `handles` as a fresh handle.
    ///
    /// A restarted daemon passes the handles of its restored reservations
    /// so the restarted sequence cannot collide with them.
    pub fn retire_handles(&mut self, handles: impl IntoIterator<Item = ScheduleHandle>) {
        self.retired.extend(handles);
    }

    /// Set the status a schedule reports. Returns false for unknown handles.
    pub fn set_status(&mut self, handle: &ScheduleHandle, status: ScheduleStatus) -> bool {
        match self.schedules.get_mut(handle) {
            Some(schedule) => {
                schedule.status = status;
                true
            }
            None => false,
        }
    }

    /// Fail the next submission with `code`.
    pub fn fail_next_submit(&mut self, code: ResponseCode) {
        self.submit_failures.push_back(code);
    }

    /// Fail the next authorization with `code`.
    pub fn fail_next_authorize(&mut self, code: ResponseCode) {
        self.authorize_failures.push_back(code);
    }

    /// Hand out `handle` again on the next submission.
    pub fn reuse_handle_next(&mut self, handle: ScheduleHandle) {
        self.reused_handles.push_back(handle);
    }

    /// Make every status query fail.
    pub fn set_query_unavailable(&mut self, unavailable: bool) {
        self.query_unavailable = unavailable;
    }

    pub fn schedule(&self, handle: &ScheduleHandle) -> Option<&SandboxSchedule> {
        self.schedules.get(handle)
    }

    fn next_handle(&mut self, submitter: &AccountId) -> ScheduleHandle {
        if let Some(handle) = self.reused_handles.pop_front() {
            return handle;
        }
        loop {
            let handle = ScheduleHandle(blake3::derive_sequenced_id(
                blake3::contexts::SCHEDULE_HANDLE,
                submitter.as_bytes(),
                self.sequence,
            ));
            self.sequence += 1;
            if !self.schedules.contains_key(&handle) && !self.retired.contains(&handle) {
                return handle;
            }
        }
    }
}

impl ScheduleGateway for SandboxScheduler {
    fn submit(
        &mut self,
        payload: &TransferBatch,
        submitter: AccountId,
    ) -> (ResponseCode, Option<ScheduleHandle>) {
        if let Some(code) = self.submit_failures.pop_front() {
            return (code, None);
        }
        let handle = self.next_handle(&submitter);
        let initial_status = self.initial_status;
        // A reused handle keeps the schedule it already names.
        self.schedules
            .entry(handle)
            .or_insert_with(|| SandboxSchedule {
                payload: payload.clone(),
                submitter,
                authorized: false,
                status: initial_status,
            });
        (ResponseCode::SUCCESS, Some(handle))
    }

    fn authorize(&mut self, handle: ScheduleHandle) -> ResponseCode {
        if let Some(code) = self.authorize_failures.pop_front() {
            return code;
        }
        match self.schedules.get_mut(&handle) {
            Some(schedule) => {
                schedule.authorized = true;
                ResponseCode::SUCCESS
            }
            None => ResponseCode::INVALID_SCHEDULE_ID,
        }
    }

    fn query_status(&mut self, handle: ScheduleHandle) -> ResponseCode {
        if self.query_unavailable {
            return ResponseCode::UNKNOWN;
        }
        match self.schedules.get(&handle) {
            Some(schedule) => schedule_status_code(schedule.status),
            None => ResponseCode::INVALID_SCHEDULE_ID,
        }
    }
}

/// Allowance service backed by a map of grants.
#[derive(Debug, Default)]
pub struct SandboxAllowances {
    grants: HashMap<(AccountId, AccountId), u64>,
    failures: VecDeque<ResponseCode>,
}

impl SandboxAllowances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `owner` lets `spender` draw up to `amount`.
    pub fn grant(&mut self, owner: AccountId, spender: AccountId, amount: u64) {
        self.grants.insert((owner, spender), amount);
    }

    /// Fail the next query with `code`.
    pub fn fail_next(&mut self, code: ResponseCode) {
        self.failures.push_back(code);
    }

    /// Reduce a grant by the approval legs of a batch the rail accepted.
    pub fn consume(&mut self, spender: AccountId, legs: &[TransferLeg]) {
        for leg in legs.iter().filter(|l| l.is_approval) {
            if let Some(granted) = self.grants.get_mut(&(leg.account, spender)) {
                *granted = granted.saturating_sub(leg.amount.unsigned_abs());
            }
        }
    }
}

impl AllowanceGateway for SandboxAllowances {
    fn query_allowance(&mut self, owner: AccountId, spender: AccountId) -> (ResponseCode, u64) {
        if let Some(code) = self.failures.pop_front() {
            return (code, 0);
        }
        let granted = self.grants.get(&(owner, spender)).copied().unwrap_or(0);
        (ResponseCode::SUCCESS, granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(byte: u8) -> AccountId {
        AccountId([byte; 32])
    }

    fn batch() -> TransferBatch {
        TransferBatch {
            token: TokenId::NATIVE,
            debits: vec![TransferLeg {
                account: account(1),
                amount: 10,
                is_approval: false,
            }],
            credits: vec![TransferLeg {
                account: account(2),
                amount: 10,
                is_approval: false,
            }],
        }
    }

    #[test]
    fn test_rail_records_and_fails() {
        let mut rail = SandboxRail::new();
        assert!(rail.transfer_batch(&batch()).is_success());
        rail.fail_next(ResponseCode::INSUFFICIENT_ACCOUNT_BALANCE);
        assert_eq!(
            rail.transfer_single(TokenId::NATIVE, account(1), account(2), 5),
            ResponseCode::INSUFFICIENT_ACCOUNT_BALANCE
        );
        assert_eq!(rail.transfers().len(), 1);
        assert_eq!(rail.last_batch(), Some(&batch()));
    }

    #[test]
    fn test_rail_rejects_unbalanced_batch() {
        let mut rail = SandboxRail::new();
        let mut unbalanced = batch();
        unbalanced.credits[0].amount = 9;
        assert!(!rail.transfer_batch(&unbalanced).is_success());
    }

    #[test]
    fn test_scheduler_lifecycle() {
        let mut scheduler = SandboxScheduler::default();
        let (code, handle) = scheduler.submit(&batch(), account(1));
        assert!(code.is_success());
        let handle = handle.expect("handle");
        assert!(scheduler.authorize(handle).is_success());
        assert!(scheduler.schedule(&handle).expect("schedule").authorized);
        assert_eq!(scheduler.query_status(handle), ResponseCode::SUCCESS);

        assert!(scheduler.set_status(&handle, ScheduleStatus::Executed));
        assert_eq!(
            scheduler.query_status(handle),
            ResponseCode::SCHEDULE_ALREADY_EXECUTED
        );

        scheduler.set_query_unavailable(true);
        assert_eq!(scheduler.query_status(handle), ResponseCode::UNKNOWN);
    }

    #[test]
    fn test_scheduler_handles_are_distinct() {
        let mut scheduler = SandboxScheduler::default();
        let (_, a) = scheduler.submit(&batch(), account(1));
        let (_, b) = scheduler.submit(&batch(), account(1));
        assert_ne!(a, b);
    }

    #[test]
    fn test_scheduler_reuse_and_failures() {
        let mut scheduler = SandboxScheduler::default();
        let (_, first) = scheduler.submit(&batch(), account(1));
        let first = first.expect("handle");
        scheduler.reuse_handle_next(first);
        let (_, again) = scheduler.submit(&batch(), account(1));
        assert_eq!(again, Some(first));

        scheduler.fail_next_submit(ResponseCode::UNKNOWN);
        assert_eq!(scheduler.submit(&batch(), account(1)), (ResponseCode::UNKNOWN, None));

        scheduler.fail_next_authorize(ResponseCode(7));
        assert_eq!(scheduler.authorize(first), ResponseCode(7));
        assert_eq!(
            scheduler.authorize(ScheduleHandle([0xee; 32])),
            ResponseCode::INVALID_SCHEDULE_ID
        );
    }

    #[test]
    fn test_reused_handle_keeps_existing_schedule() {
        let mut scheduler = SandboxScheduler::default();
        let (_, first) = scheduler.submit(&batch(), account(1));
        let first = first.expect("handle");
        assert!(scheduler.set_status(&first, ScheduleStatus::Executed));

        scheduler.reuse_handle_next(first);
        let mut other = batch();
        other.debits[0].amount = 99;
        scheduler.submit(&other, account(2));

        let kept = scheduler.schedule(&first).expect("schedule");
        assert_eq!(kept.status, ScheduleStatus::Executed);
        assert_eq!(kept.submitter, account(1));
        assert_eq!(kept.payload, batch());
    }

    #[test]
    fn test_retired_handles_are_skipped() {
        let mut earlier = SandboxScheduler::default();
        let (_, a) = earlier.submit(&batch(), account(1));
        let (_, b) = earlier.submit(&batch(), account(1));
        let (a, b) = (a.expect("a"), b.expect("b"));

        let mut restarted = SandboxScheduler::default();
        restarted.retire_handles([a, b]);
        let (code, fresh) = restarted.submit(&batch(), account(1));
        assert!(code.is_success());
        let fresh = fresh.expect("fresh");
        assert_ne!(fresh, a);
        assert_ne!(fresh, b);
    }

    #[test]
    fn test_allowances() {
        let mut allowances = SandboxAllowances::new();
        assert_eq!(
            allowances.query_allowance(account(1), account(9)),
            (ResponseCode::SUCCESS, 0)
        );
        allowances.grant(account(1), account(9), 500);
        assert_eq!(
            allowances.query_allowance(account(1), account(9)),
            (ResponseCode::SUCCESS, 500)
        );
        allowances.consume(
            account(9),
            &[TransferLeg {
                account: account(1),
                amount: 200,
                is_approval: true,
            }],
        );
        assert_eq!(allowances.query_allowance(account(1), account(9)).1, 300);

        allowances.fail_next(ResponseCode::UNKNOWN);
        assert_eq!(
            allowances.query_allowance(account(1), account(9)),
            (ResponseCode::UNKNOWN, 0)
        );
    }
}
