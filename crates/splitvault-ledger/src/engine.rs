//! The ledger engine: public operations sequenced across the registry,
//! balances, reservations and external gateways.
//!
//! Every mutating operation follows the same discipline:
//!
//! 1. validate inputs and local preconditions (fail fast, no external call)
//! 2. call the gateway(s)
//! 3. commit the local mutation only after every gateway call succeeded
//!
//! Step 3 re-checks the invariants it relies on. Under the engine's
//! exclusive `&mut self` access it cannot fail; if it ever does, the
//! external effect has already happened and the local ledger has diverged,
//! which is reported as [`LedgerError::InternalConsistency`] and logged at
//! error level.
//!
//! Notifications produced by committed operations are queued and handed
//! out by [`SplitEngine::drain_events`].

use std::collections::HashMap;

use splitvault_types::{
    AccountId, LedgerEvent, LedgerSnapshot, Reservation, ScheduleHandle, Split, SplitId, TokenId,
    DEFAULT_MAX_RECIPIENTS,
};
use tracing::{debug, error, info, warn};

use crate::gateway::{
    interpret_schedule_status, AllowanceGateway, ScheduleGateway, SettlementGateway,
    TransferBatch, TransferLeg,
};
use crate::ledger::LedgerStore;
use crate::registry::SplitRegistry;
use crate::reservations::{decide, PollDecision, ReservationManager, Transition};
use crate::shares::compute_shares;
use crate::{LedgerError, Result};

/// Static engine settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// The account holding custodial funds for every split.
    pub custodian: AccountId,
    /// Upper bound on recipients per split.
    pub max_recipients: usize,
}

impl EngineConfig {
    pub fn new(custodian: AccountId) -> Self {
        Self {
            custodian,
            max_recipients: DEFAULT_MAX_RECIPIENTS,
        }
    }
}

/// Result of polling a scheduled distribution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The transition was applied; carries the reservation in its terminal state.
    Applied(Reservation),
    /// The schedule is still pending. Nothing changed.
    StillPending,
}

/// Revenue split ledger bound to three external gateways.
pub struct SplitEngine<R, S, A> {
    config: EngineConfig,
    registry: SplitRegistry,
    ledger: LedgerStore,
    reservations: ReservationManager,
    rail: R,
    scheduler: S,
    allowances: A,
    outbox: Vec<LedgerEvent>,
}

impl<R, S, A> SplitEngine<R, S, A>
where
    R: SettlementGateway,
    S: ScheduleGateway,
    A: AllowanceGateway,
{
    /// Create an empty engine.
    pub fn new(config: EngineConfig, rail: R, scheduler: S, allowances: A) -> Self {
        Self {
            registry: SplitRegistry::new(config.max_recipients),
            ledger: LedgerStore::new(),
            reservations: ReservationManager::new(),
            config,
            rail,
            scheduler,
            allowances,
            outbox: Vec::new(),
        }
    }

    /// Rebuild an engine from a persisted snapshot.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InternalConsistency`] or [`LedgerError::Validation`]
    ///   if the snapshot violates a ledger invariant
    pub fn restore(
        config: EngineConfig,
        snapshot: LedgerSnapshot,
        rail: R,
        scheduler: S,
        allowances: A,
    ) -> Result<Self> {
        let registry = SplitRegistry::from_records(
            config.max_recipients,
            snapshot.splits,
            snapshot.nonces,
            snapshot.agreements,
        )?;
        let ledger = LedgerStore::from_records(&snapshot.balances)?;
        let reservations = ReservationManager::from_records(snapshot.reservations)?;

        for record in &snapshot.balances {
            registry.get(&record.split_id)?;
        }
        // Reserved amounts must equal the sum of active reservations.
        let mut expected: HashMap<(SplitId, TokenId), u64> = HashMap::new();
        for reservation in reservations.list(None) {
            registry.get(&reservation.split_id)?;
            let slot = expected
                .entry((reservation.split_id, reservation.token))
                .or_default();
            *slot = slot
                .checked_add(reservation.amount)
                .ok_or(LedgerError::Overflow)?;
        }
        for record in &snapshot.balances {
            let reserved = expected
                .remove(&(record.split_id, record.token))
                .unwrap_or(0);
            if reserved != record.reserved {
                return Err(LedgerError::InternalConsistency(format!(
                    "split {} reserves {} but active reservations total {reserved}",
                    record.split_id, record.reserved
                )));
            }
        }
        if let Some(((split_id, _), amount)) = expected.into_iter().find(|(_, a)| *a > 0) {
            return Err(LedgerError::InternalConsistency(format!(
                "reservations for split {split_id} total {amount} with no reserved balance"
            )));
        }

        info!(
            splits = registry.len(),
            reservations = reservations.len(),
            "ledger restored"
        );

        Ok(Self {
            config,
            registry,
            ledger,
            reservations,
            rail,
            scheduler,
            allowances,
            outbox: Vec::new(),
        })
    }

    /// Snapshot of all owned state.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let (splits, nonces, agreements) = self.registry.records();
        LedgerSnapshot {
            splits,
            nonces,
            balances: self.ledger.records(),
            reservations: self.reservations.list(None),
            agreements,
        }
    }

    /// Take all notifications produced since the last call.
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rail(&self) -> &R {
        &self.rail
    }

    pub fn rail_mut(&mut self) -> &mut R {
        &mut self.rail
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn allowances_mut(&mut self) -> &mut A {
        &mut self.allowances
    }

    // ---------------------------------------------------------------
    // Registry
    // ---------------------------------------------------------------

    /// Create a split owned by `caller`.
    pub fn create_split(
        &mut self,
        caller: AccountId,
        recipients: Vec<AccountId>,
        weights: Vec<u8>,
    ) -> Result<SplitId> {
        let split = self.registry.create(caller, recipients, weights)?;
        let event = LedgerEvent::SplitCreated {
            split_id: split.id,
            owner: split.owner,
            recipients: split.recipients.clone(),
            weights: split.weights.clone(),
        };
        let id = split.id;
        self.outbox.push(event);
        Ok(id)
    }

    /// Enable or disable allowance mode. Owner only.
    pub fn configure_hbar_allowance(
        &mut self,
        caller: AccountId,
        split_id: SplitId,
        enabled: bool,
    ) -> Result<()> {
        self.registry.set_allowance_mode(&split_id, &caller, enabled)?;
        self.outbox
            .push(LedgerEvent::HbarAllowanceConfigured { split_id, enabled });
        Ok(())
    }

    /// Attach an off-chain agreement reference. Owner only; last write wins.
    pub fn record_agreement(
        &mut self,
        caller: AccountId,
        split_id: SplitId,
        reference_id: String,
    ) -> Result<()> {
        self.registry
            .record_agreement(&split_id, &caller, reference_id.clone())?;
        self.outbox.push(LedgerEvent::AgreementRecorded {
            split_id,
            reference_id,
        });
        Ok(())
    }

    // ---------------------------------------------------------------
    // Deposits
    // ---------------------------------------------------------------

    /// Pull `amount` of a fungible token from `caller` into custody.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] on a zero amount or the native sentinel
    /// - [`LedgerError::SplitNotFound`] if the split is absent
    /// - [`LedgerError::Overflow`] if the amount or resulting balance is unrepresentable
    /// - [`LedgerError::ExternalRail`] if the pull fails
    pub fn deposit_token(
        &mut self,
        caller: AccountId,
        split_id: SplitId,
        token: TokenId,
        amount: u64,
    ) -> Result<()> {
        require_positive(amount)?;
        if token.is_native() {
            return Err(LedgerError::Validation(
                "native currency is deposited with deposit_native".to_string(),
            ));
        }
        self.registry.get(&split_id)?;
        let rail_amount = to_rail_amount(amount)?;
        self.ledger.ensure_creditable(&split_id, &token, amount)?;

        let code = self
            .rail
            .transfer_single(token, caller, self.config.custodian, rail_amount);
        if !code.is_success() {
            warn!(split = %split_id, token = %token, amount, %code, "deposit pull rejected");
            return Err(LedgerError::ExternalRail(code));
        }

        self.commit(|engine| engine.ledger.credit(&split_id, &token, amount))?;
        info!(split = %split_id, token = %token, amount, "token deposit");
        self.outbox.push(LedgerEvent::Deposit {
            split_id,
            token,
            amount,
            sender: caller,
        });
        Ok(())
    }

    /// Credit native currency that arrived with the call.
    pub fn deposit_native(&mut self, caller: AccountId, split_id: SplitId, amount: u64) -> Result<()> {
        require_positive(amount)?;
        self.registry.get(&split_id)?;
        self.ledger.credit(&split_id, &TokenId::NATIVE, amount)?;
        info!(split = %split_id, amount, "native deposit");
        self.outbox.push(LedgerEvent::Deposit {
            split_id,
            token: TokenId::NATIVE,
            amount,
            sender: caller,
        });
        Ok(())
    }

    // ---------------------------------------------------------------
    // Distribution
    // ---------------------------------------------------------------

    /// Pay `amount` out of custody to the split's recipients now.
    ///
    /// The balance is debited only after the rail accepts the batch.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] on a zero amount
    /// - [`LedgerError::InsufficientFunds`] if `amount > available`
    /// - [`LedgerError::Overflow`] if `amount` exceeds the rail bound
    /// - [`LedgerError::ExternalRail`] if the transfer fails
    pub fn distribute(
        &mut self,
        caller: AccountId,
        split_id: SplitId,
        token: TokenId,
        amount: u64,
    ) -> Result<()> {
        require_positive(amount)?;
        let split = self.registry.get(&split_id)?;
        self.ledger.ensure_available(&split_id, &token, amount)?;
        let batch = build_batch(split, token, self.config.custodian, amount, false)?;

        let code = self.rail.transfer_batch(&batch);
        if !code.is_success() {
            warn!(split = %split_id, token = %token, amount, %code, "distribution rejected by rail");
            return Err(LedgerError::ExternalRail(code));
        }

        self.commit(|engine| engine.ledger.debit(&split_id, &token, amount))?;
        info!(split = %split_id, token = %token, amount, caller = %caller, "distribution executed");
        self.outbox.push(LedgerEvent::DistributionExecuted {
            split_id,
            token,
            amount,
            from_allowance: false,
        });
        Ok(())
    }

    /// Pay `amount` of native currency straight from the owner's allowance.
    ///
    /// No custodial balance is read or written.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] on a zero amount or allowance mode disabled
    /// - [`LedgerError::Overflow`] if `amount` exceeds the rail bound
    /// - [`LedgerError::ExternalAllowance`] if the allowance query fails
    /// - [`LedgerError::InsufficientFunds`] if the granted allowance is too low
    /// - [`LedgerError::ExternalRail`] if the transfer fails
    pub fn distribute_from_hbar_allowance(
        &mut self,
        caller: AccountId,
        split_id: SplitId,
        amount: u64,
    ) -> Result<()> {
        require_positive(amount)?;
        let split = self.registry.get(&split_id)?;
        if !split.allowance_mode {
            return Err(LedgerError::Validation(format!(
                "allowance mode is disabled for split {split_id}"
            )));
        }
        let owner = split.owner;
        let batch = build_batch(split, TokenId::NATIVE, owner, amount, true)?;

        let (code, granted) = self
            .allowances
            .query_allowance(owner, self.config.custodian);
        if !code.is_success() {
            warn!(split = %split_id, %code, "allowance query failed");
            return Err(LedgerError::ExternalAllowance(code));
        }
        if granted < amount {
            return Err(LedgerError::InsufficientFunds {
                available: granted,
                required: amount,
            });
        }

        let code = self.rail.transfer_batch(&batch);
        if !code.is_success() {
            warn!(split = %split_id, amount, %code, "allowance distribution rejected by rail");
            return Err(LedgerError::ExternalRail(code));
        }

        info!(split = %split_id, amount, caller = %caller, "allowance distribution executed");
        self.outbox.push(LedgerEvent::DistributionExecuted {
            split_id,
            token: TokenId::NATIVE,
            amount,
            from_allowance: true,
        });
        Ok(())
    }

    // ---------------------------------------------------------------
    // Scheduled distribution
    // ---------------------------------------------------------------

    /// Submit a deferred distribution and reserve `amount` until it settles.
    ///
    /// Funds stay in custody (balance unchanged) but are no longer available.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] on a zero amount, or native currency
    ///   while allowance mode is enabled
    /// - [`LedgerError::InsufficientFunds`] if `amount > available`
    /// - [`LedgerError::Overflow`] if `amount` exceeds the rail bound
    /// - [`LedgerError::ExternalSchedule`] if submission or authorization fails
    /// - [`LedgerError::Conflict`] if the scheduler returned a tracked handle
    pub fn schedule_distribute(
        &mut self,
        caller: AccountId,
        split_id: SplitId,
        token: TokenId,
        amount: u64,
    ) -> Result<ScheduleHandle> {
        require_positive(amount)?;
        let split = self.registry.get(&split_id)?;
        if token.is_native() && split.allowance_mode {
            return Err(LedgerError::Validation(
                "split uses allowance mode; distribute native currency from the allowance"
                    .to_string(),
            ));
        }
        self.ledger.ensure_available(&split_id, &token, amount)?;
        let batch = build_batch(split, token, self.config.custodian, amount, false)?;

        let (code, handle) = self.scheduler.submit(&batch, self.config.custodian);
        let handle = match (code.is_success(), handle) {
            (true, Some(handle)) => handle,
            _ => {
                warn!(split = %split_id, %code, "schedule submission rejected");
                return Err(LedgerError::ExternalSchedule(code));
            }
        };
        let code = self.scheduler.authorize(handle);
        if !code.is_success() {
            warn!(split = %split_id, handle = %handle, %code, "schedule authorization rejected");
            return Err(LedgerError::ExternalSchedule(code));
        }

        if self.reservations.contains(&handle) {
            error!(handle = %handle, "scheduler reused a tracked handle");
            return Err(LedgerError::Conflict(format!(
                "schedule handle {handle} is already tracked"
            )));
        }

        self.commit(|engine| engine.stage_reservation(handle, split_id, token, amount))?;

        info!(
            split = %split_id,
            token = %token,
            amount,
            handle = %handle,
            caller = %caller,
            "scheduled distribution reserved"
        );
        self.outbox.push(LedgerEvent::ScheduleReserved {
            split_id,
            token,
            amount,
            handle,
        });
        Ok(handle)
    }

    /// Settle a reservation whose schedule has executed. Owner only.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ReservationState`] if there is no active reservation
    ///   for `handle`, or the scheduler reports anything but Executed or Pending
    /// - [`LedgerError::Unauthorized`] if `caller` does not own the split
    pub fn finalize_scheduled_distribution(
        &mut self,
        caller: AccountId,
        handle: ScheduleHandle,
    ) -> Result<PollOutcome> {
        self.poll_reservation(caller, handle, Transition::Finalize)
    }

    /// Return a reservation's funds to the available balance after its
    /// schedule was deleted or invalidated. Owner only.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ReservationState`] if there is no active reservation
    ///   for `handle`, or the scheduler reports anything but Deleted, Invalid
    ///   or Pending
    /// - [`LedgerError::Unauthorized`] if `caller` does not own the split
    pub fn release_scheduled_distribution(
        &mut self,
        caller: AccountId,
        handle: ScheduleHandle,
    ) -> Result<PollOutcome> {
        self.poll_reservation(caller, handle, Transition::Release)
    }

    fn poll_reservation(
        &mut self,
        caller: AccountId,
        handle: ScheduleHandle,
        transition: Transition,
    ) -> Result<PollOutcome> {
        let reservation = self.reservations.require_active(&handle)?.clone();
        self.registry.require_owner(&reservation.split_id, &caller)?;

        let code = self.scheduler.query_status(handle);
        let status = interpret_schedule_status(code);

        match decide(transition, status) {
            PollDecision::Wait => {
                debug!(handle = %handle, ?transition, "schedule still pending");
                return Ok(PollOutcome::StillPending);
            }
            PollDecision::Reject(reason) => {
                warn!(handle = %handle, ?transition, ?status, %code, "reservation transition blocked");
                return Err(LedgerError::ReservationState(reason));
            }
            PollDecision::Apply => {}
        }

        let Reservation {
            split_id,
            token,
            amount,
            ..
        } = reservation;

        let closed = self.commit(|engine| {
            match transition {
                Transition::Finalize => engine.ledger.settle_reserved(&split_id, &token, amount)?,
                Transition::Release => engine.ledger.release_reserved(&split_id, &token, amount)?,
            }
            engine.reservations.close(&handle, transition)
        })?;

        let event = match transition {
            Transition::Finalize => LedgerEvent::ScheduleFinalized {
                split_id,
                token,
                amount,
                handle,
            },
            Transition::Release => LedgerEvent::ScheduleReleased {
                split_id,
                token,
                amount,
                handle,
            },
        };
        info!(split = %split_id, handle = %handle, amount, state = closed.state.as_str(), "reservation closed");
        self.outbox.push(event);
        Ok(PollOutcome::Applied(closed))
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub fn balance_of(&self, split_id: &SplitId, token: &TokenId) -> u64 {
        self.ledger.balance_of(split_id, token)
    }

    pub fn reserved_of(&self, split_id: &SplitId, token: &TokenId) -> u64 {
        self.ledger.reserved_of(split_id, token)
    }

    pub fn available_balance(&self, split_id: &SplitId, token: &TokenId) -> Result<u64> {
        self.ledger.available_balance(split_id, token)
    }

    pub fn split(&self, split_id: &SplitId) -> Result<&Split> {
        self.registry.get(split_id)
    }

    pub fn reservation(&self, handle: &ScheduleHandle) -> Result<&Reservation> {
        self.reservations.get(handle)
    }

    pub fn agreement(&self, split_id: &SplitId) -> Result<Option<&str>> {
        self.registry.agreement(split_id)
    }

    pub fn list_reservations(&self, split_id: Option<&SplitId>) -> Vec<Reservation> {
        self.reservations.list(split_id)
    }

    /// Apply a post-gateway mutation. A failure here means the external
    /// effect happened but the ledger could not record it.
    /// Track `handle` and earmark `amount` for it, or change nothing.
    fn stage_reservation(
        &mut self,
        handle: ScheduleHandle,
        split_id: SplitId,
        token: TokenId,
        amount: u64,
    ) -> Result<()> {
        self.reservations.open(handle, split_id, token, amount)?;
        if let Err(e) = self.ledger.reserve(&split_id, &token, amount) {
            self.reservations.discard(&handle);
            return Err(e);
        }
        Ok(())
    }

    fn commit<T>(&mut self, apply: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        apply(self).map_err(|e| {
            error!(error = %e, state_divergence = true, "local commit failed after gateway success");
            match e {
                LedgerError::InternalConsistency(_) => e,
                other => LedgerError::InternalConsistency(format!(
                    "commit failed after external success: {other}"
                )),
            }
        })
    }
}

fn require_positive(amount: u64) -> Result<()> {
    if amount == 0 {
        return Err(LedgerError::Validation("amount must be positive".to_string()));
    }
    Ok(())
}

fn to_rail_amount(amount: u64) -> Result<i64> {
    i64::try_from(amount).map_err(|_| LedgerError::Overflow)
}

/// Build the batched transfer moving `amount` from `payer` to the split's
/// recipients. Zero shares are omitted from the credit side.
fn build_batch(
    split: &Split,
    token: TokenId,
    payer: AccountId,
    amount: u64,
    is_approval: bool,
) -> Result<TransferBatch> {
    let shares = compute_shares(&split.weights, amount)?;
    let credits = split
        .recipients
        .iter()
        .zip(shares)
        .filter(|(_, share)| *share > 0)
        .map(|(account, share)| -> Result<TransferLeg> {
            Ok(TransferLeg {
                account: *account,
                amount: to_rail_amount(share)?,
                is_approval: false,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TransferBatch {
        token,
        debits: vec![TransferLeg {
            account: payer,
            amount: to_rail_amount(amount)?,
            is_approval,
        }],
        credits,
    })
}
