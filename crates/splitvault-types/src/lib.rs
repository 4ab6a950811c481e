//! # splitvault-types
//!
//! Shared domain types used across the splitvault workspace: identifiers,
//! split definitions, reservations, emitted notifications and the persisted
//! ledger snapshot.

pub mod events;
pub mod ids;
pub mod snapshot;
pub mod split;

pub use events::LedgerEvent;
pub use ids::{AccountId, IdParseError, ScheduleHandle, SplitId, TokenId};
pub use snapshot::{AgreementRecord, BalanceRecord, CreatorNonce, LedgerSnapshot};
pub use split::{Reservation, ReservationState, ScheduleStatus, Split};

/// Percentage weights of a split must sum to exactly this value.
pub const PERCENT_TOTAL: u16 = 100;

/// Largest amount the settlement rail can move in one leg.
///
/// The rail expresses transfers as signed 64-bit integers, so any amount
/// above `i64::MAX` is unrepresentable.
pub const MAX_TRANSFER_AMOUNT: u64 = i64::MAX as u64;

/// Default upper bound on recipients per split.
pub const DEFAULT_MAX_RECIPIENTS: usize = 50;
