//! Full ledger state as persisted between daemon runs.

use serde::{Deserialize, Serialize};

use crate::{AccountId, Reservation, Split, SplitId, TokenId};

/// Custodial balance bookkeeping for one (split, token) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub split_id: SplitId,
    pub token: TokenId,
    pub balance: u64,
    pub reserved: u64,
}

/// Next unused split nonce for a creator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorNonce {
    pub creator: AccountId,
    pub next_nonce: u64,
}

/// Off-chain agreement reference attached to a split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementRecord {
    pub split_id: SplitId,
    pub reference_id: String,
}

/// Everything the ledger engine owns, in deterministic order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub splits: Vec<Split>,
    pub nonces: Vec<CreatorNonce>,
    pub balances: Vec<BalanceRecord>,
    pub reservations: Vec<Reservation>,
    pub agreements: Vec<AgreementRecord>,
}

impl LedgerSnapshot {
    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
            && self.nonces.is_empty()
            && self.balances.is_empty()
            && self.reservations.is_empty()
            && self.agreements.is_empty()
    }
}
