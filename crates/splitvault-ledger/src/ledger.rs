//! Custodial balance bookkeeping.
//!
//! Each (split, token) pair carries a total `balance` and a `reserved`
//! portion earmarked for pending scheduled settlements. `reserved <= balance`
//! holds at all times; every reducing operation checks it first.
//! Balances are capped at [`MAX_TRANSFER_AMOUNT`] so any balance can be paid
//! out on the rail and stored as a signed 64-bit integer.

use std::collections::HashMap;

use splitvault_types::{BalanceRecord, SplitId, TokenId, MAX_TRANSFER_AMOUNT};

use crate::{LedgerError, Result};

/// Balance and reserved amount for one (split, token) pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BalanceEntry {
    pub balance: u64,
    pub reserved: u64,
}

impl BalanceEntry {
    /// `balance - reserved`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InternalConsistency`] if `reserved > balance`
    pub fn available(&self) -> Result<u64> {
        self.balance.checked_sub(self.reserved).ok_or_else(|| {
            tracing::error!(
                balance = self.balance,
                reserved = self.reserved,
                "reserved exceeds balance"
            );
            LedgerError::InternalConsistency(format!(
                "reserved {} exceeds balance {}",
                self.reserved, self.balance
            ))
        })
    }
}

/// Per-(split, token) custodial balances.
#[derive(Debug, Default)]
pub struct LedgerStore {
    entries: HashMap<(SplitId, TokenId), BalanceEntry>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, split_id: &SplitId, token: &TokenId) -> BalanceEntry {
        self.entries
            .get(&(*split_id, *token))
            .copied()
            .unwrap_or_default()
    }

    /// Total custodial funds.
    pub fn balance_of(&self, split_id: &SplitId, token: &TokenId) -> u64 {
        self.entry(split_id, token).balance
    }

    /// Funds earmarked for pending scheduled settlements.
    pub fn reserved_of(&self, split_id: &SplitId, token: &TokenId) -> u64 {
        self.entry(split_id, token).reserved
    }

    /// `balance - reserved`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InternalConsistency`] if `reserved > balance`
    pub fn available_balance(&self, split_id: &SplitId, token: &TokenId) -> Result<u64> {
        self.entry(split_id, token).available()
    }

    /// Fail unless at least `amount` is available.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientFunds`] if `available < amount`
    pub fn ensure_available(&self, split_id: &SplitId, token: &TokenId, amount: u64) -> Result<()> {
        let available = self.available_balance(split_id, token)?;
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                available,
                required: amount,
            });
        }
        Ok(())
    }

    /// Fail if crediting `amount` would push the balance past the cap.
    pub fn ensure_creditable(&self, split_id: &SplitId, token: &TokenId, amount: u64) -> Result<()> {
        capped_add(self.entry(split_id, token).balance, amount).map(|_| ())
    }

    /// Increase the balance (deposit).
    pub fn credit(&mut self, split_id: &SplitId, token: &TokenId, amount: u64) -> Result<()> {
        let entry = self.entries.entry((*split_id, *token)).or_default();
        entry.balance = capped_add(entry.balance, amount)?;
        Ok(())
    }

    /// Decrease the balance (immediate distribution). Reserved funds are untouchable.
    pub fn debit(&mut self, split_id: &SplitId, token: &TokenId, amount: u64) -> Result<()> {
        self.ensure_available(split_id, token, amount)?;
        let entry = self.entries.entry((*split_id, *token)).or_default();
        entry.balance -= amount;
        Ok(())
    }

    /// Earmark `amount` of the available balance.
    pub fn reserve(&mut self, split_id: &SplitId, token: &TokenId, amount: u64) -> Result<()> {
        self.ensure_available(split_id, token, amount)?;
        let entry = self.entries.entry((*split_id, *token)).or_default();
        // available >= amount implies reserved + amount <= balance
        entry.reserved += amount;
        Ok(())
    }

    /// A reserved amount left custody: decrease both `reserved` and `balance`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InternalConsistency`] if either would go negative
    pub fn settle_reserved(&mut self, split_id: &SplitId, token: &TokenId, amount: u64) -> Result<()> {
        let entry = self.entry(split_id, token);
        if entry.reserved < amount || entry.balance < amount {
            return Err(LedgerError::InternalConsistency(format!(
                "cannot settle {amount}: balance {} reserved {}",
                entry.balance, entry.reserved
            )));
        }
        let slot = self.entries.entry((*split_id, *token)).or_default();
        slot.reserved -= amount;
        slot.balance -= amount;
        Ok(())
    }

    /// A reservation was abandoned: decrease `reserved` only.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InternalConsistency`] if `reserved < amount`
    pub fn release_reserved(&mut self, split_id: &SplitId, token: &TokenId, amount: u64) -> Result<()> {
        let entry = self.entry(split_id, token);
        if entry.reserved < amount {
            return Err(LedgerError::InternalConsistency(format!(
                "cannot release {amount}: reserved {}",
                entry.reserved
            )));
        }
        let slot = self.entries.entry((*split_id, *token)).or_default();
        slot.reserved -= amount;
        Ok(())
    }

    /// All non-empty entries, sorted by (split, token).
    pub fn records(&self) -> Vec<BalanceRecord> {
        let mut records: Vec<BalanceRecord> = self
            .entries
            .iter()
            .filter(|(_, e)| e.balance != 0 || e.reserved != 0)
            .map(|((split_id, token), e)| BalanceRecord {
                split_id: *split_id,
                token: *token,
                balance: e.balance,
                reserved: e.reserved,
            })
            .collect();
        records.sort_by(|a, b| (a.split_id, a.token).cmp(&(b.split_id, b.token)));
        records
    }

    /// Rebuild from persisted records, checking `reserved <= balance`.
    pub fn from_records(records: &[BalanceRecord]) -> Result<Self> {
        let mut store = Self::new();
        for record in records {
            if record.reserved > record.balance {
                return Err(LedgerError::InternalConsistency(format!(
                    "persisted balance for split {} has reserved {} > balance {}",
                    record.split_id, record.reserved, record.balance
                )));
            }
            let previous = store.entries.insert(
                (record.split_id, record.token),
                BalanceEntry {
                    balance: record.balance,
                    reserved: record.reserved,
                },
            );
            if previous.is_some() {
                return Err(LedgerError::InternalConsistency(format!(
                    "duplicate balance record for split {}",
                    record.split_id
                )));
            }
        }
        Ok(store)
    }
}

fn capped_add(balance: u64, amount: u64) -> Result<u64> {
    balance
        .checked_add(amount)
        .filter(|total| *total <= MAX_TRANSFER_AMOUNT)
        .ok_or(LedgerError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPLIT: SplitId = SplitId([1; 32]);
    const TOKEN: TokenId = TokenId([2; 32]);

    #[test]
    fn test_empty_store_reads_zero() {
        let store = LedgerStore::new();
        assert_eq!(store.balance_of(&SPLIT, &TOKEN), 0);
        assert_eq!(store.reserved_of(&SPLIT, &TOKEN), 0);
        assert_eq!(store.available_balance(&SPLIT, &TOKEN).expect("available"), 0);
    }

    #[test]
    fn test_credit_and_debit() {
        let mut store = LedgerStore::new();
        store.credit(&SPLIT, &TOKEN, 1000).expect("credit");
        store.debit(&SPLIT, &TOKEN, 400).expect("debit");
        assert_eq!(store.balance_of(&SPLIT, &TOKEN), 600);
        assert_eq!(store.reserved_of(&SPLIT, &TOKEN), 0);
    }

    #[test]
    fn test_tokens_are_independent() {
        let mut store = LedgerStore::new();
        store.credit(&SPLIT, &TOKEN, 10).expect("credit");
        store.credit(&SPLIT, &TokenId::NATIVE, 5).expect("credit");
        assert_eq!(store.balance_of(&SPLIT, &TOKEN), 10);
        assert_eq!(store.balance_of(&SPLIT, &TokenId::NATIVE), 5);
    }

    #[test]
    fn test_credit_overflow() {
        let mut store = LedgerStore::new();
        store.credit(&SPLIT, &TOKEN, MAX_TRANSFER_AMOUNT).expect("credit");
        assert_eq!(store.ensure_creditable(&SPLIT, &TOKEN, 1), Err(LedgerError::Overflow));
        assert_eq!(store.credit(&SPLIT, &TOKEN, 1), Err(LedgerError::Overflow));
        assert_eq!(store.balance_of(&SPLIT, &TOKEN), MAX_TRANSFER_AMOUNT);
    }

    #[test]
    fn test_debit_cannot_touch_reserved() {
        let mut store = LedgerStore::new();
        store.credit(&SPLIT, &TOKEN, 1000).expect("credit");
        store.reserve(&SPLIT, &TOKEN, 700).expect("reserve");
        let err = store.debit(&SPLIT, &TOKEN, 400).expect_err("over available");
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                available: 300,
                required: 400
            }
        );
        assert_eq!(store.balance_of(&SPLIT, &TOKEN), 1000);
    }

    #[test]
    fn test_reserve_then_settle() {
        let mut store = LedgerStore::new();
        store.credit(&SPLIT, &TOKEN, 600).expect("credit");
        store.reserve(&SPLIT, &TOKEN, 300).expect("reserve");
        assert_eq!(store.available_balance(&SPLIT, &TOKEN).expect("available"), 300);
        store.settle_reserved(&SPLIT, &TOKEN, 300).expect("settle");
        assert_eq!(store.balance_of(&SPLIT, &TOKEN), 300);
        assert_eq!(store.reserved_of(&SPLIT, &TOKEN), 0);
    }

    #[test]
    fn test_reserve_then_release() {
        let mut store = LedgerStore::new();
        store.credit(&SPLIT, &TOKEN, 600).expect("credit");
        store.reserve(&SPLIT, &TOKEN, 250).expect("reserve");
        store.release_reserved(&SPLIT, &TOKEN, 250).expect("release");
        assert_eq!(store.balance_of(&SPLIT, &TOKEN), 600);
        assert_eq!(store.available_balance(&SPLIT, &TOKEN).expect("available"), 600);
    }

    #[test]
    fn test_settle_more_than_reserved_is_inconsistent() {
        let mut store = LedgerStore::new();
        store.credit(&SPLIT, &TOKEN, 600).expect("credit");
        store.reserve(&SPLIT, &TOKEN, 100).expect("reserve");
        assert!(matches!(
            store.settle_reserved(&SPLIT, &TOKEN, 200),
            Err(LedgerError::InternalConsistency(_))
        ));
        assert!(matches!(
            store.release_reserved(&SPLIT, &TOKEN, 200),
            Err(LedgerError::InternalConsistency(_))
        ));
        assert_eq!(store.reserved_of(&SPLIT, &TOKEN), 100);
    }

    #[test]
    fn test_available_detects_corruption() {
        let entry = BalanceEntry {
            balance: 5,
            reserved: 6,
        };
        assert!(matches!(
            entry.available(),
            Err(LedgerError::InternalConsistency(_))
        ));
    }

    #[test]
    fn test_records_round_trip() {
        let mut store = LedgerStore::new();
        store.credit(&SPLIT, &TOKEN, 600).expect("credit");
        store.reserve(&SPLIT, &TOKEN, 250).expect("reserve");
        let records = store.records();
        let restored = LedgerStore::from_records(&records).expect("restore");
        assert_eq!(restored.balance_of(&SPLIT, &TOKEN), 600);
        assert_eq!(restored.reserved_of(&SPLIT, &TOKEN), 250);
    }

    #[test]
    fn test_from_records_rejects_violation() {
        let bad = BalanceRecord {
            split_id: SPLIT,
            token: TOKEN,
            balance: 1,
            reserved: 2,
        };
        assert!(LedgerStore::from_records(&[bad]).is_err());
    }
}
