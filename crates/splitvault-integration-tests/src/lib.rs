//! Integration tests for the split ledger.
//!
//! The library part only holds shared fixtures; the tests live under
//! `tests/` and exercise flows across the ledger, sandbox gateways and
//! SQLite persistence.
//!
//! ```sh
//! cargo test -p splitvault-integration-tests
//! ```

use splitvault_crypto::blake3;
use splitvault_ledger::engine::{EngineConfig, SplitEngine};
use splitvault_ledger::sandbox::{SandboxAllowances, SandboxRail, SandboxScheduler};
use splitvault_types::{AccountId, LedgerSnapshot, TokenId};

/// The engine wired to in-memory gateways.
pub type Engine = SplitEngine<SandboxRail, SandboxScheduler, SandboxAllowances>;

/// A stable account for a human-readable name.
pub fn account(name: &str) -> AccountId {
    AccountId(blake3::hash(name.as_bytes()))
}

/// A stable fungible token for a symbol.
pub fn token(symbol: &str) -> TokenId {
    TokenId(blake3::hash(symbol.as_bytes()))
}

/// The custodial account used by every fixture.
pub fn custodian() -> AccountId {
    account("custodian")
}

/// A fresh engine with default sandbox gateways.
pub fn engine() -> Engine {
    SplitEngine::new(
        EngineConfig::new(custodian()),
        SandboxRail::new(),
        SandboxScheduler::default(),
        SandboxAllowances::new(),
    )
}

/// Rebuild an engine from a snapshot with fresh sandbox gateways, the way
/// the daemon does after a restart.
pub fn restore(snapshot: LedgerSnapshot) -> splitvault_ledger::Result<Engine> {
    let mut scheduler = SandboxScheduler::default();
    scheduler.retire_handles(snapshot.reservations.iter().map(|r| r.handle));
    SplitEngine::restore(
        EngineConfig::new(custodian()),
        snapshot,
        SandboxRail::new(),
        scheduler,
        SandboxAllowances::new(),
    )
}
