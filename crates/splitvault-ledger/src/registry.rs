//! Split definitions.
//!
//! Identifiers are `derive_key("splitvault v1 split-id", creator || nonce)`
//! where `nonce` is a persisted per-creator counter incremented after every
//! successful creation. A derived identifier that already exists is a
//! conflict, never an overwrite.

use std::collections::HashMap;

use splitvault_crypto::blake3;
use splitvault_types::{AccountId, AgreementRecord, CreatorNonce, Split, SplitId};

use crate::shares::validate_weights;
use crate::{LedgerError, Result};

/// Owns every split, the creator nonces and the agreement references.
#[derive(Debug)]
pub struct SplitRegistry {
    splits: HashMap<SplitId, Split>,
    nonces: HashMap<AccountId, u64>,
    agreements: HashMap<SplitId, String>,
    max_recipients: usize,
}

/// Derive the identifier for `creator`'s split number `nonce`.
pub fn derive_split_id(creator: &AccountId, nonce: u64) -> SplitId {
    SplitId(blake3::derive_sequenced_id(
        blake3::contexts::SPLIT_ID,
        creator.as_bytes(),
        nonce,
    ))
}

/// Check a recipient/weight definition.
///
/// # Errors
///
/// - [`LedgerError::Validation`] on empty recipients, length mismatch, more
///   than `max_recipients` entries, or weights not summing to 100
pub fn validate_definition(
    recipients: &[AccountId],
    weights: &[u8],
    max_recipients: usize,
) -> Result<()> {
    if recipients.is_empty() {
        return Err(LedgerError::Validation(
            "recipients must not be empty".to_string(),
        ));
    }
    if recipients.len() != weights.len() {
        return Err(LedgerError::Validation(format!(
            "{} recipients but {} weights",
            recipients.len(),
            weights.len()
        )));
    }
    if recipients.len() > max_recipients {
        return Err(LedgerError::Validation(format!(
            "{} recipients exceeds the maximum of {max_recipients}",
            recipients.len()
        )));
    }
    validate_weights(weights)
}

impl SplitRegistry {
    pub fn new(max_recipients: usize) -> Self {
        Self {
            splits: HashMap::new(),
            nonces: HashMap::new(),
            agreements: HashMap::new(),
            max_recipients,
        }
    }

    /// Create a split owned by `creator`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] if the definition is invalid
    /// - [`LedgerError::Conflict`] if the derived identifier already exists
    pub fn create(
        &mut self,
        creator: AccountId,
        recipients: Vec<AccountId>,
        weights: Vec<u8>,
    ) -> Result<&Split> {
        validate_definition(&recipients, &weights, self.max_recipients)?;

        let nonce = self.nonces.get(&creator).copied().unwrap_or(0);
        let next_nonce = nonce.checked_add(1).ok_or(LedgerError::Overflow)?;
        let id = derive_split_id(&creator, nonce);
        if self.splits.contains_key(&id) {
            tracing::error!(split = %id, nonce, "derived split id already exists");
            return Err(LedgerError::Conflict(format!("split {id} already exists")));
        }

        self.nonces.insert(creator, next_nonce);
        let split = Split {
            id,
            owner: creator,
            recipients,
            weights,
            allowance_mode: false,
            creator_nonce: nonce,
        };

        tracing::info!(
            split = %id,
            owner = %creator,
            recipients = split.recipients.len(),
            "split created"
        );

        Ok(&*self.splits.entry(id).or_insert(split))
    }

    /// Look up a split.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::SplitNotFound`] if absent
    pub fn get(&self, id: &SplitId) -> Result<&Split> {
        self.splits.get(id).ok_or(LedgerError::SplitNotFound(*id))
    }

    /// Look up a split and require `caller` to own it.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::SplitNotFound`] if absent
    /// - [`LedgerError::Unauthorized`] if `caller` is not the owner
    pub fn require_owner(&self, id: &SplitId, caller: &AccountId) -> Result<&Split> {
        let split = self.get(id)?;
        if !split.is_owner(caller) {
            return Err(LedgerError::Unauthorized {
                caller: *caller,
                owner: split.owner,
            });
        }
        Ok(split)
    }

    /// Toggle allowance mode. Owner only.
    pub fn set_allowance_mode(
        &mut self,
        id: &SplitId,
        caller: &AccountId,
        enabled: bool,
    ) -> Result<()> {
        self.require_owner(id, caller)?;
        if let Some(split) = self.splits.get_mut(id) {
            split.allowance_mode = enabled;
        }
        tracing::info!(split = %id, enabled, "allowance mode configured");
        Ok(())
    }

    /// Attach (or overwrite) the agreement reference. Owner only.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] if `reference_id` is blank
    pub fn record_agreement(
        &mut self,
        id: &SplitId,
        caller: &AccountId,
        reference_id: String,
    ) -> Result<()> {
        self.require_owner(id, caller)?;
        if reference_id.trim().is_empty() {
            return Err(LedgerError::Validation(
                "agreement reference must not be empty".to_string(),
            ));
        }
        tracing::info!(split = %id, reference = %reference_id, "agreement recorded");
        self.agreements.insert(*id, reference_id);
        Ok(())
    }

    /// The agreement reference of a split, if one was recorded.
    pub fn agreement(&self, id: &SplitId) -> Result<Option<&str>> {
        self.get(id)?;
        Ok(self.agreements.get(id).map(String::as_str))
    }

    /// Next nonce `creator` would use.
    pub fn next_nonce(&self, creator: &AccountId) -> u64 {
        self.nonces.get(creator).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    /// Persistable parts, sorted for deterministic output.
    pub fn records(&self) -> (Vec<Split>, Vec<CreatorNonce>, Vec<AgreementRecord>) {
        let mut splits: Vec<Split> = self.splits.values().cloned().collect();
        splits.sort_by(|a, b| a.id.cmp(&b.id));

        let mut nonces: Vec<CreatorNonce> = self
            .nonces
            .iter()
            .map(|(creator, next_nonce)| CreatorNonce {
                creator: *creator,
                next_nonce: *next_nonce,
            })
            .collect();
        nonces.sort_by(|a, b| a.creator.cmp(&b.creator));

        let mut agreements: Vec<AgreementRecord> = self
            .agreements
            .iter()
            .map(|(split_id, reference_id)| AgreementRecord {
                split_id: *split_id,
                reference_id: reference_id.clone(),
            })
            .collect();
        agreements.sort_by(|a, b| a.split_id.cmp(&b.split_id));

        (splits, nonces, agreements)
    }

    /// Rebuild from persisted records.
    ///
    /// Every split is re-validated and must match the identifier derived from
    /// its owner and nonce; every nonce must be past all of its creator's splits.
    pub fn from_records(
        max_recipients: usize,
        splits: Vec<Split>,
        nonces: Vec<CreatorNonce>,
        agreements: Vec<AgreementRecord>,
    ) -> Result<Self> {
        let mut registry = Self::new(max_recipients);

        for nonce in nonces {
            registry.nonces.insert(nonce.creator, nonce.next_nonce);
        }

        for split in splits {
            // Restored data predates any tightening of max_recipients.
            validate_definition(&split.recipients, &split.weights, usize::MAX)?;
            if derive_split_id(&split.owner, split.creator_nonce) != split.id {
                return Err(LedgerError::InternalConsistency(format!(
                    "split {} does not match its derived identifier",
                    split.id
                )));
            }
            if registry.next_nonce(&split.owner) <= split.creator_nonce {
                return Err(LedgerError::InternalConsistency(format!(
                    "creator nonce for {} is behind split {}",
                    split.owner, split.id
                )));
            }
            if registry.splits.insert(split.id, split).is_some() {
                return Err(LedgerError::InternalConsistency(
                    "duplicate split record".to_string(),
                ));
            }
        }

        for agreement in agreements {
            registry.get(&agreement.split_id)?;
            registry
                .agreements
                .insert(agreement.split_id, agreement.reference_id);
        }

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(byte: u8) -> AccountId {
        AccountId([byte; 32])
    }

    fn registry_with_split() -> (SplitRegistry, SplitId) {
        let mut registry = SplitRegistry::new(10);
        let id = registry
            .create(account(1), vec![account(2), account(3)], vec![60, 40])
            .expect("create")
            .id;
        (registry, id)
    }

    #[test]
    fn test_create_valid_split() {
        let (registry, id) = registry_with_split();
        let split = registry.get(&id).expect("get");
        assert_eq!(split.owner, account(1));
        assert_eq!(split.weights, vec![60, 40]);
        assert!(!split.allowance_mode);
        assert_eq!(split.creator_nonce, 0);
        assert_eq!(registry.next_nonce(&account(1)), 1);
    }

    #[test]
    fn test_create_rejects_bad_definitions() {
        let mut registry = SplitRegistry::new(10);
        // Sum 80.
        assert!(matches!(
            registry.create(account(1), vec![account(2), account(3)], vec![50, 30]),
            Err(LedgerError::Validation(_))
        ));
        // Length mismatch.
        assert!(matches!(
            registry.create(account(1), vec![account(2)], vec![60, 40]),
            Err(LedgerError::Validation(_))
        ));
        // Empty.
        assert!(matches!(
            registry.create(account(1), vec![], vec![]),
            Err(LedgerError::Validation(_))
        ));
        // Too many recipients.
        let many: Vec<AccountId> = (0..11).map(account).collect();
        let mut weights = vec![9u8; 11];
        weights[10] = 10;
        assert!(matches!(
            registry.create(account(1), many, weights),
            Err(LedgerError::Validation(_))
        ));
        // Failed creations do not consume a nonce.
        assert_eq!(registry.next_nonce(&account(1)), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_unique_per_creator_and_nonce() {
        let mut registry = SplitRegistry::new(10);
        let a = registry
            .create(account(1), vec![account(2)], vec![100])
            .expect("first")
            .id;
        let b = registry
            .create(account(1), vec![account(2)], vec![100])
            .expect("second")
            .id;
        let c = registry
            .create(account(9), vec![account(2)], vec![100])
            .expect("other creator")
            .id;
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(registry.len(), 3);
        assert_eq!(a, derive_split_id(&account(1), 0));
        assert_eq!(b, derive_split_id(&account(1), 1));
    }

    #[test]
    fn test_derived_collision_is_conflict() {
        let (registry, _) = registry_with_split();
        let (splits, _, agreements) = registry.records();
        let mut rewound = SplitRegistry::from_records(
            10,
            splits,
            vec![CreatorNonce {
                creator: account(1),
                next_nonce: 1,
            }],
            agreements,
        )
        .expect("restore");
        // Roll the nonce back so the next derivation hits the existing id.
        rewound.nonces.insert(account(1), 0);
        assert!(matches!(
            rewound.create(account(1), vec![account(2)], vec![100]),
            Err(LedgerError::Conflict(_))
        ));
        assert_eq!(rewound.len(), 1);
    }

    #[test]
    fn test_allowance_mode_owner_only() {
        let (mut registry, id) = registry_with_split();
        assert!(matches!(
            registry.set_allowance_mode(&id, &account(2), true),
            Err(LedgerError::Unauthorized { .. })
        ));
        registry
            .set_allowance_mode(&id, &account(1), true)
            .expect("owner toggles");
        assert!(registry.get(&id).expect("get").allowance_mode);
        assert!(matches!(
            registry.set_allowance_mode(&SplitId([0; 32]), &account(1), true),
            Err(LedgerError::SplitNotFound(_))
        ));
    }

    #[test]
    fn test_agreement_last_write_wins() {
        let (mut registry, id) = registry_with_split();
        assert_eq!(registry.agreement(&id).expect("lookup"), None);
        registry
            .record_agreement(&id, &account(1), "bafy-first".to_string())
            .expect("record");
        registry
            .record_agreement(&id, &account(1), "bafy-second".to_string())
            .expect("overwrite");
        assert_eq!(registry.agreement(&id).expect("lookup"), Some("bafy-second"));
        assert!(matches!(
            registry.record_agreement(&id, &account(3), "x".to_string()),
            Err(LedgerError::Unauthorized { .. })
        ));
        assert!(matches!(
            registry.record_agreement(&id, &account(1), "  ".to_string()),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_records_round_trip() {
        let (mut registry, id) = registry_with_split();
        registry
            .record_agreement(&id, &account(1), "bafy".to_string())
            .expect("record");
        let (splits, nonces, agreements) = registry.records();
        let restored =
            SplitRegistry::from_records(10, splits, nonces, agreements).expect("restore");
        assert_eq!(restored.get(&id).expect("get"), registry.get(&id).expect("get"));
        assert_eq!(restored.agreement(&id).expect("lookup"), Some("bafy"));
        assert_eq!(restored.next_nonce(&account(1)), 1);
    }

    #[test]
    fn test_from_records_rejects_stale_nonce() {
        let (registry, _) = registry_with_split();
        let (splits, _, agreements) = registry.records();
        assert!(matches!(
            SplitRegistry::from_records(10, splits, vec![], agreements),
            Err(LedgerError::InternalConsistency(_))
        ));
    }
}
