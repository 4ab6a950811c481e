//! Domain-separated BLAKE3 hashing.
//!
//! ## Modes
//!
//! - [`hash`]: Pure hashing
//! - [`derive_key`]: Key derivation, used to derive opaque 256-bit identifiers
//!
//! Multi-part inputs are length-prefixed with [`encode_multi_field`] before
//! hashing so that `("ab", "c")` and `("a", "bc")` never produce the same digest.

/// Registered BLAKE3 context strings.
pub mod contexts {
    /// Split identifiers: `derive_key(SPLIT_ID, creator || nonce)`.
    pub const SPLIT_ID: &str = "splitvault v1 split-id";
    /// Sandbox scheduler handles: `derive_key(SCHEDULE_HANDLE, submitter || seq)`.
    pub const SCHEDULE_HANDLE: &str = "splitvault v1 schedule-handle";
    /// Default custodial account derivation.
    pub const CUSTODIAN_ACCOUNT: &str = "splitvault v1 custodian-account";

    /// All registered context strings.
    pub const ALL_CONTEXTS: &[&str] = &[SPLIT_ID, SCHEDULE_HANDLE, CUSTODIAN_ACCOUNT];
}

pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// BLAKE3 `derive_key` under one of the [`contexts`].
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    debug_assert!(is_registered_context(context), "unregistered context: {context}");
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}

pub fn is_registered_context(context: &str) -> bool {
    contexts::ALL_CONTEXTS.contains(&context)
}

/// Encode multiple fields as `len_le32 || field` pairs.
pub fn encode_multi_field(fields: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut output = Vec::with_capacity(total_len);
    for field in fields {
        output.extend_from_slice(&(field.len() as u32).to_le_bytes());
        output.extend_from_slice(field);
    }
    output
}

/// Derive an identifier from an owner key and a monotonic counter.
///
/// Equivalent to `derive_key(context, encode_multi_field([owner, counter_le]))`.
pub fn derive_sequenced_id(context: &str, owner: &[u8], counter: u64) -> [u8; 32] {
    let counter_bytes = counter.to_le_bytes();
    let fields = encode_multi_field(&[owner, &counter_bytes]);
    derive_key(context, &fields)
}
