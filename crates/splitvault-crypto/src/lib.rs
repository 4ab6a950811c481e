//! # splitvault-crypto
//!
//! Hashing primitives for the splitvault ledger.
//!
//! Only BLAKE3 is used. Identifiers that must be collision-free (split ids,
//! sandbox schedule handles) are produced through domain-separated key
//! derivation so that different identifier families can never collide.
//!
//! ## Modules
//!
//! - [`blake3`]: Domain-separated BLAKE3 hashing and field encoding

pub mod blake3;
