//! Opaque 256-bit identifiers.
//!
//! Every identifier serializes as a lowercase hex string and parses from one
//! (with or without a `0x` prefix).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

/// Failure to parse a hex identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    /// Not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Decoded to the wrong number of bytes.
    #[error("invalid identifier length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[serde_as]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(#[serde_as(as = "Hex")] pub [u8; 32]);

        impl $name {
            /// Raw identifier bytes.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Lowercase hex encoding without prefix.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Short form keeps logs readable.
                write!(f, "{}({}..)", stringify!($name), &self.to_hex()[..8])
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_hex32(s).map(Self)
            }
        }
    };
}

hex_id!(
    /// An account on the settlement rail (callers, owners, recipients, custodian).
    AccountId
);

hex_id!(
    /// A split identifier, derived from the creator and a per-creator nonce.
    SplitId
);

hex_id!(
    /// A fungible token identifier. [`TokenId::NATIVE`] denotes the native currency.
    TokenId
);

hex_id!(
    /// The handle returned by the external scheduler for a submitted transfer.
    ScheduleHandle
);

impl TokenId {
    /// Sentinel for the native currency.
    pub const NATIVE: TokenId = TokenId([0u8; 32]);

    /// Whether this identifier is the native-currency sentinel.
    pub fn is_native(&self) -> bool {
        *self == Self::NATIVE
    }
}

fn parse_hex32(s: &str) -> Result<[u8; 32], IdParseError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed).map_err(|e| IdParseError::InvalidHex(e.to_string()))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| IdParseError::InvalidLength(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_and_without_prefix() {
        let hex = "ab".repeat(32);
        let plain: AccountId = hex.parse().expect("parse plain");
        let prefixed: AccountId = format!("0x{hex}").parse().expect("parse prefixed");
        assert_eq!(plain, prefixed);
        assert_eq!(plain.0, [0xab; 32]);
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let err = "abcd".parse::<SplitId>().expect_err("short id");
        assert_eq!(err, IdParseError::InvalidLength(2));
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        assert!(matches!(
            "zz".repeat(32).parse::<TokenId>(),
            Err(IdParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let id = ScheduleHandle([0x01; 32]);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let back: ScheduleHandle = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn test_native_sentinel() {
        assert!(TokenId::NATIVE.is_native());
        assert!(!TokenId([1u8; 32]).is_native());
    }

    #[test]
    fn test_debug_is_abbreviated() {
        let id = SplitId([0xcd; 32]);
        assert_eq!(format!("{id:?}"), "SplitId(cdcdcdcd..)");
    }
}
