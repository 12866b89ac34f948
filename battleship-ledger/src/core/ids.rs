//! Identifiers
//!
//! Account and match identifiers, and the ledger's unit of value.
//! `AccountId` stands in for whatever key the surrounding ledger
//! authenticates callers with; signing is not our concern.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Sequential match identifier assigned by the ledger.
pub type MatchId = u64;

/// Amount of the ledger's native token.
pub type Balance = u128;

/// Ledger block height.
pub type BlockHeight = u64;

/// Ledger account identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 16]);

impl AccountId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random account id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_roundtrip() {
        let id = AccountId::generate();
        let parsed = AccountId::from_uuid_str(&id.to_uuid_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_display_is_short_hex() {
        let id = AccountId::new([0x1f; 16]);
        assert_eq!(id.to_string(), "1f1f1f1f");
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(AccountId::generate(), AccountId::generate());
    }
}
