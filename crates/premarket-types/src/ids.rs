//! Identifiers used throughout Premarket.
//!
//! Tokens and accounts use UUIDv7 (opaque, time-ordered). Offers and orders
//! use monotonically increasing counters owned by the table that issues them.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{PremarketError, Result};

// ---------------------------------------------------------------------------
// TokenId
// ---------------------------------------------------------------------------

/// Opaque identifier of a points token registered on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TokenId(pub Uuid);

impl TokenId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// A participant, operator, or fee wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AccountId(pub Uuid);

impl AccountId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// OfferId / OrderId
// ---------------------------------------------------------------------------

/// Sequential offer identifier. `OfferId(0)` means "none assigned yet".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OfferId(pub u64);

impl OfferId {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offer:{}", self.0)
    }
}

/// Sequential order identifier. `OrderId(0)` means "none assigned yet".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl OrderId {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// An asset the custodian can move: the native currency or a fungible
/// contract identified by its address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum AssetId {
    Native,
    Contract(String),
}

impl AssetId {
    #[must_use]
    pub fn contract(address: impl Into<String>) -> Self {
        Self::Contract(address.into())
    }

    #[must_use]
    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "NATIVE"),
            Self::Contract(address) => write!(f, "{address}"),
        }
    }
}

// ---------------------------------------------------------------------------
// AuditHash
// ---------------------------------------------------------------------------

/// Opaque 32-byte reference to off-ledger delivery evidence, recorded by
/// the two-step settlement path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditHash(pub [u8; 32]);

impl AuditHash {
    /// SHA-256 of arbitrary evidence bytes.
    #[must_use]
    pub fn digest(evidence: &[u8]) -> Self {
        let hash = Sha256::digest(evidence);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hash);
        Self(out)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| PremarketError::InvalidInput {
            reason: format!("audit hash is not hex: {e}"),
        })?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PremarketError::InvalidInput {
                reason: "audit hash must be 32 bytes".into(),
            })?;
        Ok(Self(arr))
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for AuditHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_id_uniqueness() {
        assert_ne!(TokenId::new(), TokenId::new());
    }

    #[test]
    fn sequential_ids_advance() {
        assert_eq!(OfferId::default().next(), OfferId(1));
        assert_eq!(OrderId(41).next(), OrderId(42));
    }

    #[test]
    fn asset_display() {
        assert_eq!(AssetId::Native.to_string(), "NATIVE");
        assert_eq!(AssetId::contract("0xusdc").to_string(), "0xusdc");
        assert!(AssetId::Native.is_native());
        assert!(!AssetId::contract("0xusdc").is_native());
    }

    #[test]
    fn audit_hash_hex_roundtrip() {
        let h = AuditHash::digest(b"delivery tx 0xabc");
        let back = AuditHash::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn audit_hash_rejects_bad_length() {
        assert!(AuditHash::from_hex("abcd").is_err());
        assert!(AuditHash::from_hex("zz").is_err());
    }
}
