//! Digest Primitives
//!
//! SHA-256 helpers shared by the commitment engine, the arbiter and the
//! client. Every hash in the protocol is a 32-byte SHA-256 digest.

use sha2::{Sha256, Digest};

/// Hash output type (256 bits / 32 bytes)
pub type Hash = [u8; 32];

/// Domain separator for the public Merkle padding leaf.
const PAD_LEAF_DOMAIN: &[u8] = b"BATTLESHIP_MERKLE_PAD_V1";

/// Incremental hasher.
///
/// Wraps SHA-256 with helpers for the handful of primitive types the
/// protocol commits to. Order of updates is part of the commitment.
pub struct CommitHasher {
    hasher: Sha256,
}

impl Default for CommitHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitHasher {
    /// Create an empty hasher.
    pub fn new() -> Self {
        Self { hasher: Sha256::new() }
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a boolean (one byte, 0 or 1).
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> Hash {
        self.hasher.finalize().into()
    }
}

/// Compute a simple hash of arbitrary data.
pub fn hash_bytes(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash two child nodes: `H(left ∥ right)`.
#[inline]
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// The fixed, publicly known leaf used to pad a tree to a power of two.
pub fn pad_leaf() -> Hash {
    hash_with_domain(PAD_LEAF_DOMAIN, &[])
}

/// First four bytes of a digest as hex, for log lines.
pub fn short_hex(hash: &Hash) -> String {
    hex::encode(&hash[..4])
}
