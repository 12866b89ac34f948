//! Core primitives.
//!
//! Digests and identifiers shared by every other module.

pub mod hash;
pub mod ids;

// Re-export core types
pub use hash::{Hash, CommitHasher, hash_pair, pad_leaf};
pub use ids::{AccountId, Balance, BlockHeight, MatchId};
