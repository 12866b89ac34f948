//! Grid Commitments
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    COMMITMENT ENGINE                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  merkle.rs     - 100 leaves padded to 128, depth-7 proofs   │
//! │  commitment.rs - Secret board, cell reveals, full reveal    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod merkle;
pub mod commitment;

// Re-export key types
pub use merkle::{build_tree, compute_root, verify_proof, MerkleProof, MerkleTree, TREE_DEPTH};
pub use commitment::{verify_grid_root, CellReveal, SecretBoard};
