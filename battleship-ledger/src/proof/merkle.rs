//! Merkle Tree Commitments
//!
//! Fixed-shape binary Merkle tree using SHA-256. A grid's 100 leaf hashes
//! are padded with a public dummy leaf to 128, giving a depth-7 tree.
//! Leaf `i` always corresponds to CellIndex `i`.
//!
//! Leaves are `H(salt ∥ occupied_byte)` and internal nodes `H(left ∥ right)`
//! with no domain tags, so any party can recompute a root from a revealed
//! grid with nothing but SHA-256.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::hash::{Hash, hash_pair, pad_leaf};
use crate::game::grid::{Cell, Grid, CELL_COUNT};

/// Leaves in a full tree (100 cells padded to the next power of two).
pub const TREE_LEAVES: usize = 128;

/// Levels between a leaf and the root; also the proof length.
pub const TREE_DEPTH: usize = 7;

/// Errors building a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    /// More leaves than the fixed tree shape holds.
    #[error("{0} leaves exceed the tree capacity of 128")]
    TooManyLeaves(usize),
}

/// Binary Merkle tree over one grid.
///
/// All levels are kept so proofs can be produced for any cell without
/// rehashing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    /// All tree levels (padded leaves at index 0, root at last index)
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build from pre-hashed leaves, padding to 128.
    pub fn from_leaf_hashes(leaves: &[Hash]) -> Result<Self, MerkleError> {
        if leaves.len() > TREE_LEAVES {
            return Err(MerkleError::TooManyLeaves(leaves.len()));
        }

        Ok(Self::from_padded(leaves.to_vec()))
    }

    /// Build the commitment tree for a grid.
    pub fn from_grid(grid: &Grid) -> Self {
        Self::from_cells(grid.cells())
    }

    /// Callers guarantee at most 100 cells.
    fn from_cells(cells: &[Cell]) -> Self {
        Self::from_padded(cells.iter().take(CELL_COUNT).map(Cell::leaf_hash).collect())
    }

    fn from_padded(mut current_level: Vec<Hash>) -> Self {
        current_level.resize(TREE_LEAVES, pad_leaf());

        let mut levels = Vec::with_capacity(TREE_DEPTH + 1);
        levels.push(current_level.clone());

        // Build up to root
        while current_level.len() > 1 {
            let next_level: Vec<Hash> = current_level
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();

            levels.push(next_level.clone());
            current_level = next_level;
        }

        Self { levels }
    }

    /// Root digest.
    pub fn root(&self) -> Hash {
        // Root is the single element at the top level
        self.levels[TREE_DEPTH][0]
    }

    /// Leaf hash at an index (pad leaves included).
    pub fn leaf(&self, index: usize) -> Option<Hash> {
        self.levels[0].get(index).copied()
    }

    /// Generate the inclusion proof for a leaf.
    ///
    /// Returns None if index is out of bounds.
    pub fn generate_proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= TREE_LEAVES {
            return None;
        }

        let mut siblings = Vec::with_capacity(TREE_DEPTH);
        let mut current_index = index;

        // Walk up the tree, collecting sibling hashes
        for level in &self.levels[..TREE_DEPTH] {
            siblings.push(level[current_index ^ 1]);
            current_index /= 2;
        }

        Some(MerkleProof { siblings })
    }
}

/// Merkle inclusion proof: sibling hashes from leaf level to just below
/// the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Sibling at each level, leaf level first.
    pub siblings: Vec<Hash>,
}

impl MerkleProof {
    /// A proof has exactly one sibling per level.
    pub fn is_well_formed(&self) -> bool {
        self.siblings.len() == TREE_DEPTH
    }
}

/// Build a grid's tree and return it with its root.
pub fn build_tree(grid: &Grid) -> (MerkleTree, Hash) {
    let tree = MerkleTree::from_grid(grid);
    let root = tree.root();
    (tree, root)
}

/// Recompute the root of a full reveal. None unless exactly 100 cells.
pub fn compute_root(cells: &[Cell]) -> Option<Hash> {
    (cells.len() == CELL_COUNT).then(|| MerkleTree::from_cells(cells).root())
}

/// Verify an inclusion proof.
///
/// Folds `leaf_hash` upward; at level `k`, bit `k` of `index` clear means
/// the accumulator is the left child. Pure: a `false` here is evidence for
/// the caller to act on, not an error.
pub fn verify_proof(root: &Hash, proof: &MerkleProof, index: usize, leaf_hash: &Hash) -> bool {
    if !proof.is_well_formed() || index >= TREE_LEAVES {
        return false;
    }

    let mut current_hash = *leaf_hash;

    for (level, sibling) in proof.siblings.iter().enumerate() {
        current_hash = if (index >> level) & 1 == 0 {
            hash_pair(&current_hash, sibling)
        } else {
            hash_pair(sibling, &current_hash)
        };
    }

    #[cfg(feature = "debug-tracing")]
    tracing::trace!(
        index,
        computed = %crate::core::hash::short_hex(&current_hash),
        expected = %crate::core::hash::short_hex(root),
        "merkle fold"
    );

    current_hash == *root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::tests::standard_grid;
    use crate::core::hash::hash_bytes;
    use proptest::prelude::*;

    #[test]
    fn test_root_determinism() {
        let grid = standard_grid(1);
        let (_, root1) = build_tree(&grid);
        let (_, root2) = build_tree(&grid);
        assert_eq!(root1, root2);
    }

    #[test]
    fn test_tree_shape() {
        let (tree, _) = build_tree(&standard_grid(1));
        assert_eq!(tree.levels.len(), TREE_DEPTH + 1);
        assert_eq!(tree.levels[0].len(), TREE_LEAVES);
        assert_eq!(tree.leaf(100), Some(pad_leaf()));
        assert_eq!(tree.leaf(127), Some(pad_leaf()));
        assert_eq!(tree.leaf(128), None);
    }

    #[test]
    fn test_from_leaf_hashes_matches_grid() {
        let grid = standard_grid(2);
        let leaves: Vec<Hash> = grid.cells().iter().map(Cell::leaf_hash).collect();
        let tree = MerkleTree::from_leaf_hashes(&leaves).unwrap();
        assert_eq!(tree, MerkleTree::from_grid(&grid));
    }

    #[test]
    fn test_too_many_leaves() {
        let leaves = vec![hash_bytes(b"x"); TREE_LEAVES + 1];
        assert_eq!(
            MerkleTree::from_leaf_hashes(&leaves),
            Err(MerkleError::TooManyLeaves(129))
        );
    }

    #[test]
    fn test_leaf_order_matters() {
        let grid = standard_grid(3);
        let mut cells = grid.cells().to_vec();
        cells.swap(0, 99);
        assert_ne!(compute_root(&cells), compute_root(grid.cells()));
    }

    #[test]
    fn test_compute_root_requires_full_grid() {
        let grid = standard_grid(4);
        assert_eq!(compute_root(grid.cells()), Some(build_tree(&grid).1));
        assert_eq!(compute_root(&grid.cells()[..99]), None);
    }

    #[test]
    fn test_every_cell_proves() {
        let grid = standard_grid(5);
        let (tree, root) = build_tree(&grid);
        for (index, cell) in grid.cells().iter().enumerate() {
            let proof = tree.generate_proof(index).unwrap();
            assert!(proof.is_well_formed());
            assert!(verify_proof(&root, &proof, index, &cell.leaf_hash()));
        }
    }

    #[test]
    fn test_proof_for_wrong_index_fails() {
        let grid = standard_grid(6);
        let (tree, root) = build_tree(&grid);
        let proof = tree.generate_proof(10).unwrap();
        let leaf = grid.cells()[10].leaf_hash();
        assert!(!verify_proof(&root, &proof, 11, &leaf));
    }

    #[test]
    fn test_short_proof_fails() {
        let grid = standard_grid(7);
        let (tree, root) = build_tree(&grid);
        let mut proof = tree.generate_proof(0).unwrap();
        proof.siblings.pop();
        assert!(!proof.is_well_formed());
        assert!(!verify_proof(&root, &proof, 0, &grid.cells()[0].leaf_hash()));
    }

    #[test]
    fn test_proof_out_of_bounds() {
        let (tree, _) = build_tree(&standard_grid(8));
        assert!(tree.generate_proof(TREE_LEAVES).is_none());
    }

    proptest! {
        #[test]
        fn prop_proof_soundness(seed in any::<u64>(), index in 0usize..CELL_COUNT) {
            let grid = standard_grid(seed);
            let (tree, root) = build_tree(&grid);
            let proof = tree.generate_proof(index).unwrap();
            prop_assert!(verify_proof(&root, &proof, index, &grid.cells()[index].leaf_hash()));
        }

        #[test]
        fn prop_tampered_cell_fails(
            seed in any::<u64>(),
            index in 0usize..CELL_COUNT,
            bit in 0usize..257,
        ) {
            let grid = standard_grid(seed);
            let (tree, root) = build_tree(&grid);
            let proof = tree.generate_proof(index).unwrap();

            let mut cell = grid.cells()[index].clone();
            if bit == 256 {
                cell.occupied = !cell.occupied;
            } else {
                cell.salt[bit / 8] ^= 1 << (bit % 8);
            }

            prop_assert!(!verify_proof(&root, &proof, index, &cell.leaf_hash()));
        }
    }
}
