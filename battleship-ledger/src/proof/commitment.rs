//! Grid Commitment Protocol
//!
//! Commit to a secret grid before the first shot. Reveal single cells with
//! inclusion proofs while playing, and the whole grid if declared winner.
//!
//! The [`SecretBoard`] never leaves the client: the ledger only ever sees
//! the root, single-cell reveals and, at the end, the winner's full grid.

use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::core::hash::Hash;
use crate::game::grid::{Cell, Coordinate, FleetError, Grid};
use crate::proof::merkle::{build_tree, compute_root, verify_proof, MerkleProof, MerkleTree};

/// A committed grid together with everything needed to open it.
#[derive(Clone, Debug)]
pub struct SecretBoard {
    grid: Grid,
    tree: MerkleTree,
    root: Hash,
}

impl SecretBoard {
    /// Commit to a grid that satisfies the fleet rules.
    pub fn new(grid: Grid) -> Result<Self, FleetError> {
        grid.validate()?;
        Ok(Self::commit_unchecked(grid))
    }

    /// Commit to any 100-cell grid, legal or not.
    ///
    /// The ledger catches illegal fleets at the winner reveal; this exists
    /// so that path can be driven.
    pub fn commit_unchecked(grid: Grid) -> Self {
        let (tree, root) = build_tree(&grid);
        Self { grid, tree, root }
    }

    /// Commit to a fresh random fleet with fresh salts.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::commit_unchecked(Grid::random(rng))
    }

    /// Published commitment.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Underlying grid.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Whether a ship sits on the coordinate.
    pub fn is_occupied(&self, coord: Coordinate) -> Option<bool> {
        self.grid.cell(coord).map(|cell| cell.occupied)
    }

    /// Open one cell.
    pub fn reveal(&self, coord: Coordinate) -> Option<CellReveal> {
        let cell = self.grid.cell(coord)?.clone();
        let proof = self.tree.generate_proof(coord.to_index())?;
        Some(CellReveal { cell, proof })
    }

    /// Open the whole grid (winner reveal).
    pub fn full_reveal(&self) -> Vec<Cell> {
        self.grid.cells().to_vec()
    }
}

/// One opened cell and its inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellReveal {
    /// The cell's salt and occupancy.
    pub cell: Cell,
    /// Path from the cell's leaf to the root.
    pub proof: MerkleProof,
}

impl CellReveal {
    /// Check the reveal against a published root.
    pub fn verify(&self, root: &Hash, coord: Coordinate) -> bool {
        coord.is_valid() && verify_proof(root, &self.proof, coord.to_index(), &self.cell.leaf_hash())
    }
}

/// Whether a full reveal opens to the given root.
pub fn verify_grid_root(cells: &[Cell], root: &Hash) -> bool {
    compute_root(cells).is_some_and(|computed| computed == *root)
}
