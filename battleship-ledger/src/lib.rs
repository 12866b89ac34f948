//! # Battleship Ledger
//!
//! Two-player battleship settled on a ledger with Merkle-committed grids.
//! Each player commits to a salted grid up front, opens one cell per shot
//! with an inclusion proof, and the declared winner finally opens the whole
//! grid. The ledger never sees a salt it was not shown.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    BATTLESHIP LEDGER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/             - Digests and identifiers                │
//! │  ├── hash.rs       - SHA-256 helpers                        │
//! │  └── ids.rs        - Accounts, matches, balances            │
//! │                                                             │
//! │  proof/            - Commitment engine                      │
//! │  ├── merkle.rs     - 128-leaf tree, proofs, verification    │
//! │  └── commitment.rs - Secret boards and cell reveals         │
//! │                                                             │
//! │  game/             - Match state machine (deterministic)    │
//! │  ├── grid.rs       - Coordinates, cells, fleet rules        │
//! │  ├── state.rs      - Match records and phases               │
//! │  ├── events.rs     - Ledger events and call outcomes        │
//! │  ├── arbiter.rs    - Operations and their preconditions     │
//! │  └── settlement.rs - Payout, refund, burn, cleanup          │
//! │                                                             │
//! │  ledger/           - Storage and escrow                     │
//! │  network/          - Wire types and block-producing node    │
//! │  client/           - Per-player orchestrator                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! `game/` and `proof/` never read the clock or an unseeded rng: given the
//! same calls in the same block order, every ledger ends in the same state.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod core;
pub mod game;
pub mod ledger;
pub mod network;
pub mod proof;

// Re-export commonly used types
pub use crate::config::{ArbiterConfig, FleetViolationPolicy, NodeConfig};
pub use crate::core::ids::{AccountId, Balance, BlockHeight, MatchId};
pub use crate::game::arbiter::{Arbiter, ArbiterError, ErrorCode};
pub use crate::game::grid::{Cell, Coordinate, Grid};
pub use crate::ledger::{InMemoryLedger, Ledger};
pub use crate::proof::commitment::SecretBoard;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
