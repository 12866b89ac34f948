//! Match Logic
//!
//! The match state machine and everything it reasons about. Deterministic:
//! all inputs come from calls and the ledger.
//!
//! ## Module Structure
//!
//! - `grid`: Coordinates, salted cells, fleet rules
//! - `state`: Match record, phases, per-player boards
//! - `events`: Ledger events and accepted-call outcomes
//! - `arbiter`: Operations and their preconditions
//! - `settlement`: Terminal payouts and cleanup

pub mod grid;
pub mod state;
pub mod events;
pub mod arbiter;
pub mod settlement;

// Re-export key types
pub use grid::{Cell, Coordinate, Grid, FleetError, FLEET, FLEET_CELLS, GRID_SIZE};
pub use state::{Match, MatchPhase, PlayerBoard, PlayerRole};
pub use events::{Cheat, EndReason, Event, RevealOutcome, Settlement, Termination};
pub use arbiter::{Arbiter, ArbiterError, ErrorCode};
