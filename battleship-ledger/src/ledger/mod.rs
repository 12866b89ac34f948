//! Ledger Interface
//!
//! The storage and value-transfer surface the match state machine runs on.
//! Implementations execute each call atomically and one at a time; the
//! state machine never holds state of its own between calls.
//!
//! ## Module Structure
//!
//! - `memory`: In-memory ledger with snapshot transactions

pub mod memory;

use thiserror::Error;

use crate::core::ids::{AccountId, Balance, BlockHeight, MatchId};
use crate::game::events::Event;
use crate::game::state::Match;

pub use memory::InMemoryLedger;

/// Storage and escrow failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Account cannot cover an escrow.
    #[error("account {account} holds {available}, needs {needed}")]
    InsufficientBalance {
        /// Debited account.
        account: AccountId,
        /// Amount requested.
        needed: Balance,
        /// Free balance.
        available: Balance,
    },

    /// A match's escrow cannot cover a payout or burn.
    #[error("match {id} escrows {held}, needs {needed}")]
    InsufficientEscrow {
        /// Match.
        id: MatchId,
        /// Amount requested.
        needed: Balance,
        /// Amount held.
        held: Balance,
    },

    /// Crediting would overflow an account.
    #[error("balance overflow for {0}")]
    Overflow(AccountId),
}

/// What the state machine needs from its host ledger.
pub trait Ledger {
    /// Load a live match.
    fn read_match(&self, id: MatchId) -> Option<Match>;

    /// Store a live match.
    fn write_match(&mut self, game: Match);

    /// Delete a match record.
    fn remove_match(&mut self, id: MatchId) -> Option<Match>;

    /// Ids of every live match, ascending.
    fn match_ids(&self) -> Vec<MatchId>;

    /// The live match an account plays in.
    fn player_match(&self, player: &AccountId) -> Option<MatchId>;

    /// Point an account at its live match.
    fn set_player_match(&mut self, player: AccountId, id: MatchId);

    /// Drop an account's index entry.
    fn clear_player_match(&mut self, player: &AccountId);

    /// Allocate the next sequential match id; None once exhausted.
    fn next_match_id(&mut self) -> Option<MatchId>;

    /// Move `amount` from a player's free balance into a match's escrow.
    fn escrow(&mut self, id: MatchId, player: &AccountId, amount: Balance) -> Result<(), LedgerError>;

    /// Move `amount` out of a match's escrow to a player.
    fn payout(&mut self, id: MatchId, player: &AccountId, amount: Balance) -> Result<(), LedgerError>;

    /// Destroy `amount` of a match's escrow.
    fn burn(&mut self, id: MatchId, amount: Balance) -> Result<(), LedgerError>;

    /// Value a match currently escrows.
    fn escrowed(&self, id: MatchId) -> Balance;

    /// Height of the block being built.
    fn current_height(&self) -> BlockHeight;

    /// Publish an event.
    fn emit(&mut self, event: Event);
}
