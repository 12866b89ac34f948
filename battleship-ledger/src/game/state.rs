//! Match State Definitions
//!
//! The per-match record the ledger stores, and the per-player board record
//! inside it. Nothing here holds a secret: boards are known only by their
//! roots and the cells revealed so far.

use serde::{Serialize, Deserialize};

use crate::core::hash::Hash;
use crate::core::ids::{AccountId, Balance, BlockHeight, MatchId};
use crate::game::grid::{Coordinate, CELL_COUNT, FLEET_CELLS};

// =============================================================================
// PLAYER ROLE
// =============================================================================

/// Seat in a match. Player1 created it and shoots first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerRole {
    /// Creator.
    Player1,
    /// Joiner.
    Player2,
}

impl PlayerRole {
    /// The other seat.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            PlayerRole::Player1 => PlayerRole::Player2,
            PlayerRole::Player2 => PlayerRole::Player1,
        }
    }
}

// =============================================================================
// PLAYER BOARD
// =============================================================================

/// What the ledger knows about one player's grid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerBoard {
    /// Merkle root, set exactly once.
    pub root: Option<Hash>,

    /// Bit `i` set once CellIndex `i` has been opened.
    pub revealed: u128,

    /// Opened cells that held a ship, in reveal order.
    pub hits_taken: Vec<Coordinate>,
}

impl PlayerBoard {
    /// Whether the owner has committed.
    #[inline]
    pub fn is_committed(&self) -> bool {
        self.root.is_some()
    }

    /// Whether a cell has been opened.
    pub fn is_revealed(&self, coord: Coordinate) -> bool {
        coord.is_valid() && self.revealed & (1u128 << coord.to_index()) != 0
    }

    /// Record an opened cell.
    pub fn mark_revealed(&mut self, coord: Coordinate) {
        if coord.is_valid() {
            self.revealed |= 1u128 << coord.to_index();
        }
    }

    /// Number of opened cells.
    pub fn revealed_count(&self) -> usize {
        self.revealed.count_ones() as usize
    }

    /// Every cell has been opened.
    pub fn is_exhausted(&self) -> bool {
        self.revealed_count() == CELL_COUNT
    }
}

// =============================================================================
// MATCH PHASE
// =============================================================================

/// Lifecycle phase. Termination deletes the record, so there is no
/// terminal variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Creator's stake is escrowed; no opponent yet.
    WaitingForOpponent,
    /// Both staked; collecting grid roots.
    AwaitingCommits,
    /// Shots being exchanged.
    Playing {
        /// Whose shot it is (the attacker while an attack is pending).
        turn: PlayerRole,
        /// Declared but unresolved shot.
        pending_attack: Option<Coordinate>,
    },
    /// All 17 of the loser's ship cells hit; winner must open their grid.
    PendingWinnerReveal {
        /// Declared winner.
        winner: PlayerRole,
    },
}

impl MatchPhase {
    /// Short name for logs and rejections.
    pub fn name(&self) -> &'static str {
        match self {
            MatchPhase::WaitingForOpponent => "waiting_for_opponent",
            MatchPhase::AwaitingCommits => "awaiting_commits",
            MatchPhase::Playing { .. } => "playing",
            MatchPhase::PendingWinnerReveal { .. } => "pending_winner_reveal",
        }
    }
}

// =============================================================================
// MATCH
// =============================================================================

/// A live match as stored by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// Sequential id.
    pub id: MatchId,

    /// Creator.
    pub player1: AccountId,

    /// Joiner, once there is one.
    pub player2: Option<AccountId>,

    /// Amount each player escrows.
    pub stake: Balance,

    /// Current phase.
    pub phase: MatchPhase,

    /// Player1's grid.
    pub board1: PlayerBoard,

    /// Player2's grid.
    pub board2: PlayerBoard,

    /// Ship cells player1 has hit.
    pub hits1: u8,

    /// Ship cells player2 has hit.
    pub hits2: u8,

    /// Height of the creating block.
    pub created_block: BlockHeight,

    /// Height of the last accepted action; timeouts count from here.
    pub last_action_block: BlockHeight,
}

impl Match {
    /// New match waiting for an opponent.
    pub fn new(id: MatchId, creator: AccountId, stake: Balance, now: BlockHeight) -> Self {
        Self {
            id,
            player1: creator,
            player2: None,
            stake,
            phase: MatchPhase::WaitingForOpponent,
            board1: PlayerBoard::default(),
            board2: PlayerBoard::default(),
            hits1: 0,
            hits2: 0,
            created_block: now,
            last_action_block: now,
        }
    }

    /// Seat held by an account, if it plays in this match.
    pub fn role_of(&self, account: &AccountId) -> Option<PlayerRole> {
        if *account == self.player1 {
            Some(PlayerRole::Player1)
        } else if self.player2.as_ref() == Some(account) {
            Some(PlayerRole::Player2)
        } else {
            None
        }
    }

    /// Account in a seat.
    pub fn account(&self, role: PlayerRole) -> Option<AccountId> {
        match role {
            PlayerRole::Player1 => Some(self.player1),
            PlayerRole::Player2 => self.player2,
        }
    }

    /// Every seated account.
    pub fn participants(&self) -> Vec<AccountId> {
        std::iter::once(self.player1).chain(self.player2).collect()
    }

    /// A player's board record.
    pub fn board(&self, role: PlayerRole) -> &PlayerBoard {
        match role {
            PlayerRole::Player1 => &self.board1,
            PlayerRole::Player2 => &self.board2,
        }
    }

    /// Mutable board record.
    pub fn board_mut(&mut self, role: PlayerRole) -> &mut PlayerBoard {
        match role {
            PlayerRole::Player1 => &mut self.board1,
            PlayerRole::Player2 => &mut self.board2,
        }
    }

    /// Ship cells a player has hit on the opponent's grid.
    pub fn hits(&self, role: PlayerRole) -> u8 {
        match role {
            PlayerRole::Player1 => self.hits1,
            PlayerRole::Player2 => self.hits2,
        }
    }

    /// Record one more hit by `role`. Saturates at 17.
    pub fn add_hit(&mut self, role: PlayerRole) -> u8 {
        let hits = match role {
            PlayerRole::Player1 => &mut self.hits1,
            PlayerRole::Player2 => &mut self.hits2,
        };
        *hits = hits.saturating_add(1).min(FLEET_CELLS);
        *hits
    }

    /// Value the ledger should hold for this match right now.
    pub fn expected_escrow(&self) -> Balance {
        self.stake.saturating_mul(self.participants().len() as Balance)
    }

    /// The player whose inaction lets the other claim a timeout.
    ///
    /// None while waiting for an opponent, and during setup unless exactly
    /// one root is in.
    pub fn awaited(&self) -> Option<PlayerRole> {
        match self.phase {
            MatchPhase::WaitingForOpponent => None,
            MatchPhase::AwaitingCommits => {
                match (self.board1.is_committed(), self.board2.is_committed()) {
                    (true, false) => Some(PlayerRole::Player2),
                    (false, true) => Some(PlayerRole::Player1),
                    _ => None,
                }
            }
            MatchPhase::Playing { turn, pending_attack: None } => Some(turn),
            MatchPhase::Playing { turn, pending_attack: Some(_) } => Some(turn.other()),
            MatchPhase::PendingWinnerReveal { winner } => Some(winner),
        }
    }

    /// Blocks since the last accepted action.
    pub fn idle_for(&self, now: BlockHeight) -> BlockHeight {
        now.saturating_sub(self.last_action_block)
    }
}
