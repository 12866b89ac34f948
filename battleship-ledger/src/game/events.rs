//! Match Events and Outcomes
//!
//! Events are what the ledger emits for watchers. Outcomes are what an
//! operation returns to its caller when the call was accepted; a lost
//! match is an outcome, never an error.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::ids::{AccountId, Balance, MatchId};
use crate::game::grid::Coordinate;

/// Why a match ended with a winner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// All ships sunk and the winner's grid checked out.
    Victory,
    /// The loser was caught lying about their grid.
    Cheating,
    /// The loser stopped acting.
    Timeout,
    /// The loser gave up.
    Surrender,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndReason::Victory => "victory",
            EndReason::Cheating => "cheating",
            EndReason::Timeout => "timeout",
            EndReason::Surrender => "surrender",
        };
        f.write_str(s)
    }
}

/// Ledger event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// A match was opened.
    MatchCreated {
        /// Match.
        id: MatchId,
        /// Creator.
        creator: AccountId,
        /// Per-player stake.
        stake: Balance,
    },

    /// Second player staked.
    OpponentJoined {
        /// Match.
        id: MatchId,
        /// Joiner.
        opponent: AccountId,
    },

    /// One player's root is in.
    GridCommitted {
        /// Match.
        id: MatchId,
        /// Committing player.
        player: AccountId,
    },

    /// Both roots are in; player1 shoots first.
    BothCommitted {
        /// Match.
        id: MatchId,
    },

    /// A shot was declared.
    AttackDeclared {
        /// Match.
        id: MatchId,
        /// Shooter.
        attacker: AccountId,
        /// Target cell.
        coord: Coordinate,
    },

    /// A shot was resolved with a valid proof.
    AttackRevealed {
        /// Match.
        id: MatchId,
        /// Target cell.
        coord: Coordinate,
        /// Whether it held a ship.
        hit: bool,
    },

    /// Seventeenth hit; the winner now owes a full reveal.
    AllShipsSunk {
        /// Match.
        id: MatchId,
        /// Declared winner.
        winner: AccountId,
    },

    /// Match over, pot paid.
    MatchEnded {
        /// Match.
        id: MatchId,
        /// Paid player.
        winner: AccountId,
        /// Other player.
        loser: AccountId,
        /// Why.
        reason: EndReason,
        /// Amount paid.
        prize: Balance,
    },

    /// Match over with no winner; stakes returned.
    MatchCancelled {
        /// Match.
        id: MatchId,
        /// Each refunded player and amount.
        refunded: Vec<(AccountId, Balance)>,
    },

    /// Idle match reaped; stakes destroyed.
    MatchAbandoned {
        /// Match.
        id: MatchId,
        /// Amount burned.
        burned: Balance,
    },
}

impl Event {
    /// Match the event belongs to.
    pub fn match_id(&self) -> MatchId {
        match self {
            Event::MatchCreated { id, .. }
            | Event::OpponentJoined { id, .. }
            | Event::GridCommitted { id, .. }
            | Event::BothCommitted { id }
            | Event::AttackDeclared { id, .. }
            | Event::AttackRevealed { id, .. }
            | Event::AllShipsSunk { id, .. }
            | Event::MatchEnded { id, .. }
            | Event::MatchCancelled { id, .. }
            | Event::MatchAbandoned { id, .. } => *id,
        }
    }

    /// Whether the match record is gone after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::MatchEnded { .. } | Event::MatchCancelled { .. } | Event::MatchAbandoned { .. }
        )
    }
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// A paid-out match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Paid player.
    pub winner: AccountId,
    /// Other player.
    pub loser: AccountId,
    /// Why.
    pub reason: EndReason,
    /// Amount paid.
    pub prize: Balance,
}

/// How a terminal call ended the match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Pot paid to a winner.
    Settled(Settlement),
    /// Stakes returned, no winner.
    Cancelled {
        /// Each refunded player and amount.
        refunded: Vec<(AccountId, Balance)>,
    },
}

impl Termination {
    /// Winner, if there was one.
    pub fn winner(&self) -> Option<AccountId> {
        match self {
            Termination::Settled(s) => Some(s.winner),
            Termination::Cancelled { .. } => None,
        }
    }
}

/// Evidence the defender lied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cheat {
    /// Proof did not fold to the committed root.
    InvalidProof,
    /// Hits so far cannot belong to a legal fleet.
    IllegalHitPattern,
    /// Every cell opened with fewer than 17 hits.
    ShortFleet,
}

impl fmt::Display for Cheat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cheat::InvalidProof => f.write_str("invalid merkle proof"),
            Cheat::IllegalHitPattern => f.write_str("impossible hit pattern"),
            Cheat::ShortFleet => f.write_str("fewer than 17 ship cells"),
        }
    }
}

/// Result of an accepted `reveal_cell`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealOutcome {
    /// Empty water; turn passes.
    Miss,
    /// Ship cell. `hits` is the attacker's new total.
    Hit {
        /// Attacker's hits so far.
        hits: u8,
    },
    /// Defender caught; match settled for the attacker.
    Cheating {
        /// What gave them away.
        evidence: Cheat,
        /// Resulting payout.
        settlement: Settlement,
    },
}
