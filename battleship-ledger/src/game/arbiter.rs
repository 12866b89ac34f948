//! Match Arbiter
//!
//! The state machine every match call goes through. It owns no state: each
//! operation reads the match from the ledger, checks every precondition,
//! and only then moves funds and writes back.
//!
//! Two kinds of failure exist and they are kept apart:
//! - a malformed call is rejected with an [`ArbiterError`] and changes
//!   nothing;
//! - a well-formed call whose content loses (bad proof, illegal fleet,
//!   timeout, surrender) is accepted and returns the terminal outcome.

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::{ArbiterConfig, FleetViolationPolicy};
use crate::core::hash::{short_hex, Hash};
use crate::core::ids::{AccountId, Balance, BlockHeight, MatchId};
use crate::game::events::{Cheat, EndReason, Event, RevealOutcome, Termination};
use crate::game::grid::{validate_fleet, validate_hit_pattern, Cell, Coordinate, CELL_COUNT, FLEET_CELLS};
use crate::game::settlement;
use crate::game::state::{Match, MatchPhase, PlayerRole};
use crate::ledger::{Ledger, LedgerError};
use crate::proof::commitment::verify_grid_root;
use crate::proof::merkle::{verify_proof, MerkleProof};

// =============================================================================
// ERRORS
// =============================================================================

/// Stable wire codes for rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No live match with that id.
    MatchNotFound,
    /// Caller already plays in a live match.
    AlreadyInMatch,
    /// Operation not valid in the current phase.
    WrongPhase,
    /// Caller does not play in this match.
    NotParticipant,
    /// Caller is not the attacker this turn.
    NotYourTurn,
    /// Caller is not the defender of the pending shot.
    NotDefender,
    /// Caller is not the declared winner.
    NotWinner,
    /// A shot is already pending.
    AttackPending,
    /// No shot to answer.
    NoPendingAttack,
    /// Root already set.
    AlreadyCommitted,
    /// Root missing where one is required.
    MissingCommitment,
    /// Creator tried to join their own match.
    CannotJoinOwnMatch,
    /// Offered stake differs from the match stake.
    StakeMismatch,
    /// Coordinate off the board.
    InvalidCoordinate,
    /// Cell already opened.
    CellAlreadyRevealed,
    /// Proof does not have seven siblings.
    InvalidProofLength,
    /// Full reveal does not have 100 cells.
    InvalidGridSize,
    /// Full reveal does not open to the committed root.
    GridCommitmentMismatch,
    /// Timeout not yet reached.
    TimeoutNotReached,
    /// Caller may not claim a timeout now.
    CannotClaimTimeout,
    /// Match ids exhausted.
    MatchIdOverflow,
    /// Caller cannot cover the stake.
    InsufficientBalance,
    /// Ledger bookkeeping failed.
    InternalError,
}

/// A rejected call. Nothing changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArbiterError {
    /// No live match with that id.
    #[error("match {0} not found")]
    MatchNotFound(MatchId),

    /// Caller already plays in a live match.
    #[error("already in match {0}")]
    AlreadyInMatch(MatchId),

    /// Operation not valid in the current phase.
    #[error("wrong phase: expected {expected}, match is {actual}")]
    WrongPhase {
        /// Phase the operation needs.
        expected: &'static str,
        /// Phase the match is in.
        actual: &'static str,
    },

    /// Caller does not play in this match.
    #[error("not a participant")]
    NotParticipant,

    /// Caller is not the attacker this turn.
    #[error("not your turn")]
    NotYourTurn,

    /// Caller is not the defender of the pending shot.
    #[error("only the defender may reveal")]
    NotDefender,

    /// Caller is not the declared winner.
    #[error("only the declared winner may reveal the grid")]
    NotWinner,

    /// A shot is already pending.
    #[error("attack at {0} still pending")]
    AttackPending(Coordinate),

    /// No shot to answer.
    #[error("no pending attack")]
    NoPendingAttack,

    /// Root already set.
    #[error("grid already committed")]
    AlreadyCommitted,

    /// Root missing where one is required.
    #[error("grid not committed")]
    MissingCommitment,

    /// Creator tried to join their own match.
    #[error("cannot join your own match")]
    CannotJoinOwnMatch,

    /// Offered stake differs from the match stake.
    #[error("stake mismatch: match requires {expected}, offered {offered}")]
    StakeMismatch {
        /// Match stake.
        expected: Balance,
        /// Caller's offer.
        offered: Balance,
    },

    /// Coordinate off the board.
    #[error("coordinate {0} is off the board")]
    InvalidCoordinate(Coordinate),

    /// Cell already opened.
    #[error("cell {0} already revealed")]
    CellAlreadyRevealed(Coordinate),

    /// Proof does not have seven siblings.
    #[error("proof has {0} siblings, expected 7")]
    InvalidProofLength(usize),

    /// Full reveal does not have 100 cells.
    #[error("grid has {0} cells, expected 100")]
    InvalidGridSize(usize),

    /// Full reveal does not open to the committed root.
    #[error("revealed grid does not match commitment")]
    GridCommitmentMismatch,

    /// Timeout not yet reached.
    #[error("timeout not reached: {remaining} blocks remaining")]
    TimeoutNotReached {
        /// Blocks until a claim is possible.
        remaining: BlockHeight,
    },

    /// Caller may not claim a timeout now.
    #[error("cannot claim timeout")]
    CannotClaimTimeout,

    /// Match ids exhausted.
    #[error("match id space exhausted")]
    MatchIdOverflow,

    /// Escrow or payout failed.
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
}

impl ArbiterError {
    /// Wire code for this rejection.
    pub fn code(&self) -> ErrorCode {
        match self {
            ArbiterError::MatchNotFound(_) => ErrorCode::MatchNotFound,
            ArbiterError::AlreadyInMatch(_) => ErrorCode::AlreadyInMatch,
            ArbiterError::WrongPhase { .. } => ErrorCode::WrongPhase,
            ArbiterError::NotParticipant => ErrorCode::NotParticipant,
            ArbiterError::NotYourTurn => ErrorCode::NotYourTurn,
            ArbiterError::NotDefender => ErrorCode::NotDefender,
            ArbiterError::NotWinner => ErrorCode::NotWinner,
            ArbiterError::AttackPending(_) => ErrorCode::AttackPending,
            ArbiterError::NoPendingAttack => ErrorCode::NoPendingAttack,
            ArbiterError::AlreadyCommitted => ErrorCode::AlreadyCommitted,
            ArbiterError::MissingCommitment => ErrorCode::MissingCommitment,
            ArbiterError::CannotJoinOwnMatch => ErrorCode::CannotJoinOwnMatch,
            ArbiterError::StakeMismatch { .. } => ErrorCode::StakeMismatch,
            ArbiterError::InvalidCoordinate(_) => ErrorCode::InvalidCoordinate,
            ArbiterError::CellAlreadyRevealed(_) => ErrorCode::CellAlreadyRevealed,
            ArbiterError::InvalidProofLength(_) => ErrorCode::InvalidProofLength,
            ArbiterError::InvalidGridSize(_) => ErrorCode::InvalidGridSize,
            ArbiterError::GridCommitmentMismatch => ErrorCode::GridCommitmentMismatch,
            ArbiterError::TimeoutNotReached { .. } => ErrorCode::TimeoutNotReached,
            ArbiterError::CannotClaimTimeout => ErrorCode::CannotClaimTimeout,
            ArbiterError::MatchIdOverflow => ErrorCode::MatchIdOverflow,
            ArbiterError::Ledger(LedgerError::InsufficientBalance { .. }) => {
                ErrorCode::InsufficientBalance
            }
            ArbiterError::Ledger(_) => ErrorCode::InternalError,
        }
    }
}

fn wrong_phase(expected: &'static str, game: &Match) -> ArbiterError {
    ArbiterError::WrongPhase { expected, actual: game.phase.name() }
}

// =============================================================================
// ARBITER
// =============================================================================

/// Match state machine.
#[derive(Clone, Debug, Default)]
pub struct Arbiter {
    config: ArbiterConfig,
}

impl Arbiter {
    /// Create an arbiter with the given rules.
    pub fn new(config: ArbiterConfig) -> Self {
        Self { config }
    }

    /// Active rules.
    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// Open a match and escrow the creator's stake.
    #[instrument(skip(self, ledger), fields(caller = %caller))]
    pub fn create_game<L: Ledger>(
        &self,
        ledger: &mut L,
        caller: AccountId,
        stake: Balance,
    ) -> Result<MatchId, ArbiterError> {
        if let Some(existing) = ledger.player_match(&caller) {
            return Err(ArbiterError::AlreadyInMatch(existing));
        }

        let id = ledger.next_match_id().ok_or(ArbiterError::MatchIdOverflow)?;
        ledger.escrow(id, &caller, stake)?;

        let now = ledger.current_height();
        ledger.write_match(Match::new(id, caller, stake, now));
        ledger.set_player_match(caller, id);

        info!(match_id = id, %stake, "match created");
        ledger.emit(Event::MatchCreated { id, creator: caller, stake });
        Ok(id)
    }

    /// Take the second seat, escrowing the same stake.
    #[instrument(skip(self, ledger), fields(caller = %caller))]
    pub fn join_game<L: Ledger>(
        &self,
        ledger: &mut L,
        caller: AccountId,
        id: MatchId,
        stake: Balance,
    ) -> Result<(), ArbiterError> {
        let mut game = ledger.read_match(id).ok_or(ArbiterError::MatchNotFound(id))?;

        if game.phase != MatchPhase::WaitingForOpponent {
            return Err(wrong_phase("waiting_for_opponent", &game));
        }
        if caller == game.player1 {
            return Err(ArbiterError::CannotJoinOwnMatch);
        }
        if let Some(existing) = ledger.player_match(&caller) {
            return Err(ArbiterError::AlreadyInMatch(existing));
        }
        if stake != game.stake {
            return Err(ArbiterError::StakeMismatch { expected: game.stake, offered: stake });
        }

        ledger.escrow(id, &caller, stake)?;

        game.player2 = Some(caller);
        game.phase = MatchPhase::AwaitingCommits;
        game.last_action_block = ledger.current_height();
        ledger.write_match(game);
        ledger.set_player_match(caller, id);

        info!(match_id = id, "opponent joined");
        ledger.emit(Event::OpponentJoined { id, opponent: caller });
        Ok(())
    }

    /// Record the caller's grid root. Starts play once both are in.
    #[instrument(skip(self, ledger, root), fields(caller = %caller, root = %short_hex(&root)))]
    pub fn commit_grid<L: Ledger>(
        &self,
        ledger: &mut L,
        caller: AccountId,
        id: MatchId,
        root: Hash,
    ) -> Result<(), ArbiterError> {
        let mut game = ledger.read_match(id).ok_or(ArbiterError::MatchNotFound(id))?;
        let role = game.role_of(&caller).ok_or(ArbiterError::NotParticipant)?;

        if game.phase != MatchPhase::AwaitingCommits {
            return Err(wrong_phase("awaiting_commits", &game));
        }
        if game.board(role).is_committed() {
            return Err(ArbiterError::AlreadyCommitted);
        }

        game.board_mut(role).root = Some(root);
        game.last_action_block = ledger.current_height();
        ledger.emit(Event::GridCommitted { id, player: caller });
        debug!(match_id = id, ?role, "grid committed");

        if game.board1.is_committed() && game.board2.is_committed() {
            game.phase = MatchPhase::Playing { turn: PlayerRole::Player1, pending_attack: None };
            info!(match_id = id, "both grids committed, battle begins");
            ledger.emit(Event::BothCommitted { id });
        }

        ledger.write_match(game);
        Ok(())
    }

    /// Declare a shot at the opponent's grid.
    #[instrument(skip(self, ledger), fields(caller = %caller))]
    pub fn attack<L: Ledger>(
        &self,
        ledger: &mut L,
        caller: AccountId,
        id: MatchId,
        coord: Coordinate,
    ) -> Result<(), ArbiterError> {
        let mut game = ledger.read_match(id).ok_or(ArbiterError::MatchNotFound(id))?;
        let role = game.role_of(&caller).ok_or(ArbiterError::NotParticipant)?;

        let MatchPhase::Playing { turn, pending_attack } = game.phase else {
            return Err(wrong_phase("playing", &game));
        };
        if role != turn {
            return Err(ArbiterError::NotYourTurn);
        }
        if let Some(pending) = pending_attack {
            return Err(ArbiterError::AttackPending(pending));
        }
        if !coord.is_valid() {
            return Err(ArbiterError::InvalidCoordinate(coord));
        }
        if game.board(role.other()).is_revealed(coord) {
            return Err(ArbiterError::CellAlreadyRevealed(coord));
        }

        game.phase = MatchPhase::Playing { turn, pending_attack: Some(coord) };
        game.last_action_block = ledger.current_height();
        ledger.write_match(game);

        debug!(match_id = id, %coord, "attack declared");
        ledger.emit(Event::AttackDeclared { id, attacker: caller, coord });
        Ok(())
    }

    /// Answer the pending shot by opening the targeted cell.
    ///
    /// A proof that does not fold to the defender's root, or a hit that no
    /// legal fleet could produce, ends the match for the attacker.
    #[instrument(skip(self, ledger, cell, proof), fields(caller = %caller))]
    pub fn reveal_cell<L: Ledger>(
        &self,
        ledger: &mut L,
        caller: AccountId,
        id: MatchId,
        cell: Cell,
        proof: MerkleProof,
    ) -> Result<RevealOutcome, ArbiterError> {
        let mut game = ledger.read_match(id).ok_or(ArbiterError::MatchNotFound(id))?;
        let role = game.role_of(&caller).ok_or(ArbiterError::NotParticipant)?;

        let MatchPhase::Playing { turn, pending_attack } = game.phase else {
            return Err(wrong_phase("playing", &game));
        };
        let coord = pending_attack.ok_or(ArbiterError::NoPendingAttack)?;
        if role != turn.other() {
            return Err(ArbiterError::NotDefender);
        }
        if !proof.is_well_formed() {
            return Err(ArbiterError::InvalidProofLength(proof.siblings.len()));
        }
        let root = game.board(role).root.ok_or(ArbiterError::MissingCommitment)?;

        let attacker = turn;
        let defender = role;

        if !verify_proof(&root, &proof, coord.to_index(), &cell.leaf_hash()) {
            return self.convict(ledger, &game, attacker, Cheat::InvalidProof);
        }

        let hit = cell.occupied;
        let board = game.board_mut(defender);
        board.mark_revealed(coord);
        if hit {
            board.hits_taken.push(coord);
        }
        ledger.emit(Event::AttackRevealed { id, coord, hit });
        debug!(match_id = id, %coord, hit, "attack revealed");

        let hits = if hit { game.add_hit(attacker) } else { game.hits(attacker) };

        if hit && !validate_hit_pattern(&game.board(defender).hits_taken) {
            return self.convict(ledger, &game, attacker, Cheat::IllegalHitPattern);
        }

        let now = ledger.current_height();
        game.last_action_block = now;

        if hits >= FLEET_CELLS {
            let winner = game.account(attacker).ok_or(ArbiterError::NotParticipant)?;
            game.phase = MatchPhase::PendingWinnerReveal { winner: attacker };
            ledger.write_match(game);

            info!(match_id = id, winner = %winner, "all ships sunk, awaiting winner reveal");
            ledger.emit(Event::AllShipsSunk { id, winner });
            return Ok(RevealOutcome::Hit { hits });
        }

        if game.board(defender).is_exhausted() {
            return self.convict(ledger, &game, attacker, Cheat::ShortFleet);
        }

        game.phase = MatchPhase::Playing { turn: defender, pending_attack: None };
        ledger.write_match(game);

        Ok(if hit { RevealOutcome::Hit { hits } } else { RevealOutcome::Miss })
    }

    /// Declared winner opens their whole grid; the pot follows the result.
    #[instrument(skip(self, ledger, cells), fields(caller = %caller, cells = cells.len()))]
    pub fn reveal_winner_grid<L: Ledger>(
        &self,
        ledger: &mut L,
        caller: AccountId,
        id: MatchId,
        cells: Vec<Cell>,
    ) -> Result<Termination, ArbiterError> {
        let game = ledger.read_match(id).ok_or(ArbiterError::MatchNotFound(id))?;
        let role = game.role_of(&caller).ok_or(ArbiterError::NotParticipant)?;

        let MatchPhase::PendingWinnerReveal { winner } = game.phase else {
            return Err(wrong_phase("pending_winner_reveal", &game));
        };
        if role != winner {
            return Err(ArbiterError::NotWinner);
        }
        if cells.len() != CELL_COUNT {
            return Err(ArbiterError::InvalidGridSize(cells.len()));
        }
        let root = game.board(role).root.ok_or(ArbiterError::MissingCommitment)?;
        if !verify_grid_root(&cells, &root) {
            return Err(ArbiterError::GridCommitmentMismatch);
        }

        let loser = game.account(winner.other()).ok_or(ArbiterError::NotParticipant)?;

        match validate_fleet(&cells) {
            Ok(()) => {
                let settlement = settlement::finalize(ledger, &game, caller, loser, EndReason::Victory)?;
                Ok(Termination::Settled(settlement))
            }
            Err(violation) => {
                warn!(match_id = id, %violation, policy = ?self.config.fleet_violation_policy, "winner revealed an illegal fleet");
                match self.config.fleet_violation_policy {
                    FleetViolationPolicy::AwardOpponent => {
                        let settlement =
                            settlement::finalize(ledger, &game, loser, caller, EndReason::Cheating)?;
                        Ok(Termination::Settled(settlement))
                    }
                    FleetViolationPolicy::RefundBoth => {
                        let refunded = settlement::refund(ledger, &game)?;
                        Ok(Termination::Cancelled { refunded })
                    }
                }
            }
        }
    }

    /// Win because the other party stopped acting.
    ///
    /// While waiting for an opponent the creator may instead cancel and
    /// recover their stake.
    #[instrument(skip(self, ledger), fields(caller = %caller))]
    pub fn claim_timeout_win<L: Ledger>(
        &self,
        ledger: &mut L,
        caller: AccountId,
        id: MatchId,
    ) -> Result<Termination, ArbiterError> {
        let game = ledger.read_match(id).ok_or(ArbiterError::MatchNotFound(id))?;
        let role = game.role_of(&caller).ok_or(ArbiterError::NotParticipant)?;

        // Eligibility before elapsed time: a caller who can never claim is
        // not told to wait.
        let loser = if game.phase == MatchPhase::WaitingForOpponent {
            None
        } else {
            let awaited = game.awaited().ok_or(ArbiterError::CannotClaimTimeout)?;
            if awaited == role {
                return Err(ArbiterError::CannotClaimTimeout);
            }
            Some(game.account(awaited).ok_or(ArbiterError::CannotClaimTimeout)?)
        };

        let idle = game.idle_for(ledger.current_height());
        if idle < self.config.turn_timeout {
            return Err(ArbiterError::TimeoutNotReached {
                remaining: self.config.turn_timeout - idle,
            });
        }

        let Some(loser) = loser else {
            let refunded = settlement::refund(ledger, &game)?;
            return Ok(Termination::Cancelled { refunded });
        };

        let settlement = settlement::finalize(ledger, &game, caller, loser, EndReason::Timeout)?;
        Ok(Termination::Settled(settlement))
    }

    /// Give up. The lone creator of an unjoined match is refunded instead.
    #[instrument(skip(self, ledger), fields(caller = %caller))]
    pub fn surrender<L: Ledger>(
        &self,
        ledger: &mut L,
        caller: AccountId,
        id: MatchId,
    ) -> Result<Termination, ArbiterError> {
        let game = ledger.read_match(id).ok_or(ArbiterError::MatchNotFound(id))?;
        let role = game.role_of(&caller).ok_or(ArbiterError::NotParticipant)?;

        if game.phase == MatchPhase::WaitingForOpponent {
            let refunded = settlement::refund(ledger, &game)?;
            return Ok(Termination::Cancelled { refunded });
        }

        let winner = game.account(role.other()).ok_or(ArbiterError::NotParticipant)?;
        let settlement = settlement::finalize(ledger, &game, winner, caller, EndReason::Surrender)?;
        Ok(Termination::Settled(settlement))
    }

    /// Matches idle for at least the abandon timeout, oldest id first.
    pub fn abandoned<L: Ledger>(&self, ledger: &L, limit: usize) -> Vec<MatchId> {
        let now = ledger.current_height();
        ledger
            .match_ids()
            .into_iter()
            .filter(|id| {
                ledger
                    .read_match(*id)
                    .is_some_and(|game| game.idle_for(now) >= self.config.abandon_timeout)
            })
            .take(limit)
            .collect()
    }

    /// Burn one abandoned match's escrow and delete it.
    pub fn reap<L: Ledger>(&self, ledger: &mut L, id: MatchId) -> Result<Balance, ArbiterError> {
        let game = ledger.read_match(id).ok_or(ArbiterError::MatchNotFound(id))?;
        let idle = game.idle_for(ledger.current_height());
        if idle < self.config.abandon_timeout {
            return Err(ArbiterError::TimeoutNotReached {
                remaining: self.config.abandon_timeout - idle,
            });
        }
        Ok(settlement::burn(ledger, &game)?)
    }

    /// Reap up to `limit` abandoned matches. Failures are logged and skipped.
    pub fn reap_abandoned<L: Ledger>(&self, ledger: &mut L, limit: usize) -> Vec<(MatchId, Balance)> {
        let mut reaped = Vec::new();
        for id in self.abandoned(ledger, limit) {
            match self.reap(ledger, id) {
                Ok(burned) => reaped.push((id, burned)),
                Err(e) => warn!(match_id = id, error = %e, "failed to reap match"),
            }
        }
        reaped
    }

    /// End the match for the attacker after catching the defender.
    fn convict<L: Ledger>(
        &self,
        ledger: &mut L,
        game: &Match,
        attacker: PlayerRole,
        evidence: Cheat,
    ) -> Result<RevealOutcome, ArbiterError> {
        let winner = game.account(attacker).ok_or(ArbiterError::NotParticipant)?;
        let loser = game.account(attacker.other()).ok_or(ArbiterError::NotParticipant)?;

        warn!(match_id = game.id, cheater = %loser, %evidence, "defender caught cheating");

        let settlement = settlement::finalize(ledger, game, winner, loser, EndReason::Cheating)?;
        Ok(RevealOutcome::Cheating { evidence, settlement })
    }
}
