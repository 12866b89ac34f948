//! Client Orchestrator
//!
//! One player's side of a match. [`ClientState`] is a pure mirror of the
//! match, fed by ledger notifications, that knows the single legal next
//! move. [`Orchestrator`] keeps the secret board (salts included) until the
//! match ends and drives the mirror against a running ledger node.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, instrument, trace, warn};

use crate::core::ids::{AccountId, Balance, BlockHeight, MatchId};
use crate::game::arbiter::ErrorCode;
use crate::game::events::{EndReason, Event};
use crate::game::grid::{Coordinate, CELL_COUNT, FLEET_CELLS};
use crate::game::state::{MatchPhase, PlayerRole};
use crate::network::node::{LedgerHandle, NodeError};
use crate::network::protocol::{Call, CallResult, MatchView, Notification, Receipt};
use crate::proof::commitment::SecretBoard;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Ledger node unreachable.
    #[error(transparent)]
    Node(#[from] NodeError),

    /// The ledger rejected a call; local state has been resynced.
    #[error("rejected ({code:?}): {message}")]
    Rejected {
        /// Rejection code.
        code: ErrorCode,
        /// Ledger's message.
        message: String,
    },

    /// Not in a match.
    #[error("not in a match")]
    NoMatch,

    /// Operation not available in the current client phase.
    #[error("cannot {action} while {phase:?}")]
    WrongPhase {
        /// Attempted operation.
        action: &'static str,
        /// Current phase.
        phase: ClientPhase,
    },

    /// Secret board needed but not loaded.
    #[error("secret board missing")]
    MissingBoard,

    /// Every opponent cell has been shot.
    #[error("no cell left to target")]
    NoTarget,

    /// The ledger answered with a result of the wrong kind.
    #[error("unexpected call result")]
    UnexpectedReceipt,
}

/// UI-facing phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientPhase {
    /// No match.
    #[default]
    Menu,
    /// Create submitted.
    Creating,
    /// Match open, no opponent yet.
    WaitingOpponent,
    /// Opponent seated; our root is due.
    Setup,
    /// Our root is in; theirs is not.
    WaitingCommit,
    /// Shots are being exchanged.
    Battle,
    /// All ships of one side sunk; winner reveal due.
    Revealing,
    /// Match over.
    Finished,
}

/// How the match ended for this player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    /// We were paid.
    Won {
        /// Why.
        reason: EndReason,
        /// Amount received.
        prize: Balance,
    },
    /// The opponent was paid.
    Lost {
        /// Why.
        reason: EndReason,
    },
    /// Stakes returned.
    Cancelled {
        /// Amount returned to us.
        refunded: Balance,
    },
    /// Reaped for inactivity; stakes burned.
    Abandoned,
    /// The match disappeared without us seeing why.
    Unknown,
}

/// The single operation that makes progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextAction {
    /// Nothing to do until the ledger moves.
    Wait,
    /// Open a match.
    Create,
    /// Commit a grid root.
    Commit,
    /// Shoot.
    Attack,
    /// Answer the shot at `coord`.
    Reveal {
        /// Pending target on our grid.
        coord: Coordinate,
    },
    /// Open our whole grid as declared winner.
    RevealGrid,
    /// The opponent's time is up.
    ClaimTimeout,
    /// Match over.
    Done,
}

// =============================================================================
// STATE MIRROR
// =============================================================================

/// Local view of one match.
#[derive(Clone, Debug)]
pub struct ClientState {
    account: AccountId,
    phase: ClientPhase,
    match_id: Option<MatchId>,
    role: Option<PlayerRole>,
    my_turn: bool,
    /// Shot at our grid awaiting our reveal.
    incoming: Option<Coordinate>,
    /// Our shot awaiting their reveal.
    outgoing: Option<Coordinate>,
    /// Our resolved shots and whether they hit.
    shots: BTreeMap<Coordinate, bool>,
    hits: u8,
    owes_grid: bool,
    height: BlockHeight,
    /// Events at or below this height are already in the last resync.
    synced_through: BlockHeight,
    last_action_block: BlockHeight,
    result: Option<MatchResult>,
}

impl ClientState {
    /// Fresh state in the menu.
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            phase: ClientPhase::Menu,
            match_id: None,
            role: None,
            my_turn: false,
            incoming: None,
            outgoing: None,
            shots: BTreeMap::new(),
            hits: 0,
            owes_grid: false,
            height: 0,
            synced_through: 0,
            last_action_block: 0,
            result: None,
        }
    }

    /// Local account.
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// Current phase.
    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    /// Match being played.
    pub fn match_id(&self) -> Option<MatchId> {
        self.match_id
    }

    /// Our seat.
    pub fn role(&self) -> Option<PlayerRole> {
        self.role
    }

    /// Whether we attack next.
    pub fn is_my_turn(&self) -> bool {
        self.my_turn
    }

    /// Shot at our grid that we must answer.
    pub fn incoming(&self) -> Option<Coordinate> {
        self.incoming
    }

    /// Our unanswered shot.
    pub fn outgoing(&self) -> Option<Coordinate> {
        self.outgoing
    }

    /// Our resolved shots.
    pub fn shots(&self) -> &BTreeMap<Coordinate, bool> {
        &self.shots
    }

    /// Ship cells we have hit.
    pub fn hits(&self) -> u8 {
        self.hits
    }

    /// Last sealed block seen.
    pub fn height(&self) -> BlockHeight {
        self.height
    }

    /// Block of the last action in our match.
    pub fn last_action_block(&self) -> BlockHeight {
        self.last_action_block
    }

    /// Outcome once finished.
    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    /// Whether the match is over.
    pub fn is_finished(&self) -> bool {
        self.phase == ClientPhase::Finished
    }

    fn finish(&mut self, result: MatchResult) {
        self.phase = ClientPhase::Finished;
        self.my_turn = false;
        self.incoming = None;
        self.outgoing = None;
        self.result = Some(result);
    }

    /// Fold one notification into the mirror.
    pub fn apply_notification(&mut self, notification: &Notification) {
        match notification {
            Notification::Event { block, event } => self.apply_event(*block, event),
            Notification::Block(header) => self.height = self.height.max(header.height),
        }
    }

    /// Fold one ledger event into the mirror. Events of other matches, and
    /// events already covered by a resync, are ignored.
    pub fn apply_event(&mut self, block: BlockHeight, event: &Event) {
        if self.is_finished() || block <= self.synced_through {
            return;
        }

        let ours = match event {
            Event::MatchCreated { creator, .. } if self.match_id.is_none() => *creator == self.account,
            Event::OpponentJoined { opponent, .. } if *opponent == self.account => true,
            _ => self.match_id == Some(event.match_id()),
        };
        if !ours {
            return;
        }
        self.last_action_block = self.last_action_block.max(block);

        match event {
            Event::MatchCreated { id, .. } => {
                self.match_id = Some(*id);
                self.role = Some(PlayerRole::Player1);
                self.phase = ClientPhase::WaitingOpponent;
            }
            Event::OpponentJoined { id, opponent } => {
                self.match_id = Some(*id);
                if *opponent == self.account {
                    self.role = Some(PlayerRole::Player2);
                }
                self.phase = ClientPhase::Setup;
            }
            Event::GridCommitted { player, .. } => {
                if *player == self.account {
                    self.phase = ClientPhase::WaitingCommit;
                }
            }
            Event::BothCommitted { .. } => {
                self.phase = ClientPhase::Battle;
                self.my_turn = self.role == Some(PlayerRole::Player1);
            }
            Event::AttackDeclared { attacker, coord, .. } => {
                if *attacker == self.account {
                    self.outgoing = Some(*coord);
                } else {
                    self.incoming = Some(*coord);
                }
            }
            Event::AttackRevealed { coord, hit, .. } => {
                if self.outgoing == Some(*coord) {
                    self.outgoing = None;
                    self.shots.insert(*coord, *hit);
                    if *hit {
                        self.hits = self.hits.saturating_add(1).min(FLEET_CELLS);
                    }
                    self.my_turn = false;
                } else if self.incoming == Some(*coord) {
                    self.incoming = None;
                    self.my_turn = true;
                }
            }
            Event::AllShipsSunk { winner, .. } => {
                self.phase = ClientPhase::Revealing;
                self.my_turn = false;
                self.owes_grid = *winner == self.account;
            }
            Event::MatchEnded { winner, reason, prize, .. } => {
                let result = if *winner == self.account {
                    MatchResult::Won { reason: *reason, prize: *prize }
                } else {
                    MatchResult::Lost { reason: *reason }
                };
                self.finish(result);
            }
            Event::MatchCancelled { refunded, .. } => {
                let refunded = refunded
                    .iter()
                    .filter(|(account, _)| *account == self.account)
                    .map(|(_, amount)| *amount)
                    .sum();
                self.finish(MatchResult::Cancelled { refunded });
            }
            Event::MatchAbandoned { .. } => self.finish(MatchResult::Abandoned),
        }
    }

    /// Replace the mirror with the ledger's authoritative record taken at
    /// `height`.
    ///
    /// `None` means the match no longer exists.
    pub fn resync(&mut self, view: Option<&MatchView>, height: BlockHeight) {
        if self.is_finished() {
            return;
        }
        self.height = self.height.max(height);
        self.synced_through = self.synced_through.max(height);

        let Some(view) = view else {
            if self.match_id.is_some() {
                self.finish(MatchResult::Unknown);
            }
            return;
        };

        let game = &view.game;
        let Some(role) = game.role_of(&self.account) else {
            return;
        };

        self.match_id = Some(game.id);
        self.role = Some(role);
        self.hits = game.hits(role);
        self.last_action_block = game.last_action_block;
        self.my_turn = false;
        self.incoming = None;
        self.outgoing = None;
        self.owes_grid = false;

        let target = game.board(role.other());
        self.shots = (0..CELL_COUNT)
            .filter_map(Coordinate::from_index)
            .filter(|coord| target.is_revealed(*coord))
            .map(|coord| (coord, target.hits_taken.contains(&coord)))
            .collect();

        self.phase = match game.phase {
            MatchPhase::WaitingForOpponent => ClientPhase::WaitingOpponent,
            MatchPhase::AwaitingCommits if game.board(role).is_committed() => ClientPhase::WaitingCommit,
            MatchPhase::AwaitingCommits => ClientPhase::Setup,
            MatchPhase::Playing { turn, pending_attack } => {
                self.my_turn = turn == role;
                match pending_attack {
                    Some(coord) if turn == role => self.outgoing = Some(coord),
                    Some(coord) => self.incoming = Some(coord),
                    None => {}
                }
                ClientPhase::Battle
            }
            MatchPhase::PendingWinnerReveal { winner } => {
                self.owes_grid = winner == role;
                ClientPhase::Revealing
            }
        };
    }

    /// The single operation that moves the match forward for us.
    pub fn next_action(&self, turn_timeout: BlockHeight) -> NextAction {
        let idle = self.height.saturating_sub(self.last_action_block);
        let wait_or_claim = if idle >= turn_timeout { NextAction::ClaimTimeout } else { NextAction::Wait };

        match self.phase {
            ClientPhase::Menu => NextAction::Create,
            ClientPhase::Creating | ClientPhase::WaitingOpponent => NextAction::Wait,
            ClientPhase::Setup => NextAction::Commit,
            ClientPhase::WaitingCommit => wait_or_claim,
            ClientPhase::Battle => match self.incoming {
                Some(coord) => NextAction::Reveal { coord },
                None if self.my_turn && self.outgoing.is_none() => NextAction::Attack,
                None => wait_or_claim,
            },
            ClientPhase::Revealing if self.owes_grid => NextAction::RevealGrid,
            ClientPhase::Revealing => wait_or_claim,
            ClientPhase::Finished => NextAction::Done,
        }
    }

    /// Pick a target: neighbours of earlier hits first, then a checkerboard
    /// sweep, then anything left.
    pub fn next_target<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Coordinate> {
        let unshot = |coord: &Coordinate| !self.shots.contains_key(coord);

        let chasing: Vec<Coordinate> = self
            .shots
            .iter()
            .filter(|(_, hit)| **hit)
            .flat_map(|(coord, _)| neighbours(*coord))
            .filter(unshot)
            .collect();
        if let Some(coord) = chasing.choose(rng) {
            return Some(*coord);
        }

        let open: Vec<Coordinate> = (0..CELL_COUNT)
            .filter_map(Coordinate::from_index)
            .filter(unshot)
            .collect();
        let sweep: Vec<Coordinate> = open.iter().copied().filter(|c| (c.x + c.y) % 2 == 0).collect();

        sweep.choose(rng).or_else(|| open.choose(rng)).copied()
    }
}

fn neighbours(coord: Coordinate) -> impl Iterator<Item = Coordinate> {
    [(0i8, -1i8), (0, 1), (-1, 0), (1, 0)]
        .into_iter()
        .filter_map(move |(dx, dy)| {
            let next = Coordinate::new(coord.x.checked_add_signed(dx)?, coord.y.checked_add_signed(dy)?);
            next.is_valid().then_some(next)
        })
}

// =============================================================================
// DRIVER
// =============================================================================

/// Plays one account's matches against a ledger node.
pub struct Orchestrator {
    handle: LedgerHandle,
    notifications: broadcast::Receiver<Notification>,
    state: ClientState,
    board: Option<SecretBoard>,
    turn_timeout: BlockHeight,
    rng: StdRng,
}

impl Orchestrator {
    /// Subscribe to the node as `account`.
    pub async fn connect(
        handle: LedgerHandle,
        account: AccountId,
        turn_timeout: BlockHeight,
    ) -> Result<Self, ClientError> {
        Self::connect_with_rng(handle, account, turn_timeout, StdRng::from_entropy()).await
    }

    /// As [`Orchestrator::connect`], with a caller-supplied rng for salts
    /// and targeting.
    pub async fn connect_with_rng(
        handle: LedgerHandle,
        account: AccountId,
        turn_timeout: BlockHeight,
        rng: StdRng,
    ) -> Result<Self, ClientError> {
        let notifications = handle.subscribe().await?;
        let mut orchestrator = Self {
            handle,
            notifications,
            state: ClientState::new(account),
            board: None,
            turn_timeout,
            rng,
        };
        orchestrator.state.height = orchestrator.handle.height().await?;
        Ok(orchestrator)
    }

    /// Local mirror.
    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Our committed board, salts included.
    pub fn board(&self) -> Option<&SecretBoard> {
        self.board.as_ref()
    }

    /// Catch up with the ledger's record of our match.
    pub async fn sync(&mut self) -> Result<(), ClientError> {
        self.resync().await
    }

    /// Forget the finished match and return to the menu.
    pub fn reset(&mut self) {
        self.state = ClientState::new(self.state.account);
        self.board = None;
    }

    fn expect_phase(&self, phase: ClientPhase, action: &'static str) -> Result<(), ClientError> {
        if self.state.phase != phase {
            return Err(ClientError::WrongPhase { action, phase: self.state.phase });
        }
        Ok(())
    }

    fn current_match(&self) -> Result<MatchId, ClientError> {
        self.state.match_id.ok_or(ClientError::NoMatch)
    }

    fn secret_board(&self) -> Result<&SecretBoard, ClientError> {
        self.board.as_ref().ok_or(ClientError::MissingBoard)
    }

    /// Open a match.
    #[instrument(skip(self), fields(account = %self.state.account))]
    pub async fn create(&mut self, stake: Balance) -> Result<MatchId, ClientError> {
        self.expect_phase(ClientPhase::Menu, "create")?;
        self.state.phase = ClientPhase::Creating;

        match self.submit(Call::CreateGame { stake }).await {
            Ok(CallResult::Created { id }) => {
                info!(match_id = id, %stake, "match created");
                Ok(id)
            }
            Ok(_) => Err(ClientError::UnexpectedReceipt),
            Err(e) => {
                if self.state.phase == ClientPhase::Creating {
                    self.state.phase = ClientPhase::Menu;
                }
                Err(e)
            }
        }
    }

    /// Join an open match.
    #[instrument(skip(self), fields(account = %self.state.account))]
    pub async fn join(&mut self, id: MatchId, stake: Balance) -> Result<(), ClientError> {
        self.expect_phase(ClientPhase::Menu, "join")?;
        self.submit(Call::JoinGame { id, stake }).await?;
        info!(match_id = id, "joined match");
        Ok(())
    }

    /// Commit `board` and keep it for later reveals.
    #[instrument(skip(self, board), fields(account = %self.state.account))]
    pub async fn commit(&mut self, board: SecretBoard) -> Result<(), ClientError> {
        self.expect_phase(ClientPhase::Setup, "commit")?;
        let id = self.current_match()?;
        let root = board.root();
        self.board = Some(board);
        self.submit(Call::CommitGrid { id, root }).await?;
        Ok(())
    }

    /// Give up (or cancel an unjoined match).
    pub async fn surrender(&mut self) -> Result<(), ClientError> {
        let id = self.current_match()?;
        self.submit(Call::Surrender { id }).await?;
        Ok(())
    }

    /// Take the next action, or wait for one notification if there is none.
    pub async fn step(&mut self) -> Result<(), ClientError> {
        match self.state.next_action(self.turn_timeout) {
            NextAction::Done => Ok(()),
            NextAction::Create => Err(ClientError::NoMatch),
            NextAction::Wait => self.next_notification().await.map(drop),
            NextAction::Commit => {
                let board = SecretBoard::random(&mut self.rng);
                self.commit(board).await
            }
            NextAction::Attack => {
                let id = self.current_match()?;
                let coord = self.state.next_target(&mut self.rng).ok_or(ClientError::NoTarget)?;
                debug!(match_id = id, %coord, "attacking");
                self.submit(Call::Attack { id, coord }).await.map(drop)
            }
            NextAction::Reveal { coord } => {
                let id = self.current_match()?;
                let reveal = self.secret_board()?.reveal(coord).ok_or(ClientError::MissingBoard)?;
                self.submit(Call::RevealCell { id, reveal }).await.map(drop)
            }
            NextAction::RevealGrid => {
                let id = self.current_match()?;
                let cells = self.secret_board()?.full_reveal();
                info!(match_id = id, "revealing full grid");
                self.submit(Call::RevealWinnerGrid { id, cells }).await.map(drop)
            }
            NextAction::ClaimTimeout => {
                let id = self.current_match()?;
                let idle = self.state.height.saturating_sub(self.state.last_action_block);
                info!(match_id = id, idle, "claiming timeout");
                self.submit(Call::ClaimTimeoutWin { id }).await.map(drop)
            }
        }
    }

    /// Drive the current match to its end.
    ///
    /// Rejections are expected when racing the opponent; the mirror is
    /// resynced and play continues from the authoritative state.
    #[instrument(skip(self), fields(account = %self.state.account))]
    pub async fn play(&mut self) -> Result<MatchResult, ClientError> {
        loop {
            if let Some(result) = self.state.result() {
                info!(?result, "match finished");
                return Ok(result.clone());
            }
            match self.step().await {
                Ok(()) => {}
                Err(ClientError::Rejected { code, .. }) => {
                    debug!(?code, "continuing after rejection");
                    self.next_notification().await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Submit and wait until the including block's notifications are
    /// applied.
    async fn submit(&mut self, call: Call) -> Result<CallResult, ClientError> {
        let name = call.name();
        let receipt = self.handle.submit(self.state.account, call).await?;
        debug!(call = name, block = receipt.block(), included = receipt.is_included(), "receipt");
        match receipt {
            Receipt::Included { block, result } => {
                self.await_block(block).await?;
                Ok(result)
            }
            Receipt::Rejected { code, message, .. } => {
                warn!(call = name, ?code, %message, "call rejected");
                self.resync().await?;
                Err(ClientError::Rejected { code, message })
            }
        }
    }

    async fn await_block(&mut self, block: BlockHeight) -> Result<(), ClientError> {
        while self.state.height < block {
            self.next_notification().await?;
        }
        Ok(())
    }

    async fn next_notification(&mut self) -> Result<Notification, ClientError> {
        loop {
            match self.notifications.recv().await {
                Ok(notification) => {
                    trace!(block = notification.block(), "notification");
                    self.state.apply_notification(&notification);
                    return Ok(notification);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notifications lagged, resyncing");
                    self.resync().await?;
                }
                Err(RecvError::Closed) => return Err(NodeError::Stopped.into()),
            }
        }
    }

    /// Reload the authoritative match record.
    async fn resync(&mut self) -> Result<(), ClientError> {
        let id = match self.state.match_id {
            Some(id) => Some(id),
            None => self.handle.player_match(self.state.account).await?,
        };
        let view = match id {
            Some(id) => self.handle.view(id).await?,
            None => None,
        };
        let height = match &view {
            Some(view) => view.height,
            None => self.handle.height().await?,
        };
        self.state.resync(view.as_ref(), height);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{ArbiterConfig, NodeConfig};
    use crate::game::grid::tests::standard_grid;
    use crate::game::state::Match;
    use crate::ledger::InMemoryLedger;
    use crate::network::node::LedgerNode;
    use crate::network::protocol::BlockHeader;

    fn alice() -> AccountId {
        AccountId::new([1; 16])
    }

    fn bob() -> AccountId {
        AccountId::new([2; 16])
    }

    fn header(height: BlockHeight) -> Notification {
        Notification::Block(BlockHeader { height, timestamp: chrono::Utc::now(), calls: 0, events: 0 })
    }

    /// Alice's mirror after a match reached play.
    fn battling() -> ClientState {
        let mut state = ClientState::new(alice());
        state.apply_event(1, &Event::MatchCreated { id: 0, creator: alice(), stake: 10 });
        state.apply_event(2, &Event::OpponentJoined { id: 0, opponent: bob() });
        state.apply_event(3, &Event::GridCommitted { id: 0, player: alice() });
        state.apply_event(4, &Event::GridCommitted { id: 0, player: bob() });
        state.apply_event(4, &Event::BothCommitted { id: 0 });
        state.apply_notification(&header(4));
        state
    }

    #[test]
    fn test_setup_phases() {
        let mut state = ClientState::new(alice());
        assert_eq!(state.next_action(20), NextAction::Create);

        state.apply_event(1, &Event::MatchCreated { id: 7, creator: bob(), stake: 10 });
        assert_eq!(state.match_id(), None);

        state.apply_event(1, &Event::MatchCreated { id: 8, creator: alice(), stake: 10 });
        assert_eq!(state.phase(), ClientPhase::WaitingOpponent);
        assert_eq!(state.role(), Some(PlayerRole::Player1));

        state.apply_event(2, &Event::OpponentJoined { id: 8, opponent: bob() });
        assert_eq!(state.next_action(20), NextAction::Commit);

        state.apply_event(3, &Event::GridCommitted { id: 8, player: alice() });
        assert_eq!(state.phase(), ClientPhase::WaitingCommit);
        assert_eq!(state.next_action(20), NextAction::Wait);

        state.apply_notification(&header(23));
        assert_eq!(state.next_action(20), NextAction::ClaimTimeout);
    }

    #[test]
    fn test_joiner_sees_own_join() {
        let mut state = ClientState::new(bob());
        state.apply_event(2, &Event::OpponentJoined { id: 3, opponent: bob() });
        assert_eq!(state.match_id(), Some(3));
        assert_eq!(state.role(), Some(PlayerRole::Player2));
        assert_eq!(state.phase(), ClientPhase::Setup);
    }

    #[test]
    fn test_battle_turns() {
        let mut state = battling();
        assert!(state.is_my_turn());
        assert_eq!(state.next_action(20), NextAction::Attack);

        let target = Coordinate::new(0, 0);
        state.apply_event(5, &Event::AttackDeclared { id: 0, attacker: alice(), coord: target });
        assert_eq!(state.next_action(20), NextAction::Wait);

        state.apply_event(6, &Event::AttackRevealed { id: 0, coord: target, hit: true });
        assert_eq!(state.hits(), 1);
        assert_eq!(state.shots().get(&target), Some(&true));
        assert!(!state.is_my_turn());

        let incoming = Coordinate::new(4, 4);
        state.apply_event(7, &Event::AttackDeclared { id: 0, attacker: bob(), coord: incoming });
        assert_eq!(state.next_action(20), NextAction::Reveal { coord: incoming });

        state.apply_event(8, &Event::AttackRevealed { id: 0, coord: incoming, hit: false });
        assert_eq!(state.next_action(20), NextAction::Attack);
    }

    #[test]
    fn test_other_matches_ignored() {
        let mut state = battling();
        state.apply_event(5, &Event::AttackDeclared { id: 1, attacker: bob(), coord: Coordinate::new(1, 1) });
        assert_eq!(state.incoming(), None);
        assert_eq!(state.last_action_block(), 4);
    }

    #[test]
    fn test_revealing_and_results() {
        let mut state = battling();
        state.apply_event(9, &Event::AllShipsSunk { id: 0, winner: alice() });
        assert_eq!(state.next_action(20), NextAction::RevealGrid);

        state.apply_event(10, &Event::MatchEnded {
            id: 0,
            winner: alice(),
            loser: bob(),
            reason: EndReason::Victory,
            prize: 20,
        });
        assert!(state.is_finished());
        assert_eq!(state.result(), Some(&MatchResult::Won { reason: EndReason::Victory, prize: 20 }));
        assert_eq!(state.next_action(20), NextAction::Done);

        let mut loser = ClientState::new(bob());
        loser.apply_event(2, &Event::OpponentJoined { id: 0, opponent: bob() });
        loser.apply_event(9, &Event::AllShipsSunk { id: 0, winner: alice() });
        assert_eq!(loser.next_action(20), NextAction::Wait);
        loser.apply_event(10, &Event::MatchCancelled { id: 0, refunded: vec![(alice(), 10), (bob(), 10)] });
        assert_eq!(loser.result(), Some(&MatchResult::Cancelled { refunded: 10 }));
    }

    #[test]
    fn test_resync_from_record() {
        let mut game = Match::new(5, alice(), 10, 1);
        game.player2 = Some(bob());
        game.board1.root = Some([1; 32]);
        game.board2.root = Some([2; 32]);
        game.board1.mark_revealed(Coordinate::new(2, 2));
        game.board2.mark_revealed(Coordinate::new(0, 0));
        game.board2.hits_taken.push(Coordinate::new(0, 0));
        game.hits1 = 1;
        game.phase = MatchPhase::Playing { turn: PlayerRole::Player2, pending_attack: Some(Coordinate::new(3, 3)) };
        game.last_action_block = 12;
        let view = MatchView { game, escrowed: 20, timeout_at: 32, height: 14 };

        let mut state = ClientState::new(alice());
        state.resync(Some(&view), view.height);
        assert_eq!(state.phase(), ClientPhase::Battle);
        assert_eq!(state.incoming(), Some(Coordinate::new(3, 3)));
        assert_eq!(state.hits(), 1);
        assert_eq!(state.shots().len(), 1);
        assert_eq!(state.shots().get(&Coordinate::new(0, 0)), Some(&true));
        assert_eq!(state.height(), 14);

        // Already part of the snapshot.
        state.apply_event(13, &Event::AttackRevealed { id: 5, coord: Coordinate::new(3, 3), hit: true });
        assert_eq!(state.incoming(), Some(Coordinate::new(3, 3)));

        state.resync(None, 15);
        assert_eq!(state.result(), Some(&MatchResult::Unknown));
    }

    #[test]
    fn test_targeting_chases_hits() {
        let mut state = battling();
        let mut rng = StdRng::seed_from_u64(4);
        state.shots.insert(Coordinate::new(0, 0), true);
        state.shots.insert(Coordinate::new(1, 0), false);

        assert_eq!(state.next_target(&mut rng), Some(Coordinate::new(0, 1)));

        for index in 0..CELL_COUNT {
            if let Some(coord) = Coordinate::from_index(index) {
                state.shots.insert(coord, false);
            }
        }
        assert_eq!(state.next_target(&mut rng), None);
    }

    #[test]
    fn test_sweep_prefers_checkerboard() {
        let state = battling();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..20 {
            let coord = state.next_target(&mut rng).unwrap();
            assert_eq!((coord.x + coord.y) % 2, 0);
        }
    }

    #[tokio::test]
    async fn test_two_orchestrators_finish_a_match() {
        let config = NodeConfig {
            block_interval: Duration::from_millis(5),
            arbiter: ArbiterConfig { turn_timeout: 1_000, abandon_timeout: 10_000, ..ArbiterConfig::default() },
            ..NodeConfig::default()
        };
        let turn_timeout = config.arbiter.turn_timeout;
        let (node, handle) = LedgerNode::new(config, InMemoryLedger::new()).unwrap();
        let task = node.spawn();

        handle.deposit(alice(), 1_000).await.unwrap();
        handle.deposit(bob(), 1_000).await.unwrap();

        let mut p1 = Orchestrator::connect_with_rng(handle.clone(), alice(), turn_timeout, StdRng::seed_from_u64(1))
            .await
            .unwrap();
        let mut p2 = Orchestrator::connect_with_rng(handle.clone(), bob(), turn_timeout, StdRng::seed_from_u64(2))
            .await
            .unwrap();

        let id = p1.create(100).await.unwrap();
        p2.join(id, 100).await.unwrap();
        p1.sync().await.unwrap();
        assert_eq!(p1.state().phase(), ClientPhase::Setup);
        p1.commit(SecretBoard::new(standard_grid(1)).unwrap()).await.unwrap();
        p2.commit(SecretBoard::new(standard_grid(2)).unwrap()).await.unwrap();

        let (r1, r2) = tokio::join!(p1.play(), p2.play());
        let (r1, r2) = (r1.unwrap(), r2.unwrap());

        let (winner, loser) = match (&r1, &r2) {
            (MatchResult::Won { prize, .. }, MatchResult::Lost { .. }) => {
                assert_eq!(*prize, 200);
                (alice(), bob())
            }
            (MatchResult::Lost { .. }, MatchResult::Won { prize, .. }) => {
                assert_eq!(*prize, 200);
                (bob(), alice())
            }
            other => panic!("unexpected results: {:?}", other),
        };

        assert_eq!(handle.balance(winner).await.unwrap(), 1_100);
        assert_eq!(handle.balance(loser).await.unwrap(), 900);
        assert_eq!(handle.player_match(alice()).await.unwrap(), None);
        assert_eq!(handle.view(id).await.unwrap(), None);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_create_returns_to_menu() {
        let config = NodeConfig { block_interval: Duration::from_millis(5), ..NodeConfig::default() };
        let (node, handle) = LedgerNode::new(config, InMemoryLedger::new()).unwrap();
        let task = node.spawn();

        let mut client = Orchestrator::connect(handle.clone(), alice(), 20).await.unwrap();
        let err = client.create(50).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected { code: ErrorCode::InsufficientBalance, .. }));
        assert_eq!(client.state().phase(), ClientPhase::Menu);

        assert!(matches!(client.commit(SecretBoard::new(standard_grid(1)).unwrap()).await, Err(ClientError::WrongPhase { .. })));

        handle.shutdown();
        task.await.unwrap();
    }
}
