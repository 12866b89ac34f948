//! Ledger Node
//!
//! Single-writer block producer. Players talk to it through a cloneable
//! [`LedgerHandle`]; submissions queue until the next block, where each one
//! runs atomically against the ledger in arrival order. Every block first
//! reaps abandoned matches, then applies calls, then pushes its events and
//! header to subscribers.

use std::collections::VecDeque;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigError, NodeConfig};
use crate::core::ids::{AccountId, Balance, BlockHeight, MatchId};
use crate::game::arbiter::{Arbiter, ArbiterError};
use crate::ledger::{InMemoryLedger, Ledger};
use crate::network::protocol::{
    BlockHeader, Call, CallResult, MatchView, Notification, Receipt, Transaction,
};

/// Node errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    /// The node task has exited.
    #[error("ledger node stopped")]
    Stopped,
}

enum Command {
    Submit { tx: Transaction, reply: oneshot::Sender<Receipt> },
    View { id: MatchId, reply: oneshot::Sender<Option<MatchView>> },
    PlayerMatch { account: AccountId, reply: oneshot::Sender<Option<MatchId>> },
    Balance { account: AccountId, reply: oneshot::Sender<Balance> },
    Deposit { account: AccountId, amount: Balance, reply: oneshot::Sender<Balance> },
    Height { reply: oneshot::Sender<BlockHeight> },
    Subscribe { reply: oneshot::Sender<broadcast::Receiver<Notification>> },
}

/// Route one transaction to the arbiter.
pub fn dispatch<L: Ledger>(
    arbiter: &Arbiter,
    ledger: &mut L,
    tx: &Transaction,
) -> Result<CallResult, ArbiterError> {
    let sender = tx.sender;
    let result = match &tx.call {
        Call::CreateGame { stake } => {
            CallResult::Created { id: arbiter.create_game(ledger, sender, *stake)? }
        }
        Call::JoinGame { id, stake } => {
            arbiter.join_game(ledger, sender, *id, *stake)?;
            CallResult::Done
        }
        Call::CommitGrid { id, root } => {
            arbiter.commit_grid(ledger, sender, *id, *root)?;
            CallResult::Done
        }
        Call::Attack { id, coord } => {
            arbiter.attack(ledger, sender, *id, *coord)?;
            CallResult::Done
        }
        Call::RevealCell { id, reveal } => CallResult::Revealed(arbiter.reveal_cell(
            ledger,
            sender,
            *id,
            reveal.cell.clone(),
            reveal.proof.clone(),
        )?),
        Call::RevealWinnerGrid { id, cells } => {
            CallResult::Terminated(arbiter.reveal_winner_grid(ledger, sender, *id, cells.clone())?)
        }
        Call::ClaimTimeoutWin { id } => {
            CallResult::Terminated(arbiter.claim_timeout_win(ledger, sender, *id)?)
        }
        Call::Surrender { id } => CallResult::Terminated(arbiter.surrender(ledger, sender, *id)?),
    };
    Ok(result)
}

/// The block-producing ledger service.
pub struct LedgerNode {
    config: NodeConfig,
    arbiter: Arbiter,
    ledger: InMemoryLedger,
    commands: mpsc::Receiver<Command>,
    pending: VecDeque<(Transaction, oneshot::Sender<Receipt>)>,
    notifications: broadcast::Sender<Notification>,
    shutdown: broadcast::Receiver<()>,
}

impl LedgerNode {
    /// Build a node over `ledger` and the handle that drives it.
    ///
    /// Fails if `config` does not validate.
    pub fn new(config: NodeConfig, ledger: InMemoryLedger) -> Result<(Self, LedgerHandle), ConfigError> {
        config.validate()?;

        let (command_tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let (notifications, _) = broadcast::channel(config.event_buffer.max(1));
        let (shutdown_tx, shutdown) = broadcast::channel(1);

        let handle = LedgerHandle { commands: command_tx, shutdown: shutdown_tx };
        let node = Self {
            arbiter: Arbiter::new(config.arbiter.clone()),
            config,
            ledger,
            commands,
            pending: VecDeque::new(),
            notifications,
            shutdown,
        };
        Ok((node, handle))
    }

    /// Run on the tokio runtime.
    pub fn spawn(self) -> JoinHandle<InMemoryLedger> {
        tokio::spawn(self.run())
    }

    /// Produce blocks until shut down or every handle is dropped.
    /// Returns the final ledger state.
    #[instrument(skip_all)]
    pub async fn run(mut self) -> InMemoryLedger {
        let mut block_timer = interval(self.config.block_interval);
        block_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick fires immediately.
        block_timer.tick().await;

        info!(
            interval_ms = self.config.block_interval.as_millis() as u64,
            max_calls = self.config.max_block_calls,
            "ledger node started"
        );

        loop {
            tokio::select! {
                _ = block_timer.tick() => {
                    self.produce_block();
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("all handles dropped");
                        break;
                    }
                },
                _ = self.shutdown.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        if !self.pending.is_empty() {
            warn!(dropped = self.pending.len(), "stopping with unprocessed calls");
        }
        info!(height = self.ledger.current_height(), "ledger node stopped");
        self.ledger
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit { tx, reply } => {
                debug!(
                    sender = %tx.sender,
                    call = tx.call.name(),
                    match_id = ?tx.call.match_id(),
                    queued = self.pending.len(),
                    "call queued"
                );
                self.pending.push_back((tx, reply));
            }
            Command::View { id, reply } => {
                let _ = reply.send(self.view(id));
            }
            Command::PlayerMatch { account, reply } => {
                let _ = reply.send(self.ledger.player_match(&account));
            }
            Command::Balance { account, reply } => {
                let _ = reply.send(self.ledger.balance(&account));
            }
            Command::Deposit { account, amount, reply } => {
                self.ledger.deposit(account, amount);
                info!(account = %account, %amount, "deposit");
                let _ = reply.send(self.ledger.balance(&account));
            }
            Command::Height { reply } => {
                let _ = reply.send(self.ledger.current_height());
            }
            Command::Subscribe { reply } => {
                let _ = reply.send(self.notifications.subscribe());
            }
        }
    }

    fn view(&self, id: MatchId) -> Option<MatchView> {
        let game = self.ledger.read_match(id)?;
        let timeout_at = game.last_action_block.saturating_add(self.config.arbiter.turn_timeout);
        Some(MatchView {
            escrowed: self.ledger.escrowed(id),
            timeout_at,
            height: self.ledger.current_height(),
            game,
        })
    }

    /// Seal one block: reap, apply queued calls, publish.
    fn produce_block(&mut self) -> BlockHeader {
        let height = self.ledger.advance_block();
        let arbiter = &self.arbiter;

        for id in arbiter.abandoned(&self.ledger, self.config.max_reaps_per_block) {
            if let Err(e) = self.ledger.transact(|l| arbiter.reap(l, id)) {
                warn!(match_id = id, error = %e, "failed to reap match");
            }
        }

        let take = self.pending.len().min(self.config.max_block_calls);
        for (tx, reply) in self.pending.drain(..take) {
            let receipt = match self.ledger.transact(|l| dispatch(arbiter, l, &tx)) {
                Ok(result) => Receipt::Included { block: height, result },
                Err(e) => {
                    debug!(
                        sender = %tx.sender,
                        call = tx.call.name(),
                        match_id = ?tx.call.match_id(),
                        error = %e,
                        "call rejected"
                    );
                    Receipt::Rejected { block: height, code: e.code(), message: e.to_string() }
                }
            };
            // The submitter may have stopped waiting.
            let _ = reply.send(receipt);
        }

        let events = self.ledger.take_events();
        let header = BlockHeader { height, timestamp: Utc::now(), calls: take, events: events.len() };

        for event in events {
            let _ = self.notifications.send(Notification::Event { block: height, event });
        }
        let _ = self.notifications.send(Notification::Block(header.clone()));

        if take > 0 || header.events > 0 {
            debug!(height, calls = take, events = header.events, backlog = self.pending.len(), "block sealed");
        }
        header
    }
}

/// Cloneable client side of a [`LedgerNode`].
///
/// Only the node holds the notification sender, so subscriptions close
/// when it stops.
#[derive(Clone)]
pub struct LedgerHandle {
    commands: mpsc::Sender<Command>,
    shutdown: broadcast::Sender<()>,
}

impl LedgerHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, NodeError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(build(reply)).await.map_err(|_| NodeError::Stopped)?;
        response.await.map_err(|_| NodeError::Stopped)
    }

    /// Queue a call and wait for the block that processes it.
    pub async fn submit(&self, sender: AccountId, call: Call) -> Result<Receipt, NodeError> {
        let tx = Transaction { sender, call };
        self.request(|reply| Command::Submit { tx, reply }).await
    }

    /// Current record of a live match.
    pub async fn view(&self, id: MatchId) -> Result<Option<MatchView>, NodeError> {
        self.request(|reply| Command::View { id, reply }).await
    }

    /// Live match an account plays in.
    pub async fn player_match(&self, account: AccountId) -> Result<Option<MatchId>, NodeError> {
        self.request(|reply| Command::PlayerMatch { account, reply }).await
    }

    /// Free balance.
    pub async fn balance(&self, account: AccountId) -> Result<Balance, NodeError> {
        self.request(|reply| Command::Balance { account, reply }).await
    }

    /// Faucet credit. Returns the new balance.
    pub async fn deposit(&self, account: AccountId, amount: Balance) -> Result<Balance, NodeError> {
        self.request(|reply| Command::Deposit { account, amount, reply }).await
    }

    /// Height of the last sealed block.
    pub async fn height(&self) -> Result<BlockHeight, NodeError> {
        self.request(|reply| Command::Height { reply }).await
    }

    /// Receive events and block headers from now on.
    pub async fn subscribe(&self) -> Result<broadcast::Receiver<Notification>, NodeError> {
        self.request(|reply| Command::Subscribe { reply }).await
    }

    /// Stop the node.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}
