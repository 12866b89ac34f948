//! In-Memory Ledger
//!
//! Single-writer ledger backed by BTreeMaps. Used by the block-producing
//! node and by tests. `transact` gives all-or-nothing calls by snapshotting
//! the whole state and restoring it on error.

use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::core::ids::{AccountId, Balance, BlockHeight, MatchId};
use crate::game::events::Event;
use crate::game::state::Match;
use crate::ledger::{Ledger, LedgerError};

/// Ledger state held in memory.
///
/// Uses BTreeMap for deterministic iteration order.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    matches: BTreeMap<MatchId, Match>,
    player_index: BTreeMap<AccountId, MatchId>,
    balances: BTreeMap<AccountId, Balance>,
    holds: BTreeMap<MatchId, Balance>,
    next_id: MatchId,
    height: BlockHeight,
    burned: Balance,
    events: Vec<Event>,
}

impl InMemoryLedger {
    /// Empty ledger at height 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an account (genesis or faucet).
    pub fn deposit(&mut self, account: AccountId, amount: Balance) {
        let balance = self.balances.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Free balance of an account.
    pub fn balance(&self, account: &AccountId) -> Balance {
        self.balances.get(account).copied().unwrap_or_default()
    }

    /// Total value destroyed by reaping.
    pub fn total_burned(&self) -> Balance {
        self.burned
    }

    /// Total value held in escrow across all matches.
    pub fn total_escrowed(&self) -> Balance {
        self.holds.values().fold(0, |total, held| total.saturating_add(*held))
    }

    /// Number of live matches.
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// Number of player index entries.
    pub fn indexed_players(&self) -> usize {
        self.player_index.len()
    }

    /// Start the next block.
    pub fn advance_block(&mut self) -> BlockHeight {
        self.height += 1;
        trace!(height = self.height, "block opened");
        self.height
    }

    /// Jump to a height (tests and replays).
    pub fn set_height(&mut self, height: BlockHeight) {
        self.height = height;
    }

    /// Events emitted so far, oldest first.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Drain emitted events.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Run `f` atomically: if it fails, every change it made is undone.
    pub fn transact<T, E>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E> {
        let snapshot = self.clone();
        let result = f(self);
        if result.is_err() {
            debug!(height = self.height, "call rolled back");
            *self = snapshot;
        }
        result
    }

    fn debit_hold(&mut self, id: MatchId, amount: Balance) -> Result<(), LedgerError> {
        let held = self.escrowed(id);
        let remaining = held
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientEscrow { id, needed: amount, held })?;

        if remaining == 0 {
            self.holds.remove(&id);
        } else {
            self.holds.insert(id, remaining);
        }
        Ok(())
    }
}

impl Ledger for InMemoryLedger {
    fn read_match(&self, id: MatchId) -> Option<Match> {
        self.matches.get(&id).cloned()
    }

    fn write_match(&mut self, game: Match) {
        self.matches.insert(game.id, game);
    }

    fn remove_match(&mut self, id: MatchId) -> Option<Match> {
        self.matches.remove(&id)
    }

    fn match_ids(&self) -> Vec<MatchId> {
        self.matches.keys().copied().collect()
    }

    fn player_match(&self, player: &AccountId) -> Option<MatchId> {
        self.player_index.get(player).copied()
    }

    fn set_player_match(&mut self, player: AccountId, id: MatchId) {
        self.player_index.insert(player, id);
    }

    fn clear_player_match(&mut self, player: &AccountId) {
        self.player_index.remove(player);
    }

    fn next_match_id(&mut self) -> Option<MatchId> {
        let id = self.next_id;
        self.next_id = id.checked_add(1)?;
        Some(id)
    }

    fn escrow(&mut self, id: MatchId, player: &AccountId, amount: Balance) -> Result<(), LedgerError> {
        let available = self.balance(player);
        let remaining = available.checked_sub(amount).ok_or(LedgerError::InsufficientBalance {
            account: *player,
            needed: amount,
            available,
        })?;

        self.balances.insert(*player, remaining);
        let held = self.holds.entry(id).or_default();
        *held = held.saturating_add(amount);
        Ok(())
    }

    fn payout(&mut self, id: MatchId, player: &AccountId, amount: Balance) -> Result<(), LedgerError> {
        let credited = self
            .balance(player)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow(*player))?;

        self.debit_hold(id, amount)?;
        self.balances.insert(*player, credited);
        Ok(())
    }

    fn burn(&mut self, id: MatchId, amount: Balance) -> Result<(), LedgerError> {
        self.debit_hold(id, amount)?;
        self.burned = self.burned.saturating_add(amount);
        Ok(())
    }

    fn escrowed(&self, id: MatchId) -> Balance {
        self.holds.get(&id).copied().unwrap_or_default()
    }

    fn current_height(&self) -> BlockHeight {
        self.height
    }

    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> AccountId {
        AccountId::new([1; 16])
    }

    #[test]
    fn test_escrow_and_payout() {
        let mut ledger = InMemoryLedger::new();
        ledger.deposit(alice(), 500);

        ledger.escrow(7, &alice(), 200).unwrap();
        assert_eq!(ledger.balance(&alice()), 300);
        assert_eq!(ledger.escrowed(7), 200);

        ledger.payout(7, &alice(), 200).unwrap();
        assert_eq!(ledger.balance(&alice()), 500);
        assert_eq!(ledger.escrowed(7), 0);
        assert_eq!(ledger.total_escrowed(), 0);
    }

    #[test]
    fn test_insufficient_balance() {
        let mut ledger = InMemoryLedger::new();
        ledger.deposit(alice(), 50);
        assert_eq!(
            ledger.escrow(1, &alice(), 100),
            Err(LedgerError::InsufficientBalance { account: alice(), needed: 100, available: 50 })
        );
        assert_eq!(ledger.balance(&alice()), 50);
    }

    #[test]
    fn test_payout_beyond_escrow() {
        let mut ledger = InMemoryLedger::new();
        ledger.deposit(alice(), 100);
        ledger.escrow(1, &alice(), 100).unwrap();
        assert_eq!(
            ledger.payout(1, &alice(), 150),
            Err(LedgerError::InsufficientEscrow { id: 1, needed: 150, held: 100 })
        );
        assert_eq!(ledger.escrowed(1), 100);
    }

    #[test]
    fn test_burn() {
        let mut ledger = InMemoryLedger::new();
        ledger.deposit(alice(), 100);
        ledger.escrow(1, &alice(), 100).unwrap();
        ledger.burn(1, 100).unwrap();
        assert_eq!(ledger.total_burned(), 100);
        assert_eq!(ledger.escrowed(1), 0);
        assert_eq!(ledger.balance(&alice()), 0);
    }

    #[test]
    fn test_transact_rolls_back() {
        let mut ledger = InMemoryLedger::new();
        ledger.deposit(alice(), 100);

        let result: Result<(), LedgerError> = ledger.transact(|l| {
            l.escrow(1, &alice(), 60)?;
            l.set_player_match(alice(), 1);
            l.escrow(1, &alice(), 60)
        });

        assert!(result.is_err());
        assert_eq!(ledger.balance(&alice()), 100);
        assert_eq!(ledger.escrowed(1), 0);
        assert_eq!(ledger.player_match(&alice()), None);
    }

    #[test]
    fn test_sequential_ids() {
        let mut ledger = InMemoryLedger::new();
        assert_eq!(ledger.next_match_id(), Some(0));
        assert_eq!(ledger.next_match_id(), Some(1));

        ledger.next_id = MatchId::MAX;
        assert_eq!(ledger.next_match_id(), None);
    }
}
