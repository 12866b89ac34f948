//! Settlement and Cleanup
//!
//! Every terminal transition goes through one of three exits: pay the pot
//! to a winner, refund the stakes, or burn them. Each moves the full escrow
//! and then deletes the match and every player index entry together.
//!
//! Callers run these inside an atomic ledger call, so a failure midway
//! leaves nothing behind.

use tracing::info;

use crate::core::ids::{AccountId, Balance};
use crate::game::events::{EndReason, Event, Settlement};
use crate::game::state::Match;
use crate::ledger::{Ledger, LedgerError};

/// Pay the whole escrow to `winner` and remove the match.
pub fn finalize<L: Ledger>(
    ledger: &mut L,
    game: &Match,
    winner: AccountId,
    loser: AccountId,
    reason: EndReason,
) -> Result<Settlement, LedgerError> {
    let prize = ledger.escrowed(game.id);
    ledger.payout(game.id, &winner, prize)?;
    cleanup(ledger, game);

    info!(
        match_id = game.id,
        winner = %winner,
        loser = %loser,
        %reason,
        %prize,
        "match ended"
    );

    ledger.emit(Event::MatchEnded { id: game.id, winner, loser, reason, prize });
    Ok(Settlement { winner, loser, reason, prize })
}

/// Return each seated player's stake and remove the match.
pub fn refund<L: Ledger>(
    ledger: &mut L,
    game: &Match,
) -> Result<Vec<(AccountId, Balance)>, LedgerError> {
    let refunded: Vec<(AccountId, Balance)> = game
        .participants()
        .into_iter()
        .map(|player| (player, game.stake))
        .collect();

    for (player, amount) in &refunded {
        ledger.payout(game.id, player, *amount)?;
    }
    cleanup(ledger, game);

    info!(match_id = game.id, players = refunded.len(), "match cancelled, stakes refunded");

    ledger.emit(Event::MatchCancelled { id: game.id, refunded: refunded.clone() });
    Ok(refunded)
}

/// Destroy the whole escrow and remove the match.
pub fn burn<L: Ledger>(ledger: &mut L, game: &Match) -> Result<Balance, LedgerError> {
    let burned = ledger.escrowed(game.id);
    ledger.burn(game.id, burned)?;
    cleanup(ledger, game);

    info!(match_id = game.id, %burned, "abandoned match reaped");

    ledger.emit(Event::MatchAbandoned { id: game.id, burned });
    Ok(burned)
}

/// Delete the match record and both index entries.
fn cleanup<L: Ledger>(ledger: &mut L, game: &Match) {
    for player in game.participants() {
        if ledger.player_match(&player) == Some(game.id) {
            ledger.clear_player_match(&player);
        }
    }
    ledger.remove_match(game.id);
}
