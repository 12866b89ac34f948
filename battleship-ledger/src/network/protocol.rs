//! Protocol Messages
//!
//! Wire format between players and the ledger node. Calls and receipts are
//! externally tagged so they survive both JSON and bincode; notifications
//! are JSON only.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::hash::Hash;
use crate::core::ids::{AccountId, Balance, BlockHeight, MatchId};
use crate::game::events::{Event, RevealOutcome, Termination};
use crate::game::grid::{Cell, Coordinate};
use crate::game::state::Match;
use crate::proof::commitment::CellReveal;

pub use crate::game::arbiter::ErrorCode;

// =============================================================================
// PLAYER -> LEDGER
// =============================================================================

/// A state machine operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Call {
    /// Open a match staking `stake`.
    CreateGame {
        /// Per-player stake.
        stake: Balance,
    },
    /// Take the second seat.
    JoinGame {
        /// Match.
        id: MatchId,
        /// Stake the joiner agrees to.
        stake: Balance,
    },
    /// Publish a grid root.
    CommitGrid {
        /// Match.
        id: MatchId,
        /// Merkle root.
        root: Hash,
    },
    /// Shoot at a cell.
    Attack {
        /// Match.
        id: MatchId,
        /// Target.
        coord: Coordinate,
    },
    /// Answer the pending shot.
    RevealCell {
        /// Match.
        id: MatchId,
        /// Opened cell and proof.
        reveal: CellReveal,
    },
    /// Open the whole grid as declared winner.
    RevealWinnerGrid {
        /// Match.
        id: MatchId,
        /// All 100 cells.
        cells: Vec<Cell>,
    },
    /// Win on the opponent's inactivity.
    ClaimTimeoutWin {
        /// Match.
        id: MatchId,
    },
    /// Give up.
    Surrender {
        /// Match.
        id: MatchId,
    },
}

impl Call {
    /// Operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Call::CreateGame { .. } => "create_game",
            Call::JoinGame { .. } => "join_game",
            Call::CommitGrid { .. } => "commit_grid",
            Call::Attack { .. } => "attack",
            Call::RevealCell { .. } => "reveal_cell",
            Call::RevealWinnerGrid { .. } => "reveal_winner_grid",
            Call::ClaimTimeoutWin { .. } => "claim_timeout_win",
            Call::Surrender { .. } => "surrender",
        }
    }

    /// Target match, if the call names one.
    pub fn match_id(&self) -> Option<MatchId> {
        match self {
            Call::CreateGame { .. } => None,
            Call::JoinGame { id, .. }
            | Call::CommitGrid { id, .. }
            | Call::Attack { id, .. }
            | Call::RevealCell { id, .. }
            | Call::RevealWinnerGrid { id, .. }
            | Call::ClaimTimeoutWin { id }
            | Call::Surrender { id } => Some(*id),
        }
    }
}

/// A call together with the account that sent it.
///
/// Signing is the host ledger's business; `sender` is taken as
/// authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Caller.
    pub sender: AccountId,
    /// Operation.
    pub call: Call,
}

// =============================================================================
// LEDGER -> PLAYER
// =============================================================================

/// What an included call produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallResult {
    /// Match opened.
    Created {
        /// New match id.
        id: MatchId,
    },
    /// Accepted with nothing to report.
    Done,
    /// A shot was answered.
    Revealed(RevealOutcome),
    /// The match ended.
    Terminated(Termination),
}

/// Fate of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Receipt {
    /// Executed in a block.
    Included {
        /// Block height.
        block: BlockHeight,
        /// Call result.
        result: CallResult,
    },
    /// Rejected; nothing changed.
    Rejected {
        /// Block the rejection happened in.
        block: BlockHeight,
        /// Stable code.
        code: ErrorCode,
        /// Human-readable reason.
        message: String,
    },
}

impl Receipt {
    /// Block the transaction was processed in.
    pub fn block(&self) -> BlockHeight {
        match self {
            Receipt::Included { block, .. } | Receipt::Rejected { block, .. } => *block,
        }
    }

    /// Whether the call was executed.
    pub fn is_included(&self) -> bool {
        matches!(self, Receipt::Included { .. })
    }
}

/// Produced block summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Height.
    pub height: BlockHeight,
    /// Wall-clock production time.
    pub timestamp: DateTime<Utc>,
    /// Calls processed (included or rejected).
    pub calls: usize,
    /// Events emitted.
    pub events: usize,
}

/// Pushed to every subscriber.
///
/// A block's events are sent before its header, so seeing the header means
/// every event of that block has been delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// An event from an included block.
    Event {
        /// Block height.
        block: BlockHeight,
        /// The event.
        event: Event,
    },
    /// A block was sealed.
    Block(BlockHeader),
}

impl Notification {
    /// Height the notification belongs to.
    pub fn block(&self) -> BlockHeight {
        match self {
            Notification::Event { block, .. } => *block,
            Notification::Block(header) => header.height,
        }
    }
}

/// Authoritative snapshot of a live match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchView {
    /// Stored record.
    pub game: Match,
    /// Value escrowed for it.
    pub escrowed: Balance,
    /// Height at which the awaited party can be timed out.
    pub timeout_at: BlockHeight,
    /// Last sealed block the snapshot includes.
    pub height: BlockHeight,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl Transaction {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl Receipt {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl Notification {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::tests::standard_grid;
    use crate::proof::commitment::SecretBoard;

    fn sender() -> AccountId {
        AccountId::new([3; 16])
    }

    #[test]
    fn test_reveal_transaction_binary() {
        let board = SecretBoard::new(standard_grid(1)).unwrap();
        let coord = Coordinate::new(4, 0);
        let tx = Transaction {
            sender: sender(),
            call: Call::RevealCell { id: 9, reveal: board.reveal(coord).unwrap() },
        };

        let bytes = tx.to_bytes().unwrap();
        let parsed = Transaction::from_bytes(&bytes).unwrap();

        match parsed.call {
            Call::RevealCell { id, reveal } => {
                assert_eq!(id, 9);
                assert!(reveal.verify(&board.root(), coord));
            }
            other => panic!("Wrong call type: {:?}", other),
        }
    }

    #[test]
    fn test_call_json_tagging() {
        let tx = Transaction { sender: sender(), call: Call::ClaimTimeoutWin { id: 2 } };
        let json = tx.to_json().unwrap();
        assert!(json.contains("claim_timeout_win"));
        assert_eq!(Transaction::from_json(&json).unwrap(), tx);
        assert_eq!(tx.call.name(), "claim_timeout_win");
        assert_eq!(tx.call.match_id(), Some(2));
        assert_eq!(Call::CreateGame { stake: 5 }.match_id(), None);
    }

    #[test]
    fn test_rejected_receipt() {
        let receipt = Receipt::Rejected {
            block: 12,
            code: ErrorCode::NotYourTurn,
            message: "not your turn".to_string(),
        };

        let json = receipt.to_json().unwrap();
        assert!(json.contains("not_your_turn"));
        assert!(!receipt.is_included());
        assert_eq!(receipt.block(), 12);

        let bytes = receipt.to_bytes().unwrap();
        assert_eq!(Receipt::from_bytes(&bytes).unwrap(), receipt);
    }

    #[test]
    fn test_notification_json() {
        let msg = Notification::Event {
            block: 3,
            event: Event::BothCommitted { id: 1 },
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"event\""));

        match Notification::from_json(&json).unwrap() {
            Notification::Event { block, event } => {
                assert_eq!(block, 3);
                assert_eq!(event, Event::BothCommitted { id: 1 });
            }
            other => panic!("Wrong notification type: {:?}", other),
        }
    }

    #[test]
    fn test_block_notification() {
        let header = BlockHeader { height: 7, timestamp: Utc::now(), calls: 2, events: 3 };
        let msg = Notification::Block(header.clone());
        assert_eq!(msg.block(), 7);

        let parsed = Notification::from_json(&msg.to_json().unwrap()).unwrap();
        assert!(matches!(parsed, Notification::Block(h) if h == header));
    }
}
