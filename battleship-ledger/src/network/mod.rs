//! Network Layer
//!
//! Wire types and the block-producing ledger node. Non-deterministic only
//! in timing; every call still runs through `game/`.

pub mod protocol;
pub mod node;

pub use protocol::{
    BlockHeader, Call, CallResult, MatchView, Notification, Receipt, Transaction,
};
pub use node::{dispatch, LedgerHandle, LedgerNode, NodeError};
