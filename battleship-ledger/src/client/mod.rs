//! Player-side match driver.

pub mod orchestrator;

pub use orchestrator::{ClientError, ClientPhase, ClientState, MatchResult, NextAction, Orchestrator};
