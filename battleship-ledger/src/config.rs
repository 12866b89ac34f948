//! Configuration
//!
//! Plain structs with defaults, overridable from the environment.

use std::time::Duration;
use thiserror::Error;

use crate::core::ids::BlockHeight;

/// What happens when a declared winner's full grid breaks the fleet rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FleetViolationPolicy {
    /// Pot goes to the opponent, reason `Cheating`.
    #[default]
    AwardOpponent,
    /// Both stakes are returned and the match is cancelled.
    RefundBoth,
}

impl FleetViolationPolicy {
    /// Parse `award_opponent` / `refund_both`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "award_opponent" | "award" => Some(Self::AwardOpponent),
            "refund_both" | "refund" => Some(Self::RefundBoth),
            _ => None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Timeouts of zero blocks would let anyone claim immediately.
    #[error("turn timeout must be at least one block")]
    ZeroTurnTimeout,

    /// Reaping must not race normal timeout claims.
    #[error("abandon timeout ({abandon}) must exceed turn timeout ({turn})")]
    AbandonBeforeTurn {
        /// Turn timeout.
        turn: BlockHeight,
        /// Abandon timeout.
        abandon: BlockHeight,
    },

    /// Block production needs a nonzero interval.
    #[error("block interval must be nonzero")]
    ZeroBlockInterval,
}

// =============================================================================
// ARBITER
// =============================================================================

/// Rules the match state machine enforces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArbiterConfig {
    /// Blocks a player may stay idle before the other can claim.
    pub turn_timeout: BlockHeight,
    /// Blocks of total inactivity before a match is reaped and burned.
    pub abandon_timeout: BlockHeight,
    /// Response to an illegal winning fleet.
    pub fleet_violation_policy: FleetViolationPolicy,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            turn_timeout: 20,
            abandon_timeout: 200,
            fleet_violation_policy: FleetViolationPolicy::default(),
        }
    }
}

impl ArbiterConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            turn_timeout: env_parse("BATTLESHIP_TURN_TIMEOUT").unwrap_or(defaults.turn_timeout),
            abandon_timeout: env_parse("BATTLESHIP_ABANDON_TIMEOUT")
                .unwrap_or(defaults.abandon_timeout),
            fleet_violation_policy: std::env::var("BATTLESHIP_FLEET_POLICY")
                .ok()
                .and_then(|v| FleetViolationPolicy::parse(&v))
                .unwrap_or(defaults.fleet_violation_policy),
        }
    }

    /// Check the timeouts are coherent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.turn_timeout == 0 {
            return Err(ConfigError::ZeroTurnTimeout);
        }
        if self.abandon_timeout <= self.turn_timeout {
            return Err(ConfigError::AbandonBeforeTurn {
                turn: self.turn_timeout,
                abandon: self.abandon_timeout,
            });
        }
        Ok(())
    }
}

// =============================================================================
// NODE
// =============================================================================

/// Ledger service settings.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Wall-clock time between blocks.
    pub block_interval: Duration,
    /// Calls included per block; the rest wait for the next one.
    pub max_block_calls: usize,
    /// Matches reaped per block at most.
    pub max_reaps_per_block: usize,
    /// Submission queue depth.
    pub command_buffer: usize,
    /// Notification channel depth per subscriber.
    pub event_buffer: usize,
    /// State machine rules.
    pub arbiter: ArbiterConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            block_interval: Duration::from_millis(500),
            max_block_calls: 256,
            max_reaps_per_block: 16,
            command_buffer: 1024,
            event_buffer: 1024,
            arbiter: ArbiterConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            block_interval: env_parse("BATTLESHIP_BLOCK_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.block_interval),
            arbiter: ArbiterConfig::from_env(),
            ..defaults
        }
    }

    /// Check every setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_interval.is_zero() {
            return Err(ConfigError::ZeroBlockInterval);
        }
        self.arbiter.validate()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}
