//! Engine configuration with serde-friendly per-field defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the consensus kernel.
///
/// All fields have defaults so a partial TOML/JSON document deserializes
/// into a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum validators selected per round (default: 3).
    #[serde(default = "default_min_validators")]
    pub min_validators: usize,

    /// Validators selected per required role, best reputation first
    /// (default: 2).
    #[serde(default = "default_validators_per_role")]
    pub validators_per_role: usize,

    /// Weighted approval fraction required for confirmation (default: 0.67).
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,

    /// Fault fraction `f`; each round tolerates `⌊n·f⌋` Byzantine
    /// validators (default: 0.33).
    #[serde(default = "default_byzantine_fault_fraction")]
    pub byzantine_fault_fraction: f64,

    /// Round deadline in seconds (default: 300).
    #[serde(default = "default_vote_timeout_seconds")]
    pub vote_timeout_seconds: u64,

    /// Cap on simultaneously active rounds. Bounds memory and outstanding
    /// vote-request fan-out (default: 10).
    #[serde(default = "default_max_concurrent_rounds")]
    pub max_concurrent_rounds: usize,

    /// Minimum stake for selection eligibility (default: 100_000).
    #[serde(default = "default_min_stake")]
    pub min_stake: u64,

    /// Cap on the stake multiplier inside the vote-weight formula
    /// (default: 2.0).
    #[serde(default = "default_max_stake_multiplier")]
    pub max_stake_multiplier: f64,

    /// Base reward per correct vote in a confirmed round (default: 1_000).
    #[serde(default = "default_base_reward")]
    pub base_reward: u64,

    /// Stake deduction applied when a low-accuracy validator votes against
    /// the final decision (default: 10_000).
    #[serde(default = "default_slash_penalty")]
    pub slash_penalty: u64,

    /// Accuracy floor below which mismatched votes trigger stake slashing.
    /// Honest minority dissent above the floor only decays accuracy
    /// (default: 0.8).
    #[serde(default = "default_trust_floor")]
    pub trust_floor: f64,

    /// Multiplicative accuracy/reputation decay per mismatched vote
    /// (default: 0.95).
    #[serde(default = "default_accuracy_decay")]
    pub accuracy_decay: f64,

    /// Anchor retry attempts before giving up (default: 3).
    #[serde(default = "default_anchor_retry_attempts")]
    pub anchor_retry_attempts: u32,

    /// Delay between anchor retries in milliseconds (default: 500).
    #[serde(default = "default_anchor_retry_delay_ms")]
    pub anchor_retry_delay_ms: u64,
}

fn default_min_validators() -> usize {
    3
}
fn default_validators_per_role() -> usize {
    2
}
fn default_consensus_threshold() -> f64 {
    0.67
}
fn default_byzantine_fault_fraction() -> f64 {
    0.33
}
fn default_vote_timeout_seconds() -> u64 {
    300
}
fn default_max_concurrent_rounds() -> usize {
    10
}
fn default_min_stake() -> u64 {
    100_000
}
fn default_max_stake_multiplier() -> f64 {
    2.0
}
fn default_base_reward() -> u64 {
    1_000
}
fn default_slash_penalty() -> u64 {
    10_000
}
fn default_trust_floor() -> f64 {
    0.8
}
fn default_accuracy_decay() -> f64 {
    0.95
}
fn default_anchor_retry_attempts() -> u32 {
    3
}
fn default_anchor_retry_delay_ms() -> u64 {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_validators: default_min_validators(),
            validators_per_role: default_validators_per_role(),
            consensus_threshold: default_consensus_threshold(),
            byzantine_fault_fraction: default_byzantine_fault_fraction(),
            vote_timeout_seconds: default_vote_timeout_seconds(),
            max_concurrent_rounds: default_max_concurrent_rounds(),
            min_stake: default_min_stake(),
            max_stake_multiplier: default_max_stake_multiplier(),
            base_reward: default_base_reward(),
            slash_penalty: default_slash_penalty(),
            trust_floor: default_trust_floor(),
            accuracy_decay: default_accuracy_decay(),
            anchor_retry_attempts: default_anchor_retry_attempts(),
            anchor_retry_delay_ms: default_anchor_retry_delay_ms(),
        }
    }
}

impl EngineConfig {
    /// Round deadline as a [`Duration`].
    #[must_use]
    pub fn vote_timeout(&self) -> Duration {
        Duration::from_secs(self.vote_timeout_seconds)
    }

    /// Delay between anchor retries as a [`Duration`].
    #[must_use]
    pub fn anchor_retry_delay(&self) -> Duration {
        Duration::from_millis(self.anchor_retry_delay_ms)
    }

    /// Byzantine tolerance count for a round with `participants` validators.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn byzantine_tolerance(&self, participants: usize) -> usize {
        (participants as f64 * self.byzantine_fault_fraction).floor() as usize
    }

    /// Required approve-vote count for a round with `participants`
    /// validators: a simple majority, never below `min_validators`.
    #[must_use]
    pub fn required_validators(&self, participants: usize) -> usize {
        self.min_validators.max(participants / 2 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_empty_document() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.min_validators, 3);
        assert_eq!(config.consensus_threshold, 0.67);
        assert_eq!(config.vote_timeout(), Duration::from_secs(300));
        assert_eq!(config.max_concurrent_rounds, 10);
    }

    #[test]
    fn byzantine_tolerance_floors() {
        let config = EngineConfig::default();
        assert_eq!(config.byzantine_tolerance(5), 1);
        assert_eq!(config.byzantine_tolerance(3), 0);
        assert_eq!(config.byzantine_tolerance(10), 3);
    }

    #[test]
    fn required_validators_never_below_minimum() {
        let config = EngineConfig::default();
        assert_eq!(config.required_validators(3), 3);
        assert_eq!(config.required_validators(5), 3);
        assert_eq!(config.required_validators(9), 5);
    }
}
