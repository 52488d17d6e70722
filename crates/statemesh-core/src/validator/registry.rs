//! Validator registry: selection, vote weighting, rewards, and slashing.

use crate::config::EngineConfig;
use crate::types::{ValidatorId, ValidatorNode, ValidatorRole};
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tracks known validator identities and applies reward/slash events.
///
/// Selection is deterministic given a stable reputation ordering: ranking is
/// by reputation descending with ties broken by validator id ascending, and
/// the final participant set is sorted by id, so tests (and replays) see a
/// reproducible selection.
#[derive(Debug)]
pub struct ValidatorRegistry {
    config: Arc<EngineConfig>,
    nodes: DashMap<ValidatorId, ValidatorNode>,
    trusted: DashSet<ValidatorId>,
    blacklisted: DashSet<ValidatorId>,
}

impl ValidatorRegistry {
    #[must_use]
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            nodes: DashMap::new(),
            trusted: DashSet::new(),
            blacklisted: DashSet::new(),
        }
    }

    /// Registers (or replaces) a validator record. Trusted validators are
    /// eligible for selection.
    pub fn register(&self, node: ValidatorNode, trusted: bool) {
        debug!(validator = %node.node_id, role = node.role.as_str(), "registered validator");
        if trusted {
            self.trusted.insert(node.node_id.clone());
        }
        self.nodes.insert(node.node_id.clone(), node);
    }

    /// Removes a validator from the trusted set permanently.
    pub fn blacklist(&self, id: &ValidatorId) {
        warn!(validator = %id, "blacklisted validator");
        self.trusted.remove(id);
        self.blacklisted.insert(id.clone());
    }

    /// Looks up one validator record.
    #[must_use]
    pub fn get(&self, id: &ValidatorId) -> Option<ValidatorNode> {
        self.nodes.get(id).map(|node| node.clone())
    }

    /// Current reputation score for a validator, if known.
    #[must_use]
    pub fn reputation(&self, id: &ValidatorId) -> Option<f64> {
        self.nodes.get(id).map(|node| node.reputation_score)
    }

    /// Ids of all currently trusted validators, sorted.
    #[must_use]
    pub fn trusted_set(&self) -> Vec<ValidatorId> {
        let mut ids: Vec<ValidatorId> = self.trusted.iter().map(|id| id.clone()).collect();
        ids.sort();
        ids
    }

    /// Selects the validators for a round requiring `required_roles`.
    ///
    /// Per required role, takes the top `validators_per_role` eligible
    /// validators by reputation; always includes at least one
    /// general-consensus validator; backfills from the full trusted set up
    /// to `min_validators`. Returns the deduplicated set sorted by id.
    #[must_use]
    pub fn select_for(&self, required_roles: &[ValidatorRole]) -> Vec<ValidatorNode> {
        let mut selected: BTreeSet<ValidatorId> = BTreeSet::new();

        for role in required_roles {
            for node in self
                .ranked_eligible(|node| node.role == *role)
                .into_iter()
                .take(self.config.validators_per_role)
            {
                selected.insert(node.node_id);
            }
        }

        // Every round carries at least one general-consensus participant.
        if let Some(general) = self
            .ranked_eligible(|node| node.role == ValidatorRole::GeneralConsensus)
            .into_iter()
            .next()
        {
            selected.insert(general.node_id);
        }

        // Backfill from the full trusted set until the minimum is met.
        if selected.len() < self.config.min_validators {
            for node in self.ranked_eligible(|_| true) {
                selected.insert(node.node_id);
                if selected.len() >= self.config.min_validators {
                    break;
                }
            }
        }

        selected.into_iter().filter_map(|id| self.get(&id)).collect()
    }

    /// Vote weight used during tallying, never persisted:
    /// `reputation × min(max_multiplier, stake / min_stake) × confidence`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn vote_weight(&self, node: &ValidatorNode, confidence: f64) -> f64 {
        let stake_multiplier = (node.stake as f64 / self.config.min_stake as f64)
            .min(self.config.max_stake_multiplier);
        node.reputation_score * stake_multiplier * confidence
    }

    /// Credits a validator whose vote matched the final decision.
    ///
    /// Adds to earned rewards, nudges accuracy toward 1 as another correct
    /// validation enters the rolling record, and refreshes `last_seen`.
    pub fn apply_reward(&self, id: &ValidatorId, amount: u64) {
        let Some(mut node) = self.nodes.get_mut(id) else {
            return;
        };
        node.reward_earned += amount;
        node.validation_count += 1;
        #[allow(clippy::cast_precision_loss)]
        let count = node.validation_count as f64;
        node.accuracy_score = ((node.accuracy_score * (count - 1.0)) + 1.0) / count;
        node.last_seen = Utc::now();
        debug!(validator = %id, amount, "rewarded validator");
    }

    /// Penalizes a validator whose vote disagreed with the final decision.
    ///
    /// Accuracy and reputation decay multiplicatively on every mismatch.
    /// Stake is slashed only when accuracy was already below the trust floor
    /// before this mismatch, so honest minority dissent is never punished
    /// with stake loss while repeat offenders are. Returns `true` if stake
    /// was slashed.
    pub fn apply_slash(&self, id: &ValidatorId) -> bool {
        let Some(mut node) = self.nodes.get_mut(id) else {
            return false;
        };
        let below_floor = node.accuracy_score < self.config.trust_floor;
        node.accuracy_score *= self.config.accuracy_decay;
        node.reputation_score *= self.config.accuracy_decay;
        node.validation_count += 1;
        node.last_seen = Utc::now();

        if below_floor {
            node.stake = node.stake.saturating_sub(self.config.slash_penalty);
            node.slash_count += 1;
            info!(
                validator = %id,
                stake = node.stake,
                slash_count = node.slash_count,
                "slashed validator below trust floor"
            );
            true
        } else {
            false
        }
    }

    /// Eligible validators matching `filter`, ranked by reputation
    /// descending with ties broken by id ascending.
    fn ranked_eligible(&self, filter: impl Fn(&ValidatorNode) -> bool) -> Vec<ValidatorNode> {
        let mut eligible: Vec<ValidatorNode> = self
            .nodes
            .iter()
            .filter(|entry| {
                let node = entry.value();
                filter(node) &&
                    self.trusted.contains(&node.node_id) &&
                    !self.blacklisted.contains(&node.node_id) &&
                    node.stake >= self.config.min_stake
            })
            .map(|entry| entry.value().clone())
            .collect();
        eligible.sort_by(|a, b| {
            b.reputation_score
                .total_cmp(&a.reputation_score)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        eligible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    fn node(id: &str, role: ValidatorRole, reputation: f64, stake: u64) -> ValidatorNode {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        ValidatorNode {
            node_id: ValidatorId::from(id),
            public_key: key.verifying_key(),
            role,
            tradition_expertise: Vec::new(),
            stake,
            accuracy_score: 0.95,
            reputation_score: reputation,
            uptime: 0.99,
            validation_count: 10,
            slash_count: 0,
            reward_earned: 0,
            last_seen: Utc::now(),
        }
    }

    fn registry() -> ValidatorRegistry {
        ValidatorRegistry::new(Arc::new(EngineConfig::default()))
    }

    #[test]
    fn selection_prefers_reputation_and_breaks_ties_by_id() {
        let reg = registry();
        reg.register(node("auth-b", ValidatorRole::Authenticity, 0.9, 200_000), true);
        reg.register(node("auth-a", ValidatorRole::Authenticity, 0.9, 200_000), true);
        reg.register(node("auth-c", ValidatorRole::Authenticity, 0.95, 200_000), true);
        reg.register(node("gen-1", ValidatorRole::GeneralConsensus, 0.8, 200_000), true);

        let selected = reg.select_for(&[ValidatorRole::Authenticity]);
        let ids: Vec<&str> = selected.iter().map(|n| n.node_id.as_str()).collect();
        // Top two authenticity validators (c by reputation, then a over b by
        // id) plus the general-consensus participant, output sorted by id.
        assert_eq!(ids, vec!["auth-a", "auth-c", "gen-1"]);
    }

    #[test]
    fn selection_backfills_to_minimum() {
        let reg = registry();
        reg.register(node("auth-a", ValidatorRole::Authenticity, 0.9, 200_000), true);
        reg.register(node("econ-a", ValidatorRole::Economic, 0.9, 200_000), true);
        reg.register(node("trad-a", ValidatorRole::Tradition, 0.9, 200_000), true);

        // No authenticity-role surplus and no general validator: the trusted
        // set still backfills up to min_validators.
        let selected = reg.select_for(&[ValidatorRole::Authenticity]);
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn understaked_and_blacklisted_are_ineligible() {
        let reg = registry();
        reg.register(node("poor", ValidatorRole::Authenticity, 0.99, 50_000), true);
        reg.register(node("banned", ValidatorRole::Authenticity, 0.99, 500_000), true);
        reg.register(node("ok", ValidatorRole::Authenticity, 0.9, 500_000), true);
        reg.blacklist(&ValidatorId::from("banned"));

        let selected = reg.select_for(&[ValidatorRole::Authenticity]);
        let ids: Vec<&str> = selected.iter().map(|n| n.node_id.as_str()).collect();
        assert!(!ids.contains(&"poor"));
        assert!(!ids.contains(&"banned"));
        assert!(ids.contains(&"ok"));
    }

    #[test]
    fn vote_weight_formula() {
        let reg = registry();
        let validator = node("v", ValidatorRole::GeneralConsensus, 0.9, 200_000);
        // 0.9 reputation × 2.0 stake multiplier × 0.5 confidence
        let weight = reg.vote_weight(&validator, 0.5);
        assert!((weight - 0.9).abs() < 1e-9);

        // Stake multiplier is capped at max_stake_multiplier.
        let whale = node("w", ValidatorRole::GeneralConsensus, 1.0, 10_000_000);
        assert!((reg.vote_weight(&whale, 1.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn slash_only_below_trust_floor_and_stake_never_negative() {
        let reg = registry();
        let mut v = node("v", ValidatorRole::GeneralConsensus, 0.9, 15_000);
        v.accuracy_score = 0.95;
        reg.register(v, true);
        let id = ValidatorId::from("v");

        // Above the floor: accuracy decays, stake untouched.
        assert!(!reg.apply_slash(&id));
        assert_eq!(reg.get(&id).unwrap().stake, 15_000);

        // Drive accuracy below the floor, then slashes bite and stake
        // saturates at zero.
        let mut node = reg.get(&id).unwrap();
        node.accuracy_score = 0.5;
        reg.register(node, true);
        assert!(reg.apply_slash(&id));
        assert_eq!(reg.get(&id).unwrap().stake, 5_000);
        assert!(reg.apply_slash(&id));
        assert_eq!(reg.get(&id).unwrap().stake, 0);
    }

    #[test]
    fn reward_nudges_accuracy_toward_one() {
        let reg = registry();
        let mut v = node("v", ValidatorRole::GeneralConsensus, 0.9, 200_000);
        v.accuracy_score = 0.5;
        v.validation_count = 1;
        reg.register(v, true);
        let id = ValidatorId::from("v");

        reg.apply_reward(&id, 1_000);
        let after = reg.get(&id).unwrap();
        assert_eq!(after.reward_earned, 1_000);
        assert!(after.accuracy_score > 0.5);
        assert!(after.accuracy_score <= 1.0);
    }
}
