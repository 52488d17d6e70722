//! Transition proposal: action profiles, consequence rules, and prospective
//! state projection.
//!
//! The proposer never mutates stored state. It derives the candidate next
//! [`StateFields`](crate::types::StateFields) for an action and packages it
//! as a pending [`StateTransition`] for the consensus coordinator to put to
//! a vote.

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::state::GameStateStore;
use crate::types::{
    ActionParams, Consequence, GameState, StateFields, StateId, StateTransition, TransitionId,
    ValidatorRole,
};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::debug;

/// Economic and validation profile of one action type.
#[derive(Debug, Clone)]
pub struct ActionProfile {
    pub cost: u64,
    pub reward: u64,
    pub required_authenticity: f64,
    pub required_roles: &'static [ValidatorRole],
}

/// Fixed per-action profile table.
///
/// Returns `None` for unknown action types; callers surface that as
/// [`EngineError::InvalidAction`].
#[must_use]
pub fn action_profile(action_type: &str) -> Option<ActionProfile> {
    use ValidatorRole::{Authenticity, Economic, GeneralConsensus, Tradition};
    match action_type {
        "complete_quest" => Some(ActionProfile {
            cost: 1_000,
            reward: 2_000,
            required_authenticity: 0.85,
            required_roles: &[Authenticity],
        }),
        "interact_governor" => Some(ActionProfile {
            cost: 2_000,
            reward: 1_500,
            required_authenticity: 0.90,
            required_roles: &[Authenticity, Tradition],
        }),
        "asset_evolution" => Some(ActionProfile {
            cost: 5_000,
            reward: 3_000,
            required_authenticity: 0.88,
            required_roles: &[Economic, Authenticity],
        }),
        "asset_synthesis" => Some(ActionProfile {
            cost: 10_000,
            reward: 8_000,
            required_authenticity: 0.95,
            required_roles: &[Authenticity, Tradition, Economic],
        }),
        "sync_state" => Some(ActionProfile {
            cost: 0,
            reward: 0,
            required_authenticity: 0.85,
            required_roles: &[GeneralConsensus],
        }),
        _ => None,
    }
}

/// Derives the typed consequence deltas for an action.
fn derive_consequences(action_type: &str, params: &ActionParams) -> Vec<Consequence> {
    match action_type {
        "complete_quest" => vec![
            Consequence::ReputationChange { target: "overall".into(), delta: 0.1 },
            Consequence::TraditionMastery { tradition: "enochian".into(), delta: 0.05 },
            Consequence::EnergyChange { delta: -5 },
        ],
        "interact_governor" => vec![Consequence::GovernorRelationship {
            governor: params.governor.clone().unwrap_or_else(|| "unknown".into()),
            delta: 0.15,
        }],
        "asset_evolution" | "asset_synthesis" => vec![Consequence::AssetEvolution {
            asset_id: params.asset_id.clone().unwrap_or_else(|| "unknown".into()),
        }],
        _ => Vec::new(),
    }
}

/// Builds candidate transitions from a state, an action, and its parameters.
#[derive(Debug)]
pub struct TransitionProposer {
    config: Arc<EngineConfig>,
    store: Arc<GameStateStore>,
}

impl TransitionProposer {
    #[must_use]
    pub fn new(config: Arc<EngineConfig>, store: Arc<GameStateStore>) -> Self {
        Self { config, store }
    }

    /// Derives a pending transition for `action_type` applied to the state
    /// identified by `from_state_id`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidAction`] if the action type is unknown
    /// or the source state is not found, and
    /// [`EngineError::InsufficientResource`] if the projected balance would
    /// go negative.
    pub fn propose(
        &self,
        from_state_id: &StateId,
        action_type: &str,
        params: ActionParams,
    ) -> Result<StateTransition, EngineError> {
        let profile = action_profile(action_type)
            .ok_or_else(|| EngineError::InvalidAction(format!("unknown action {action_type}")))?;
        let from_state = self.store.get(from_state_id).ok_or_else(|| {
            EngineError::InvalidAction(format!("source state {from_state_id} not found"))
        })?;

        let consequences = derive_consequences(action_type, &params);
        let proposed_fields = project_fields(&from_state, &consequences, &profile)?;

        let now = Utc::now();
        let transition = StateTransition {
            transition_id: TransitionId::generate(),
            from_state_id: from_state_id.clone(),
            to_state_id: None,
            player_id: from_state.player_id.clone(),
            action_type: action_type.to_owned(),
            action_params: params,
            consequences,
            proposed_fields,
            cost: profile.cost,
            reward: profile.reward,
            required_authenticity: profile.required_authenticity,
            required_roles: profile.required_roles.to_vec(),
            consensus_reached: false,
            anchor: None,
            created_at: now,
            deadline: now +
                ChronoDuration::seconds(
                    i64::try_from(self.config.vote_timeout_seconds).unwrap_or(i64::MAX),
                ),
            finalized_at: None,
        };
        debug!(
            transition = %transition.transition_id,
            player = %transition.player_id,
            action = action_type,
            cost = profile.cost,
            "proposed transition"
        );
        Ok(transition)
    }
}

/// Applies consequences and the economic profile to a working copy of the
/// source state's fields, producing the prospective next state.
fn project_fields(
    from_state: &GameState,
    consequences: &[Consequence],
    profile: &ActionProfile,
) -> Result<StateFields, EngineError> {
    let mut fields = from_state.fields.clone();

    for consequence in consequences {
        match consequence {
            Consequence::ReputationChange { target, delta } => {
                let entry = fields.reputation_scores.entry(target.clone()).or_insert(0.0);
                *entry = (*entry + delta).clamp(0.0, 1.0);
            }
            Consequence::TraditionMastery { tradition, delta } => {
                let entry = fields.tradition_mastery.entry(tradition.clone()).or_insert(0.0);
                *entry = (*entry + delta).clamp(0.0, 1.0);
            }
            Consequence::GovernorRelationship { governor, delta } => {
                let entry =
                    fields.governor_relationships.entry(governor.clone()).or_insert(0.0);
                *entry = (*entry + delta).clamp(0.0, 1.0);
            }
            Consequence::EnergyChange { delta } => {
                let energy = i64::from(fields.energy) + i64::from(*delta);
                fields.energy = u32::try_from(energy.clamp(0, 25)).unwrap_or(0);
            }
            Consequence::AssetEvolution { asset_id } => {
                fields.owned_assets.insert(asset_id.clone());
            }
        }
    }

    fields.balance = fields.balance.checked_sub(profile.cost).ok_or(
        EngineError::InsufficientResource {
            required: profile.cost,
            available: from_state.fields.balance,
        },
    )?;
    fields.pending_rewards += profile.reward;
    Ok(fields)
}
