//! Core identifiers, state records, and wire contracts.
//!
//! Everything that crosses a module boundary lives here: the per-player
//! [`GameState`] record, the [`StateTransition`] under consensus, the
//! [`ValidatorNode`] registry record, and the vote request/response wire
//! contract exchanged with validators.

use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

string_id! {
    /// Identifies one player's state lineage.
    PlayerId
}
string_id! {
    /// Identifies a single immutable [`GameState`] snapshot.
    StateId
}
string_id! {
    /// Identifies a validator node across rounds.
    ValidatorId
}
string_id! {
    /// Identifies a proposed state transition.
    TransitionId
}
string_id! {
    /// Identifies one consensus round. Exactly one round exists per transition.
    RoundId
}

impl TransitionId {
    /// Generates a fresh transition id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("tx-{}", Uuid::new_v4().simple()))
    }
}

impl RoundId {
    /// Generates a fresh round id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("round-{}", Uuid::new_v4().simple()))
    }
}

/// Validator specialization. Action types declare which roles must take part
/// in their consensus round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorRole {
    /// Validates content authenticity scores.
    Authenticity,
    /// Validates tradition-mastery progression.
    Tradition,
    /// Validates economic effects (cost, reward, stake changes).
    Economic,
    /// General-purpose quorum participant. At least one is selected for
    /// every round regardless of the action's role requirements.
    GeneralConsensus,
}

impl ValidatorRole {
    /// Static label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authenticity => "authenticity",
            Self::Tradition => "tradition",
            Self::Economic => "economic",
            Self::GeneralConsensus => "general_consensus",
        }
    }
}

/// The hashable, non-metadata portion of a player's state.
///
/// Unordered collections are `BTreeMap`/`BTreeSet` so canonical serialization
/// is order-independent by construction: two structurally equal field sets
/// always serialize to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFields {
    pub completed_quests: BTreeSet<String>,
    pub active_quests: BTreeSet<String>,
    /// Per-tradition mastery, each in `[0, 1]`.
    pub tradition_mastery: BTreeMap<String, f64>,
    /// Per-governor relationship score, each in `[0, 1]`.
    pub governor_relationships: BTreeMap<String, f64>,
    /// Named reputation scores (e.g. `"overall"`).
    pub reputation_scores: BTreeMap<String, f64>,
    pub owned_assets: BTreeSet<String>,
    /// Action energy, `0..=25`.
    pub energy: u32,
    /// Spendable resource balance. Action costs are debited here.
    pub balance: u64,
    pub staked: u64,
    /// Rewards accrued by finalized transitions, not yet claimed.
    pub pending_rewards: u64,
    /// Content authenticity/quality score in `[0, 1]`.
    pub authenticity_score: f64,
}

/// Deterministic fingerprint of a [`StateFields`] value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// SHA-256 over the canonical serialization of all fields.
    pub content_hash: String,
    /// Merkle root built leaf-per-field. See [`crate::hasher`].
    pub merkle_root: String,
}

/// One accepted snapshot of a player's state.
///
/// Created at genesis and thereafter only by finalized transitions; `version`
/// strictly increases per player, and `content_hash`/`merkle_root` are pure
/// functions of `fields`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub state_id: StateId,
    pub player_id: PlayerId,
    pub version: u64,
    pub fields: StateFields,
    pub content_hash: String,
    pub merkle_root: String,
    /// Signatures of the validators that approved the transition producing
    /// this state. Empty for genesis states.
    pub validator_signatures: Vec<String>,
    pub last_update: DateTime<Utc>,
}

/// A typed delta derived from an action, applied to the prospective state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Consequence {
    ReputationChange { target: String, delta: f64 },
    TraditionMastery { tradition: String, delta: f64 },
    GovernorRelationship { governor: String, delta: f64 },
    EnergyChange { delta: i32 },
    AssetEvolution { asset_id: String },
}

/// Caller-supplied parameters for an action. Fields are optional because each
/// action type reads only the ones it needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionParams {
    pub quest_id: Option<String>,
    pub governor: Option<String>,
    pub asset_id: Option<String>,
}

/// A proposed state mutation awaiting (or past) consensus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub transition_id: TransitionId,
    pub from_state_id: StateId,
    /// Set when the transition is finalized and its state committed.
    pub to_state_id: Option<StateId>,
    pub player_id: PlayerId,

    pub action_type: String,
    pub action_params: ActionParams,
    pub consequences: Vec<Consequence>,
    /// Prospective next-state fields, committed only on confirmation.
    pub proposed_fields: StateFields,

    pub cost: u64,
    pub reward: u64,

    pub required_authenticity: f64,
    pub required_roles: Vec<ValidatorRole>,

    pub consensus_reached: bool,
    /// Opaque anchor reference and height, filled post-commit.
    pub anchor: Option<AnchorReceipt>,

    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

/// Receipt returned by the external anchor service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorReceipt {
    pub anchor_ref: String,
    pub block_height: u64,
}

/// Registry record for one validator node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorNode {
    pub node_id: ValidatorId,
    /// Ed25519 key that vote signatures are verified against.
    pub public_key: VerifyingKey,
    pub role: ValidatorRole,
    pub tradition_expertise: Vec<String>,

    pub stake: u64,
    /// Rolling fraction of votes that matched final decisions, in `[0, 1]`.
    pub accuracy_score: f64,
    /// Reputation used for selection ranking and vote weighting, in `[0, 1]`.
    /// Decays on detected misbehavior and never increases past 1.
    pub reputation_score: f64,
    pub uptime: f64,

    pub validation_count: u64,
    pub slash_count: u32,
    pub reward_earned: u64,
    pub last_seen: DateTime<Utc>,
}

/// Vote request sent to each selected validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub round_id: RoundId,
    pub transition_id: TransitionId,
    /// Human-readable action summary plus the consequences under review.
    pub action_summary: String,
    pub consequences: Vec<Consequence>,
    pub required_authenticity: f64,
    pub deadline: DateTime<Utc>,
}

/// A validator's signed vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    pub approve: bool,
    /// Validator's confidence in its own judgment, `0..=1`. Scales the vote
    /// weight during tallying.
    pub confidence: f64,
    /// Authenticity assessment of the proposed state, `0..=1`.
    pub authenticity_score: f64,
    /// Hex-encoded ed25519 signature over [`VoteResponse::signing_payload`].
    pub signature: String,
}

impl VoteResponse {
    /// Canonical byte payload a validator signs for a vote.
    ///
    /// Float fields are committed via their IEEE-754 bit patterns so the
    /// payload is exact and reproducible on both ends of the wire.
    #[must_use]
    pub fn signing_payload(
        round_id: &RoundId,
        transition_id: &TransitionId,
        approve: bool,
        confidence: f64,
        authenticity_score: f64,
    ) -> Vec<u8> {
        format!(
            "vote:{}:{}:{}:{:016x}:{:016x}",
            round_id,
            transition_id,
            approve,
            confidence.to_bits(),
            authenticity_score.to_bits(),
        )
        .into_bytes()
    }
}

/// Terminal status of a consensus round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Confirmed,
    Rejected,
    TimedOut,
}

impl RoundStatus {
    /// Static label for logs and archive records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
            Self::TimedOut => "timed_out",
        }
    }
}

/// Published on the finalized-outcomes channel for every resolved round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round_id: RoundId,
    pub transition_id: TransitionId,
    pub player_id: PlayerId,
    pub status: RoundStatus,
    /// New head state id, present only for confirmed rounds.
    pub new_state_id: Option<StateId>,
    pub reason: Option<String>,
}

/// Archived record of a resolved transition, kept for checkpoints and
/// idempotent replay detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub transition: StateTransition,
    pub round_id: RoundId,
    pub status: RoundStatus,
    pub reason: Option<String>,
    /// SHA-256 commitment over the round's votes and decision.
    pub consensus_proof: String,
    pub decided_at: DateTime<Utc>,
}
