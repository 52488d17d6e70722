//! Consensus round execution context.

use crate::errors::EngineError;
use crate::hasher;
use crate::types::{RoundId, RoundStatus, TransitionId, ValidatorId, VoteResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Phase of a round's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Votes are being collected under the deadline.
    Collecting,
    /// Terminal; the decision has been made.
    Resolved(RoundStatus),
}

/// One recorded vote plus its computed weight.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedVote {
    pub approve: bool,
    pub confidence: f64,
    pub authenticity_score: f64,
    /// Weight computed at arrival from the validator's registry record.
    pub weight: f64,
    pub signature: String,
}

/// Transient execution context for one transition's voting.
///
/// Each validator may vote at most once; the vote map is keyed by validator
/// id to enforce this. The round is created `Collecting` and resolved
/// exactly once.
#[derive(Debug)]
pub struct ConsensusRound {
    pub round_id: RoundId,
    pub transition_id: TransitionId,
    pub participants: BTreeSet<ValidatorId>,
    pub required_validators: usize,
    pub byzantine_tolerance: usize,
    pub votes: BTreeMap<ValidatorId, RecordedVote>,
    pub phase: RoundPhase,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub deadline: DateTime<Utc>,
}

impl ConsensusRound {
    #[must_use]
    pub fn new(
        transition_id: TransitionId,
        participants: BTreeSet<ValidatorId>,
        required_validators: usize,
        byzantine_tolerance: usize,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            round_id: RoundId::generate(),
            transition_id,
            participants,
            required_validators,
            byzantine_tolerance,
            votes: BTreeMap::new(),
            phase: RoundPhase::Collecting,
            started_at: Utc::now(),
            ended_at: None,
            deadline,
        }
    }

    /// Returns `true` once the round has a terminal status.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self.phase, RoundPhase::Resolved(_))
    }

    /// Records a validated vote.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidVote`] if the round is already
    /// resolved, the validator is not a participant, or it has already
    /// voted.
    pub fn record_vote(
        &mut self,
        validator_id: &ValidatorId,
        response: &VoteResponse,
        weight: f64,
    ) -> Result<(), EngineError> {
        if self.is_resolved() {
            return Err(EngineError::InvalidVote {
                validator: validator_id.clone(),
                reason: "round already resolved".into(),
            });
        }
        if !self.participants.contains(validator_id) {
            return Err(EngineError::InvalidVote {
                validator: validator_id.clone(),
                reason: "not selected for this round".into(),
            });
        }
        if self.votes.contains_key(validator_id) {
            return Err(EngineError::InvalidVote {
                validator: validator_id.clone(),
                reason: "already voted".into(),
            });
        }
        self.votes.insert(
            validator_id.clone(),
            RecordedVote {
                approve: response.approve,
                confidence: response.confidence,
                authenticity_score: response.authenticity_score,
                weight,
                signature: response.signature.clone(),
            },
        );
        Ok(())
    }

    /// Marks the round terminal and stamps its end time. Idempotent against
    /// double resolution: only the first call wins.
    pub fn resolve(&mut self, status: RoundStatus) -> bool {
        if self.is_resolved() {
            return false;
        }
        self.phase = RoundPhase::Resolved(status);
        self.ended_at = Some(Utc::now());
        true
    }

    /// SHA-256 commitment over the round's votes and decision, carried in
    /// the anchored transition proof.
    #[must_use]
    pub fn consensus_proof(&self, status: RoundStatus) -> String {
        #[derive(Serialize)]
        struct ProofBody<'a> {
            round_id: &'a RoundId,
            transition_id: &'a TransitionId,
            votes: &'a BTreeMap<ValidatorId, RecordedVote>,
            status: &'a str,
        }
        let body = ProofBody {
            round_id: &self.round_id,
            transition_id: &self.transition_id,
            votes: &self.votes,
            status: status.as_str(),
        };
        let encoded =
            serde_json::to_string(&body).expect("proof body serialization is infallible");
        hasher::sha256_hex(encoded.as_bytes())
    }

    /// Ids of participants whose vote approved, in id order.
    #[must_use]
    pub fn approving_validators(&self) -> Vec<ValidatorId> {
        self.votes
            .iter()
            .filter(|(_, vote)| vote.approve)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
