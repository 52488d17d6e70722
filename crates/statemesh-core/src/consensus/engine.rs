//! Consensus coordination: one round per proposed transition.
//!
//! The coordinator owns the active-rounds table and drives each round from
//! proposal through vote collection to finalization, rejection, or timeout.
//! Vote requests for a round are dispatched to all selected validators
//! concurrently and awaited together under the round deadline; a semaphore
//! caps the number of simultaneously active rounds to bound memory and
//! outstanding network fan-out.

use crate::anchor::{anchor_with_retry, AnchorClient, TransitionProof};
use crate::config::EngineConfig;
use crate::consensus::quorum::{self, QuorumDecision};
use crate::consensus::round::ConsensusRound;
use crate::errors::EngineError;
use crate::proposer::TransitionProposer;
use crate::state::{Checkpoint, GameStateStore};
use crate::transport::VoteTransport;
use crate::types::{
    ActionParams, RoundId, RoundOutcome, RoundStatus, StateId, StateTransition, TransitionId,
    TransitionRecord, ValidatorId, ValidatorNode, VoteRequest, VoteResponse,
};
use crate::validator::ValidatorRegistry;
use chrono::Utc;
use dashmap::DashMap;
use ed25519_dalek::{Signature, Verifier};
use futures::future;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Capacity of the finalized-outcomes broadcast channel. Slow subscribers
/// lag rather than block the coordinator.
const OUTCOME_CHANNEL_CAPACITY: usize = 256;

/// One active round plus the capacity permit held for its lifetime.
struct ActiveRound {
    context: Mutex<RoundContext>,
    /// Released when the round is archived and this entry is dropped.
    _permit: OwnedSemaphorePermit,
}

struct RoundContext {
    round: ConsensusRound,
    transition: StateTransition,
}

/// Runs Byzantine fault tolerant consensus rounds over proposed state
/// transitions.
pub struct ConsensusCoordinator {
    config: Arc<EngineConfig>,
    store: Arc<GameStateStore>,
    registry: Arc<ValidatorRegistry>,
    transport: Arc<dyn VoteTransport>,
    anchor: Arc<dyn AnchorClient>,
    proposer: TransitionProposer,
    rounds: DashMap<RoundId, Arc<ActiveRound>>,
    archived: DashMap<TransitionId, TransitionRecord>,
    round_permits: Arc<Semaphore>,
    outcomes: broadcast::Sender<RoundOutcome>,
}

impl ConsensusCoordinator {
    #[must_use]
    pub fn new(
        config: Arc<EngineConfig>,
        store: Arc<GameStateStore>,
        registry: Arc<ValidatorRegistry>,
        transport: Arc<dyn VoteTransport>,
        anchor: Arc<dyn AnchorClient>,
    ) -> Arc<Self> {
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        let round_permits = Arc::new(Semaphore::new(config.max_concurrent_rounds));
        let proposer = TransitionProposer::new(Arc::clone(&config), Arc::clone(&store));
        Arc::new(Self {
            config,
            store,
            registry,
            transport,
            anchor,
            proposer,
            rounds: DashMap::new(),
            archived: DashMap::new(),
            round_permits,
            outcomes,
        })
    }

    /// Proposes a state transition and starts its consensus round.
    ///
    /// Derives the candidate next state, selects validators, dispatches one
    /// vote request per validator concurrently, and arms the round deadline.
    /// Returns the transition and round ids; the outcome arrives on the
    /// channel returned by [`Self::subscribe_finalized`].
    ///
    /// # Errors
    ///
    /// Returns the proposer's local errors ([`EngineError::InvalidAction`],
    /// [`EngineError::InsufficientResource`]) and
    /// [`EngineError::RoundCapacity`] when the cap on simultaneously active
    /// rounds is exhausted.
    pub async fn propose_transition(
        self: &Arc<Self>,
        from_state_id: &StateId,
        action_type: &str,
        params: ActionParams,
    ) -> Result<(TransitionId, RoundId), EngineError> {
        let transition = self.proposer.propose(from_state_id, action_type, params)?;

        let permit = Arc::clone(&self.round_permits)
            .try_acquire_owned()
            .map_err(|_| EngineError::RoundCapacity(transition.transition_id.clone()))?;

        let participants = self.registry.select_for(&transition.required_roles);
        if participants.is_empty() {
            return Err(EngineError::NoEligibleValidators);
        }
        let participant_ids: BTreeSet<ValidatorId> =
            participants.iter().map(|node| node.node_id.clone()).collect();

        let transition_id = transition.transition_id.clone();
        let round = ConsensusRound::new(
            transition_id.clone(),
            participant_ids,
            self.config.required_validators(participants.len()),
            self.config.byzantine_tolerance(participants.len()),
            transition.deadline,
        );
        let round_id = round.round_id.clone();
        let request = VoteRequest {
            round_id: round_id.clone(),
            transition_id: transition.transition_id.clone(),
            action_summary: format!(
                "{} for {}",
                transition.action_type, transition.player_id
            ),
            consequences: transition.consequences.clone(),
            required_authenticity: transition.required_authenticity,
            deadline: transition.deadline,
        };

        info!(
            round = %round_id,
            transition = %transition.transition_id,
            participants = participants.len(),
            required = round.required_validators,
            byzantine_tolerance = round.byzantine_tolerance,
            "starting consensus round"
        );

        self.rounds.insert(
            round_id.clone(),
            Arc::new(ActiveRound {
                context: Mutex::new(RoundContext { round, transition }),
                _permit: permit,
            }),
        );

        let engine = Arc::clone(self);
        let dispatch_round_id = round_id.clone();
        tokio::spawn(async move {
            engine.run_round(dispatch_round_id, participants, request).await;
        });

        Ok((transition_id, round_id))
    }

    /// Receives one validator's vote for an active round.
    ///
    /// Rejected votes are dropped without affecting the round: unknown
    /// round, non-participant, duplicate, bad signature, or confidence or
    /// authenticity outside `[0, 1]`. Accepted votes are weighted and the
    /// quorum rule re-evaluated; returns `true` when this vote resolved the
    /// round.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownRound`] for unknown or already-archived rounds
    /// and [`EngineError::InvalidVote`] for dropped votes.
    pub async fn receive_vote(
        self: &Arc<Self>,
        round_id: &RoundId,
        validator_id: &ValidatorId,
        response: VoteResponse,
    ) -> Result<bool, EngineError> {
        let active = self
            .rounds
            .get(round_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::UnknownRound(round_id.clone()))?;

        let node = self.registry.get(validator_id).ok_or_else(|| {
            EngineError::InvalidVote {
                validator: validator_id.clone(),
                reason: "unknown validator".into(),
            }
        })?;

        // Validators sign their own responses, so the wire ranges are
        // enforced here: an unchecked confidence would feed straight into
        // the vote weight and let one hostile voter swamp the tally.
        if !(0.0..=1.0).contains(&response.confidence) ||
            !(0.0..=1.0).contains(&response.authenticity_score)
        {
            return Err(EngineError::InvalidVote {
                validator: validator_id.clone(),
                reason: "confidence or authenticity outside [0, 1]".into(),
            });
        }

        let mut ctx = active.context.lock().await;
        verify_vote_signature(&node, &ctx.round, &response)?;
        let weight = self.registry.vote_weight(&node, response.confidence);
        ctx.round.record_vote(validator_id, &response, weight)?;
        debug!(
            round = %round_id,
            validator = %validator_id,
            approve = response.approve,
            weight,
            "recorded vote"
        );

        let tally = quorum::tally(&ctx.round.votes);
        let decision = quorum::evaluate(
            &tally,
            ctx.round.required_validators,
            ctx.round.byzantine_tolerance,
            self.config.consensus_threshold,
            ctx.round.participants.len(),
        );
        match decision {
            QuorumDecision::Pending => Ok(false),
            QuorumDecision::Confirmed => {
                if ctx.round.resolve(RoundStatus::Confirmed) {
                    self.finalize(&mut ctx, RoundStatus::Confirmed, None).await;
                }
                Ok(true)
            }
            QuorumDecision::Rejected => {
                if ctx.round.resolve(RoundStatus::Rejected) {
                    self.finalize(
                        &mut ctx,
                        RoundStatus::Rejected,
                        Some("quorum conditions failed with all votes received".into()),
                    )
                    .await;
                }
                Ok(true)
            }
        }
    }

    /// Returns a subscription to resolved-round outcomes (confirmed,
    /// rejected, and timed out).
    #[must_use]
    pub fn subscribe_finalized(&self) -> broadcast::Receiver<RoundOutcome> {
        self.outcomes.subscribe()
    }

    /// Governance hook: reputation of one validator.
    #[must_use]
    pub fn validator_reputation(&self, id: &ValidatorId) -> Option<f64> {
        self.registry.reputation(id)
    }

    /// Governance hook: the currently trusted validator set.
    #[must_use]
    pub fn trusted_validator_set(&self) -> Vec<ValidatorId> {
        self.registry.trusted_set()
    }

    /// Archived record for a resolved transition.
    #[must_use]
    pub fn transition_record(&self, transition_id: &TransitionId) -> Option<TransitionRecord> {
        self.archived.get(transition_id).map(|record| record.clone())
    }

    /// Number of rounds currently collecting votes.
    #[must_use]
    pub fn active_rounds(&self) -> usize {
        self.rounds.len()
    }

    /// Exports a checkpoint of all head states and resolved transitions.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        let mut resolved: Vec<TransitionRecord> =
            self.archived.iter().map(|entry| entry.value().clone()).collect();
        resolved.sort_by(|a, b| a.transition.transition_id.cmp(&b.transition.transition_id));
        Checkpoint::capture(&self.store, resolved)
    }

    /// The shared state store.
    #[must_use]
    pub fn store(&self) -> &Arc<GameStateStore> {
        &self.store
    }

    /// The shared validator registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ValidatorRegistry> {
        &self.registry
    }

    /// Dispatches vote requests for one round and enforces its deadline.
    async fn run_round(
        self: Arc<Self>,
        round_id: RoundId,
        participants: Vec<ValidatorNode>,
        request: VoteRequest,
    ) {
        let deadline = request.deadline;
        let collection = participants.into_iter().map(|validator| {
            let engine = Arc::clone(&self);
            let request = request.clone();
            let round_id = round_id.clone();
            async move {
                match engine.transport.request_vote(&validator, request).await {
                    Ok(response) => {
                        if let Err(error) =
                            engine.receive_vote(&round_id, &validator.node_id, response).await
                        {
                            debug!(
                                round = %round_id,
                                validator = %validator.node_id,
                                %error,
                                "vote dropped"
                            );
                        }
                    }
                    Err(error) => warn!(
                        round = %round_id,
                        validator = %validator.node_id,
                        %error,
                        "vote request failed"
                    ),
                }
            }
        });

        let budget = (deadline - Utc::now()).to_std().unwrap_or_default();
        // In-flight requests are cancelled on expiry; late votes find the
        // round archived and are rejected.
        let _ = tokio::time::timeout(budget, future::join_all(collection)).await;

        // All responses are in (or abandoned). If quorum has not resolved
        // the round, wait out the remainder of the deadline and expire it.
        let remaining = (deadline - Utc::now()).to_std().unwrap_or_default();
        if !remaining.is_zero() && self.rounds.contains_key(&round_id) {
            tokio::time::sleep(remaining).await;
        }
        self.expire_round(&round_id).await;
    }

    /// Force-resolves a still-collecting round as timed out.
    async fn expire_round(self: &Arc<Self>, round_id: &RoundId) {
        let Some(active) = self.rounds.get(round_id).map(|entry| Arc::clone(entry.value()))
        else {
            return;
        };
        let mut ctx = active.context.lock().await;
        if ctx.round.resolve(RoundStatus::TimedOut) {
            warn!(
                round = %round_id,
                transition = %ctx.transition.transition_id,
                votes = ctx.round.votes.len(),
                "consensus round timed out"
            );
            self.finalize(
                &mut ctx,
                RoundStatus::TimedOut,
                Some(EngineError::QuorumTimeout(round_id.clone()).to_string()),
            )
            .await;
        }
    }

    /// Archives a resolved round and applies its side effects.
    ///
    /// Confirmed rounds commit the proposed state, reward validators whose
    /// vote matched the decision, and penalize mismatched voters (stake
    /// slashing gated on the accuracy trust floor so honest minority dissent
    /// is not punished). Rejected and timed-out rounds mutate no state.
    /// Idempotent per transition id: a replay of an already-archived
    /// transition is a no-op.
    async fn finalize(
        self: &Arc<Self>,
        ctx: &mut RoundContext,
        status: RoundStatus,
        reason: Option<String>,
    ) {
        let transition_id = ctx.transition.transition_id.clone();
        if self.archived.contains_key(&transition_id) {
            return;
        }

        let mut status = status;
        let mut reason = reason;
        // A demotion below (commit conflict) is not a quorum verdict; the
        // approving validators were not wrong and are not penalized for it.
        let quorum_rejected = status == RoundStatus::Rejected;
        if status == RoundStatus::Confirmed {
            match self
                .store
                .commit(&ctx.transition.from_state_id, ctx.transition.proposed_fields.clone())
            {
                Ok(new_state) => {
                    let signatures: Vec<String> = ctx
                        .round
                        .approving_validators()
                        .iter()
                        .filter_map(|id| ctx.round.votes.get(id))
                        .map(|vote| vote.signature.clone())
                        .collect();
                    self.store.attach_signatures(&new_state.state_id, signatures);
                    ctx.transition.to_state_id = Some(new_state.state_id.clone());
                    ctx.transition.consensus_reached = true;
                    ctx.transition.finalized_at = Some(Utc::now());
                    self.apply_incentives(ctx, true);
                    self.spawn_anchor(ctx, &new_state.merkle_root);
                    info!(
                        round = %ctx.round.round_id,
                        transition = %transition_id,
                        new_state = %new_state.state_id,
                        version = new_state.version,
                        "transition finalized"
                    );
                }
                Err(error) => {
                    // Racing transition won the head; archive as rejected
                    // with the conflict recorded.
                    warn!(
                        round = %ctx.round.round_id,
                        transition = %transition_id,
                        %error,
                        "commit failed after quorum"
                    );
                    status = RoundStatus::Rejected;
                    reason = Some(error.to_string());
                }
            }
        }
        if quorum_rejected {
            self.apply_incentives(ctx, false);
        }

        let record = TransitionRecord {
            transition: ctx.transition.clone(),
            round_id: ctx.round.round_id.clone(),
            status,
            reason: reason.clone(),
            consensus_proof: ctx.round.consensus_proof(status),
            decided_at: Utc::now(),
        };
        self.archived.insert(transition_id.clone(), record);
        self.rounds.remove(&ctx.round.round_id);

        let _ = self.outcomes.send(RoundOutcome {
            round_id: ctx.round.round_id.clone(),
            transition_id,
            player_id: ctx.transition.player_id.clone(),
            status,
            new_state_id: ctx.transition.to_state_id.clone(),
            reason,
        });
    }

    /// Rewards matching voters and penalizes mismatched ones.
    ///
    /// Rewards apply only to confirmed rounds (`decision == true`); for
    /// definitive rejections only the mismatch penalty runs. Timed-out
    /// rounds never reach here.
    fn apply_incentives(&self, ctx: &RoundContext, decision: bool) {
        for (validator_id, vote) in &ctx.round.votes {
            if vote.approve == decision {
                if decision {
                    self.registry.apply_reward(validator_id, self.config.base_reward);
                }
            } else {
                self.registry.apply_slash(validator_id);
            }
        }
    }

    /// Anchors the finalized transition's proof without blocking the round.
    fn spawn_anchor(self: &Arc<Self>, ctx: &RoundContext, state_merkle_root: &str) {
        let proof = TransitionProof {
            transition_id: ctx.transition.transition_id.clone(),
            round_id: ctx.round.round_id.clone(),
            consensus_proof: ctx.round.consensus_proof(RoundStatus::Confirmed),
            state_merkle_root: state_merkle_root.to_owned(),
        };
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let transition_id = proof.transition_id.clone();
            let receipt = anchor_with_retry(
                engine.anchor.as_ref(),
                &proof,
                engine.config.anchor_retry_attempts,
                engine.config.anchor_retry_delay(),
            )
            .await;
            if let Some(receipt) = receipt {
                debug!(
                    transition = %transition_id,
                    anchor_ref = %receipt.anchor_ref,
                    block_height = receipt.block_height,
                    "transition anchored"
                );
                if let Some(mut record) = engine.archived.get_mut(&transition_id) {
                    record.transition.anchor = Some(receipt);
                }
            } else {
                warn!(transition = %transition_id, "anchoring abandoned after retries");
            }
        });
    }
}

/// Verifies the ed25519 signature on a vote against the validator's key.
fn verify_vote_signature(
    node: &ValidatorNode,
    round: &ConsensusRound,
    response: &VoteResponse,
) -> Result<(), EngineError> {
    let payload = VoteResponse::signing_payload(
        &round.round_id,
        &round.transition_id,
        response.approve,
        response.confidence,
        response.authenticity_score,
    );
    let bytes = hex::decode(&response.signature).map_err(|_| EngineError::InvalidVote {
        validator: node.node_id.clone(),
        reason: "signature is not valid hex".into(),
    })?;
    let signature =
        Signature::from_slice(&bytes).map_err(|_| EngineError::InvalidVote {
            validator: node.node_id.clone(),
            reason: "malformed signature".into(),
        })?;
    node.public_key.verify(&payload, &signature).map_err(|_| EngineError::InvalidVote {
        validator: node.node_id.clone(),
        reason: "signature verification failed".into(),
    })
}

impl std::fmt::Debug for ConsensusCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusCoordinator")
            .field("active_rounds", &self.rounds.len())
            .field("archived", &self.archived.len())
            .finish_non_exhaustive()
    }
}
