use crate::types::{RoundId, StateId, TransitionId, ValidatorId};
use thiserror::Error;

/// Errors produced by the consensus kernel.
///
/// Local errors (`InvalidAction`, `InsufficientResource`, `StateConflict`)
/// are returned to the proposing caller and are correctable by it. Vote-level
/// errors drop the offending vote while the round continues. Round-level
/// failures are recorded on the archived transition and surfaced through the
/// outcome channel. Nothing here is fatal to the process: a stuck round
/// times out rather than blocking the coordinator.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// Unknown action type, or the referenced source state does not exist.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// The projected resource balance would go negative.
    #[error("insufficient resources: need {required}, have {available}")]
    InsufficientResource { required: u64, available: u64 },

    /// The referenced prior state is not the current head for its player.
    /// Guards against racing transitions on the same player.
    #[error("state conflict: {prior} is not the current head (head is {head})")]
    StateConflict { prior: StateId, head: StateId },

    /// No state with this id is known to the store.
    #[error("unknown state: {0}")]
    UnknownState(StateId),

    /// No validator with this id is registered.
    #[error("unknown validator: {0}")]
    UnknownValidator(ValidatorId),

    /// Bad signature, duplicate vote, non-participant, or late arrival.
    /// The vote is dropped; the round continues.
    #[error("invalid vote from {validator}: {reason}")]
    InvalidVote { validator: ValidatorId, reason: String },

    /// No trusted validator is eligible for the action's required roles.
    /// Retryable: the validator set changes as nodes register and stake.
    #[error("no eligible validators available")]
    NoEligibleValidators,

    /// No active round with this id.
    #[error("unknown round: {0}")]
    UnknownRound(RoundId),

    /// The round's deadline expired before quorum. The transition is dropped
    /// as unresolved; no state mutation occurred.
    #[error("quorum timeout for round {0}")]
    QuorumTimeout(RoundId),

    /// The anchor service could not be reached. Finalization still counts;
    /// anchoring is retried out-of-band.
    #[error("anchor unavailable: {0}")]
    AnchorUnavailable(String),

    /// The configured cap on simultaneously active rounds is exhausted.
    #[error("active round capacity exhausted for transition {0}")]
    RoundCapacity(TransitionId),

    /// A checkpoint document failed to serialize, deserialize, or verify.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

impl EngineError {
    /// Returns `true` if the caller can correct its input and retry.
    #[must_use]
    pub fn is_caller_correctable(&self) -> bool {
        matches!(
            self,
            Self::InvalidAction(_) |
                Self::InsufficientResource { .. } |
                Self::StateConflict { .. } |
                Self::UnknownState(_)
        )
    }

    /// Returns `true` if the operation may succeed when retried later
    /// without any caller-side change.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::AnchorUnavailable(_) | Self::RoundCapacity(_) | Self::NoEligibleValidators
        )
    }
}
