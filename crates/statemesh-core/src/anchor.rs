//! External anchoring of finalized transitions.
//!
//! The engine treats the anchor service as an opaque collaborator: it hands
//! over a transition proof and records the returned reference and block
//! height. Anchoring runs post-commit and never blocks quorum finalization;
//! failures are retried a bounded number of times and then surfaced as a
//! warning only.

use crate::errors::EngineError;
use crate::types::{AnchorReceipt, RoundId, TransitionId};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// Proof document anchored for one finalized transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionProof {
    pub transition_id: TransitionId,
    pub round_id: RoundId,
    /// SHA-256 commitment over the round's votes and decision.
    pub consensus_proof: String,
    /// Merkle root of the committed state.
    pub state_merkle_root: String,
}

/// Durable anchoring backend (consumed, external).
#[async_trait]
pub trait AnchorClient: Send + Sync {
    /// Anchors `proof` and returns an opaque reference plus block height.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AnchorUnavailable`] when the backend cannot be
    /// reached; the engine treats this as retryable and non-blocking.
    async fn anchor(&self, proof: &TransitionProof) -> Result<AnchorReceipt, EngineError>;
}

/// Retries `client.anchor` up to `attempts` times with a fixed delay.
///
/// Returns `None` after exhausting attempts; the caller keeps the transition
/// finalized either way.
pub(crate) async fn anchor_with_retry(
    client: &dyn AnchorClient,
    proof: &TransitionProof,
    attempts: u32,
    delay: Duration,
) -> Option<AnchorReceipt> {
    for attempt in 1..=attempts.max(1) {
        match client.anchor(proof).await {
            Ok(receipt) => return Some(receipt),
            Err(error) => {
                warn!(
                    transition = %proof.transition_id,
                    attempt,
                    %error,
                    "anchor attempt failed"
                );
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    None
}

/// In-memory anchor backend for local runs and tests: assigns monotonically
/// increasing block heights and remembers every anchored proof.
#[derive(Debug, Default)]
pub struct InMemoryAnchor {
    height: AtomicU64,
    anchored: DashMap<TransitionId, TransitionProof>,
}

impl InMemoryAnchor {
    #[must_use]
    pub fn new() -> Self {
        Self { height: AtomicU64::new(850_000), anchored: DashMap::new() }
    }

    /// Returns whether a transition's proof has been anchored.
    #[must_use]
    pub fn contains(&self, transition_id: &TransitionId) -> bool {
        self.anchored.contains_key(transition_id)
    }

    /// Number of anchored proofs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.anchored.len()
    }

    /// Returns whether nothing has been anchored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchored.is_empty()
    }
}

#[async_trait]
impl AnchorClient for InMemoryAnchor {
    async fn anchor(&self, proof: &TransitionProof) -> Result<AnchorReceipt, EngineError> {
        let block_height = self.height.fetch_add(1, Ordering::SeqCst);
        self.anchored.insert(proof.transition_id.clone(), proof.clone());
        Ok(AnchorReceipt {
            anchor_ref: format!("anchor-{}-{}", proof.transition_id, block_height),
            block_height,
        })
    }
}
