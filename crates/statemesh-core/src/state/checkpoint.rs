//! Full-snapshot checkpoint export and import.
//!
//! A checkpoint carries every player's head state, the archive of resolved
//! transition records, and a Merkle index over head-state hashes. Importing
//! a checkpoint into an empty store reconstructs identical head states and
//! fingerprints, which `import` verifies by recomputation.

use crate::errors::EngineError;
use crate::hasher;
use crate::state::store::GameStateStore;
use crate::types::{GameState, StateId, TransitionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Merkle index over the checkpointed head states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleIndex {
    /// Root over the leaf hashes below, using the same pairing rule as the
    /// per-state Merkle tree.
    pub root: String,
    /// Per-state leaf: the head's content hash, keyed by state id.
    pub leaves: BTreeMap<StateId, String>,
}

impl MerkleIndex {
    fn build(heads: &[GameState]) -> Self {
        let leaves: BTreeMap<StateId, String> = heads
            .iter()
            .map(|state| (state.state_id.clone(), state.content_hash.clone()))
            .collect();

        let mut level: Vec<String> = leaves.values().cloned().collect();
        if level.is_empty() {
            return Self { root: hasher::sha256_hex(b"empty"), leaves };
        }
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                next.push(hasher::sha256_hex(format!("{left}{right}").as_bytes()));
            }
            level = next;
        }
        let root = level.pop().unwrap_or_default();
        Self { root, leaves }
    }
}

/// Exportable snapshot of the engine's durable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub created_at: DateTime<Utc>,
    /// Current head state per player.
    pub heads: Vec<GameState>,
    /// Resolved transition records (confirmed, rejected, and timed out).
    pub resolved: Vec<TransitionRecord>,
    pub merkle_index: MerkleIndex,
}

impl Checkpoint {
    /// Captures the store's heads and the supplied resolved records.
    #[must_use]
    pub fn capture(store: &GameStateStore, resolved: Vec<TransitionRecord>) -> Self {
        let heads = store.heads();
        let merkle_index = MerkleIndex::build(&heads);
        info!(
            heads = heads.len(),
            resolved = resolved.len(),
            root = %merkle_index.root,
            "captured checkpoint"
        );
        Self { created_at: Utc::now(), heads, resolved, merkle_index }
    }

    /// Serializes the checkpoint document.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Checkpoint`] if serialization fails.
    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::Checkpoint(e.to_string()))
    }

    /// Parses a checkpoint document.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Checkpoint`] if parsing fails.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::Checkpoint(e.to_string()))
    }

    /// Restores every head state into `store`, verifying that recomputed
    /// fingerprints match the checkpointed ones.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Checkpoint`] if any state's recomputed hash or
    /// Merkle root disagrees with the document.
    pub fn import(&self, store: &GameStateStore) -> Result<(), EngineError> {
        for state in &self.heads {
            let fingerprint = hasher::fingerprint(&state.fields);
            if fingerprint.content_hash != state.content_hash ||
                fingerprint.merkle_root != state.merkle_root
            {
                return Err(EngineError::Checkpoint(format!(
                    "fingerprint mismatch for state {}",
                    state.state_id
                )));
            }
            store.restore(state.clone());
        }
        info!(heads = self.heads.len(), "imported checkpoint");
        Ok(())
    }
}
