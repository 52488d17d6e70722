//! Head-state store with per-player commit serialization.

use crate::errors::EngineError;
use crate::hasher;
use crate::types::{GameState, PlayerId, StateFields, StateId};
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};

/// Holds the latest accepted state per player plus an archive of every
/// snapshot ever accepted (keyed by state id, used for lookups and
/// checkpoint export).
///
/// Commits for a single player are serialized through the `DashMap` entry
/// lock on that player's head; cross-player commits proceed in parallel.
#[derive(Debug, Default)]
pub struct GameStateStore {
    heads: DashMap<PlayerId, GameState>,
    archive: DashMap<StateId, GameState>,
}

impl GameStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a player's genesis state at version 1.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StateConflict`] if the player already has a
    /// head state, and [`EngineError::InvalidAction`] if the fields fail
    /// range validation.
    pub fn genesis(
        &self,
        player_id: PlayerId,
        fields: StateFields,
    ) -> Result<GameState, EngineError> {
        validate_fields(&fields)?;
        let entry = self.heads.entry(player_id.clone());
        match entry {
            dashmap::Entry::Occupied(existing) => Err(EngineError::StateConflict {
                prior: existing.get().state_id.clone(),
                head: existing.get().state_id.clone(),
            }),
            dashmap::Entry::Vacant(vacant) => {
                let state = build_state(player_id, 1, fields);
                info!(
                    player = %state.player_id,
                    state_id = %state.state_id,
                    "created genesis state"
                );
                self.archive.insert(state.state_id.clone(), state.clone());
                vacant.insert(state.clone());
                Ok(state)
            }
        }
    }

    /// Commits validated fields as the player's next head state.
    ///
    /// Assigns the next version, recomputes the fingerprint, and stores the
    /// new snapshot under a fresh state id.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownState`] if `prior_state_id` is not in
    /// the archive, [`EngineError::StateConflict`] if it is not the current
    /// head for its player, and [`EngineError::InvalidAction`] if the fields
    /// fail range validation.
    pub fn commit(
        &self,
        prior_state_id: &StateId,
        fields: StateFields,
    ) -> Result<GameState, EngineError> {
        validate_fields(&fields)?;
        let player_id = self
            .archive
            .get(prior_state_id)
            .map(|state| state.player_id.clone())
            .ok_or_else(|| EngineError::UnknownState(prior_state_id.clone()))?;

        // The entry lock serializes all commits for this player.
        let mut entry = self
            .heads
            .get_mut(&player_id)
            .ok_or_else(|| EngineError::UnknownState(prior_state_id.clone()))?;
        if entry.state_id != *prior_state_id {
            return Err(EngineError::StateConflict {
                prior: prior_state_id.clone(),
                head: entry.state_id.clone(),
            });
        }

        let state = build_state(player_id, entry.version + 1, fields);
        debug!(
            player = %state.player_id,
            state_id = %state.state_id,
            version = state.version,
            "committed state"
        );
        self.archive.insert(state.state_id.clone(), state.clone());
        *entry = state.clone();
        Ok(state)
    }

    /// Attaches validator signatures to an archived (and possibly head)
    /// snapshot after finalization.
    pub fn attach_signatures(&self, state_id: &StateId, signatures: Vec<String>) {
        if let Some(mut state) = self.archive.get_mut(state_id) {
            state.validator_signatures.clone_from(&signatures);
        }
        if let Some(mut head) = self
            .heads
            .iter_mut()
            .find(|head| head.state_id == *state_id)
        {
            head.validator_signatures = signatures;
        }
    }

    /// Looks up any archived snapshot by id.
    #[must_use]
    pub fn get(&self, state_id: &StateId) -> Option<GameState> {
        self.archive.get(state_id).map(|state| state.clone())
    }

    /// Returns the player's current head state.
    #[must_use]
    pub fn head(&self, player_id: &PlayerId) -> Option<GameState> {
        self.heads.get(player_id).map(|state| state.clone())
    }

    /// Returns every player's current head state, sorted by player id.
    #[must_use]
    pub fn heads(&self) -> Vec<GameState> {
        let mut heads: Vec<GameState> =
            self.heads.iter().map(|entry| entry.value().clone()).collect();
        heads.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        heads
    }

    /// Restores a head state directly, bypassing commit checks. Used only by
    /// checkpoint import.
    pub(crate) fn restore(&self, state: GameState) {
        self.archive.insert(state.state_id.clone(), state.clone());
        self.heads.insert(state.player_id.clone(), state);
    }
}

fn build_state(player_id: PlayerId, version: u64, fields: StateFields) -> GameState {
    let fingerprint = hasher::fingerprint(&fields);
    let state_id = derive_state_id(&player_id, version, &fingerprint.content_hash);
    GameState {
        state_id,
        player_id,
        version,
        fields,
        content_hash: fingerprint.content_hash,
        merkle_root: fingerprint.merkle_root,
        validator_signatures: Vec::new(),
        last_update: Utc::now(),
    }
}

fn derive_state_id(player_id: &PlayerId, version: u64, content_hash: &str) -> StateId {
    let digest = hasher::sha256_hex(format!("{player_id}:{version}:{content_hash}").as_bytes());
    StateId::new(&digest[..16])
}

/// Schema/range checks applied before any state is accepted.
fn validate_fields(fields: &StateFields) -> Result<(), EngineError> {
    let unit_scores = fields
        .tradition_mastery
        .values()
        .chain(fields.governor_relationships.values())
        .chain(fields.reputation_scores.values())
        .chain(std::iter::once(&fields.authenticity_score));
    for score in unit_scores {
        if !(0.0..=1.0).contains(score) {
            return Err(EngineError::InvalidAction(format!(
                "score {score} outside [0, 1]"
            )));
        }
    }
    if fields.energy > 25 {
        return Err(EngineError::InvalidAction(format!(
            "energy {} above maximum 25",
            fields.energy
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(balance: u64) -> StateFields {
        StateFields { balance, energy: 20, authenticity_score: 0.9, ..StateFields::default() }
    }

    #[test]
    fn genesis_then_commit_bumps_version_and_hash() {
        let store = GameStateStore::new();
        let player = PlayerId::from("player_123");
        let v1 = store.genesis(player.clone(), fields(100)).unwrap();
        assert_eq!(v1.version, 1);

        let v2 = store.commit(&v1.state_id, fields(80)).unwrap();
        assert_eq!(v2.version, 2);
        assert_ne!(v2.content_hash, v1.content_hash);
        assert_eq!(store.head(&player).unwrap().state_id, v2.state_id);
        // Superseded snapshot stays retrievable.
        assert_eq!(store.get(&v1.state_id).unwrap().version, 1);
    }

    #[test]
    fn commit_against_stale_head_conflicts() {
        let store = GameStateStore::new();
        let v1 = store.genesis(PlayerId::from("p"), fields(100)).unwrap();
        let _v2 = store.commit(&v1.state_id, fields(90)).unwrap();

        let err = store.commit(&v1.state_id, fields(80)).unwrap_err();
        assert!(matches!(err, EngineError::StateConflict { .. }));
    }

    #[test]
    fn duplicate_genesis_conflicts() {
        let store = GameStateStore::new();
        store.genesis(PlayerId::from("p"), fields(100)).unwrap();
        let err = store.genesis(PlayerId::from("p"), fields(100)).unwrap_err();
        assert!(matches!(err, EngineError::StateConflict { .. }));
    }

    #[test]
    fn out_of_range_scores_rejected() {
        let store = GameStateStore::new();
        let mut bad = fields(100);
        bad.tradition_mastery.insert("enochian".into(), 1.5);
        assert!(matches!(
            store.genesis(PlayerId::from("p"), bad),
            Err(EngineError::InvalidAction(_))
        ));

        let mut too_energetic = fields(100);
        too_energetic.energy = 26;
        assert!(matches!(
            store.genesis(PlayerId::from("q"), too_energetic),
            Err(EngineError::InvalidAction(_))
        ));
    }

    #[test]
    fn unknown_prior_state_rejected() {
        let store = GameStateStore::new();
        let err = store.commit(&StateId::from("missing"), fields(10)).unwrap_err();
        assert!(matches!(err, EngineError::UnknownState(_)));
    }
}
