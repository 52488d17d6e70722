//! Deterministic state fingerprinting.
//!
//! Produces the content hash and Merkle root carried on every
//! [`GameState`](crate::types::GameState). Both are pure functions of the
//! state's [`StateFields`](crate::types::StateFields): unordered collections
//! are `BTreeMap`/`BTreeSet` in the data model, so the canonical JSON used
//! here is identical for structurally equal states regardless of how they
//! were built.

use crate::types::{Fingerprint, StateFields};
use sha2::{Digest, Sha256};

/// Computes the content hash and Merkle root for a field set.
#[must_use]
pub fn fingerprint(fields: &StateFields) -> Fingerprint {
    Fingerprint { content_hash: content_hash(fields), merkle_root: merkle_root(fields) }
}

/// SHA-256 over the compact canonical JSON serialization of all fields.
#[must_use]
pub fn content_hash(fields: &StateFields) -> String {
    // serde_json's default map is a BTreeMap, so object keys come out sorted.
    let canonical =
        serde_json::to_string(fields).expect("StateFields serialization is infallible");
    sha256_hex(canonical.as_bytes())
}

/// Merkle root built leaf-per-field.
///
/// Each leaf is `SHA-256("{field}:{canonical json value}")` in sorted field
/// order. Levels pair hex digests left-to-right; an unmatched trailing leaf
/// is paired with itself (the canonical padding rule for this tree — other
/// padding schemes would produce different, equally valid roots, so
/// cross-implementation verifiers must use this one). An empty field set
/// hashes the literal `"empty"` sentinel.
#[must_use]
pub fn merkle_root(fields: &StateFields) -> String {
    let value = serde_json::to_value(fields).expect("StateFields serialization is infallible");
    let serde_json::Value::Object(map) = value else {
        unreachable!("StateFields serializes to a JSON object");
    };

    let mut level: Vec<String> = map
        .iter()
        .map(|(field, value)| {
            let encoded =
                serde_json::to_string(value).expect("JSON value serialization is infallible");
            sha256_hex(format!("{field}:{encoded}").as_bytes())
        })
        .collect();

    if level.is_empty() {
        return sha256_hex(b"empty");
    }

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            next.push(sha256_hex(format!("{left}{right}").as_bytes()));
        }
        level = next;
    }
    level.pop().expect("non-empty level always reduces to a root")
}

/// Hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_fields() -> StateFields {
        StateFields {
            completed_quests: BTreeSet::from(["quest_001".into(), "quest_002".into()]),
            active_quests: BTreeSet::from(["quest_003".into()]),
            tradition_mastery: BTreeMap::from([
                ("enochian".into(), 0.5),
                ("hermetic_qabalah".into(), 0.3),
            ]),
            governor_relationships: BTreeMap::from([("abriond".into(), 0.7)]),
            reputation_scores: BTreeMap::from([("overall".into(), 0.6)]),
            owned_assets: BTreeSet::from(["token_001".into()]),
            energy: 20,
            balance: 50_000,
            staked: 10_000,
            pending_rewards: 2_000,
            authenticity_score: 0.92,
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let fields = sample_fields();
        assert_eq!(fingerprint(&fields), fingerprint(&fields.clone()));
    }

    #[test]
    fn fingerprint_is_insertion_order_independent() {
        let forward = sample_fields();
        // Build structurally equal collections in reverse insertion order.
        let mut reversed = sample_fields();
        reversed.tradition_mastery = [("hermetic_qabalah", 0.3), ("enochian", 0.5)]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect();
        reversed.completed_quests =
            ["quest_002", "quest_001"].into_iter().map(str::to_owned).collect();

        assert_eq!(fingerprint(&forward), fingerprint(&reversed));
    }

    #[test]
    fn fingerprint_changes_with_any_field() {
        let base = fingerprint(&sample_fields());

        let mut spent = sample_fields();
        spent.balance -= 1;
        let changed = fingerprint(&spent);

        assert_ne!(base.content_hash, changed.content_hash);
        assert_ne!(base.merkle_root, changed.merkle_root);
    }

    #[test]
    fn merkle_root_duplicates_trailing_leaf() {
        // StateFields has 11 top-level fields, so every level of the tree
        // exercises the odd-leaf duplication rule at least once.
        let root = merkle_root(&sample_fields());
        assert_eq!(root.len(), 64);
        assert_eq!(root, merkle_root(&sample_fields()));
    }

    #[test]
    fn content_hash_is_stable_hex() {
        let hash = content_hash(&StateFields::default());
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
