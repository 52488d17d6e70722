use crate::consensus::quorum::{evaluate, tally, QuorumDecision};
use crate::consensus::round::RecordedVote;
use crate::types::ValidatorId;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

const THRESHOLD: f64 = 0.67;

fn vote(approve: bool, weight: f64) -> RecordedVote {
    RecordedVote {
        approve,
        confidence: 1.0,
        authenticity_score: 0.9,
        weight,
        signature: "00".repeat(64),
    }
}

fn votes(entries: &[(&str, bool, f64)]) -> BTreeMap<ValidatorId, RecordedVote> {
    entries
        .iter()
        .map(|(id, approve, weight)| (ValidatorId::from(*id), vote(*approve, *weight)))
        .collect()
}

#[test]
fn four_of_five_equal_weights_confirm() {
    // 5 participants: required 3, byzantine tolerance 1. Four approvals at
    // weight 1.0 against one rejection clear all three conditions.
    let votes = votes(&[
        ("v1", true, 1.0),
        ("v2", true, 1.0),
        ("v3", true, 1.0),
        ("v4", true, 1.0),
        ("v5", false, 1.0),
    ]);
    let tally = tally(&votes);
    assert_eq!(tally.approvals, 4);
    assert!((tally.approval_weight - 4.0).abs() < 1e-9);
    assert_eq!(evaluate(&tally, 3, 1, THRESHOLD, 5), QuorumDecision::Confirmed);
}

#[test]
fn pending_until_byzantine_safe() {
    // byzantine tolerance 2 needs 2·2+1 = 5 votes before any decision.
    let votes = votes(&[
        ("v1", true, 1.0),
        ("v2", true, 1.0),
        ("v3", true, 1.0),
        ("v4", true, 1.0),
    ]);
    let tally = tally(&votes);
    assert_eq!(evaluate(&tally, 3, 2, THRESHOLD, 7), QuorumDecision::Pending);
}

#[test]
fn weighted_minority_can_block_a_counted_majority() {
    // Count condition holds (3 ≥ 3) but two heavily weighted rejections pull
    // the approval weight fraction below the threshold. All five voted and
    // the round is Byzantine-safe, so the failure is definitive.
    let votes = votes(&[
        ("v1", true, 0.3),
        ("v2", true, 0.3),
        ("v3", true, 0.3),
        ("v4", false, 2.0),
        ("v5", false, 2.0),
    ]);
    let tally = tally(&votes);
    assert_eq!(evaluate(&tally, 3, 1, THRESHOLD, 5), QuorumDecision::Rejected);
}

#[test]
fn short_count_stays_pending_while_votes_remain() {
    // Two approvals and one rejection out of five: Byzantine-safe but the
    // count condition fails, and two participants may still vote.
    let votes = votes(&[
        ("v1", true, 1.0),
        ("v2", true, 1.0),
        ("v3", false, 1.0),
    ]);
    let tally = tally(&votes);
    assert_eq!(evaluate(&tally, 3, 1, THRESHOLD, 5), QuorumDecision::Pending);
}

#[test]
fn unanimous_rejection_is_definitive_once_all_voted() {
    let votes = votes(&[
        ("v1", false, 1.0),
        ("v2", false, 1.0),
        ("v3", false, 1.0),
        ("v4", false, 1.0),
        ("v5", false, 1.0),
    ]);
    let tally = tally(&votes);
    assert_eq!(evaluate(&tally, 3, 1, THRESHOLD, 5), QuorumDecision::Rejected);
}

#[test]
fn zero_weights_still_satisfy_the_weight_inequality() {
    // Degenerate tally: approvals present but all weights zero. The weight
    // condition compares 0 ≥ 0.67·0, which holds, so the count and safety
    // conditions carry the decision.
    let votes = votes(&[
        ("v1", true, 0.0),
        ("v2", true, 0.0),
        ("v3", true, 0.0),
    ]);
    let tally = tally(&votes);
    assert_eq!(evaluate(&tally, 3, 1, THRESHOLD, 3), QuorumDecision::Confirmed);
}

#[test]
fn decision_is_stable_under_randomized_vote_orderings() {
    // 7 participants, required 4, byzantine tolerance 2. A 5-to-2 approval
    // supermajority must confirm no matter what order the votes arrive in;
    // the mirrored 2-to-5 case must reject in every ordering.
    let scenarios: [(&[(&str, bool, f64)], QuorumDecision); 2] = [
        (
            &[
                ("v1", true, 1.0),
                ("v2", true, 1.0),
                ("v3", true, 1.0),
                ("v4", true, 1.0),
                ("v5", true, 1.0),
                ("v6", false, 1.0),
                ("v7", false, 1.0),
            ],
            QuorumDecision::Confirmed,
        ),
        (
            &[
                ("v1", true, 1.0),
                ("v2", true, 1.0),
                ("v3", false, 1.0),
                ("v4", false, 1.0),
                ("v5", false, 1.0),
                ("v6", false, 1.0),
                ("v7", false, 1.0),
            ],
            QuorumDecision::Rejected,
        ),
    ];

    let mut rng = ChaCha8Rng::seed_from_u64(42);
    for (entries, expected) in scenarios {
        for _ in 0..25 {
            let mut order: Vec<&(&str, bool, f64)> = entries.iter().collect();
            order.shuffle(&mut rng);

            let mut received: BTreeMap<ValidatorId, RecordedVote> = BTreeMap::new();
            let mut decision = QuorumDecision::Pending;
            for (id, approve, weight) in &order {
                received.insert(ValidatorId::from(*id), vote(*approve, *weight));
                decision = evaluate(&tally(&received), 4, 2, THRESHOLD, 7);
                if decision != QuorumDecision::Pending {
                    break;
                }
            }
            assert_eq!(decision, expected, "ordering {order:?}");
        }
    }
}
