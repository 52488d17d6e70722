//! Byzantine fault tolerant quorum evaluation.
//!
//! All functions here are stateless and operate on recorded vote data; the
//! coordinator calls them after every accepted vote. The final decision is
//! commutative with respect to vote arrival order: evaluation only looks at
//! the accumulated tally, never at the sequence of arrivals.

use crate::consensus::round::RecordedVote;
use crate::types::ValidatorId;
use std::collections::BTreeMap;

/// Accumulated vote totals for one round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteTally {
    /// Total votes received.
    pub total_votes: usize,
    /// Approve votes among them.
    pub approvals: usize,
    /// Sum of all received vote weights.
    pub total_weight: f64,
    /// Sum of weights over approve votes.
    pub approval_weight: f64,
}

/// Outcome of evaluating a round's tally against its thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumDecision {
    /// Not enough information yet; keep collecting until the deadline.
    Pending,
    /// All three confirmation conditions hold.
    Confirmed,
    /// Every participant has voted, the round is Byzantine-safe, and the
    /// confirmation conditions still fail: a definitive negative.
    Rejected,
}

/// Sums votes and weights. O(n) over the vote map.
#[must_use]
pub fn tally(votes: &BTreeMap<ValidatorId, RecordedVote>) -> VoteTally {
    let mut tally = VoteTally {
        total_votes: votes.len(),
        approvals: 0,
        total_weight: 0.0,
        approval_weight: 0.0,
    };
    for vote in votes.values() {
        tally.total_weight += vote.weight;
        if vote.approve {
            tally.approvals += 1;
            tally.approval_weight += vote.weight;
        }
    }
    tally
}

/// Evaluates the BFT quorum rule.
///
/// Consensus is reached only if all three hold:
///
/// 1. approve-count ≥ `required_validators`;
/// 2. approval weight ≥ `threshold` × total weight;
/// 3. received votes ≥ `2·byzantine_tolerance + 1` (Byzantine-safe).
///
/// When condition 3 holds, every participant has voted, and conditions 1–2
/// still fail, the round can never confirm and is rejected immediately
/// instead of burning the rest of its deadline.
#[must_use]
pub fn evaluate(
    tally: &VoteTally,
    required_validators: usize,
    byzantine_tolerance: usize,
    threshold: f64,
    participants: usize,
) -> QuorumDecision {
    let byzantine_safe = tally.total_votes >= 2 * byzantine_tolerance + 1;
    if !byzantine_safe {
        return QuorumDecision::Pending;
    }

    let count_met = tally.approvals >= required_validators;
    let weight_met = tally.approval_weight >= threshold * tally.total_weight;
    if count_met && weight_met {
        return QuorumDecision::Confirmed;
    }

    if tally.total_votes >= participants {
        QuorumDecision::Rejected
    } else {
        QuorumDecision::Pending
    }
}
