//! Byzantine fault tolerant consensus over proposed state transitions.
//!
//! - [`quorum`]: stateless tallying and the quorum rule.
//! - [`round`]: per-round vote collection context.
//! - [`engine`]: the coordinator driving rounds end to end.

pub mod engine;
pub mod quorum;
pub mod round;

#[cfg(test)]
mod tests;

pub use engine::ConsensusCoordinator;
pub use quorum::{QuorumDecision, VoteTally};
pub use round::{ConsensusRound, RecordedVote, RoundPhase};
