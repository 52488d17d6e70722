//! # Statemesh Core
//!
//! Byzantine fault tolerant consensus engine for per-player game state.
//!
//! This crate provides the building blocks for validating state transitions
//! through weighted validator quorums:
//!
//! - **[`state`]**: Immutable per-player state snapshots with strictly
//!   increasing versions, per-player commit serialization, and checkpoint
//!   export/import.
//!
//! - **[`hasher`]**: Canonical content hashing and per-field Merkle roots;
//!   structurally equal states always fingerprint identically.
//!
//! - **[`validator`]**: Validator registry with role-based selection,
//!   stake-and-reputation vote weighting, rewards, and trust-floor slashing.
//!
//! - **[`proposer`]**: Action profiles and consequence rules that project a
//!   candidate next state without touching stored state.
//!
//! - **[`consensus`]**: The coordinator driving each transition through a
//!   voting round: weighted BFT quorum evaluation, deadlines, and
//!   finalization.
//!
//! - **[`anchor`]**: Post-commit anchoring of transition proofs to an
//!   external backend, retried out-of-band.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    ConsensusCoordinator                    │
//! │  ┌────────────────┐  ┌───────────────────┐  ┌───────────┐  │
//! │  │ TransitionPro- │  │ ValidatorRegistry │  │ Anchor    │  │
//! │  │ poser          │  │ (select/weight/   │  │ Client    │  │
//! │  │ (project next) │  │  reward/slash)    │  │ (retry)   │  │
//! │  └───────┬────────┘  └─────────┬─────────┘  └─────┬─────┘  │
//! │          │                     │                  │        │
//! │  ┌───────▼────────┐  ┌─────────▼─────────┐        │        │
//! │  │ GameStateStore │  │  ConsensusRound   │        │        │
//! │  │ (heads+archive)│  │  quorum::evaluate │        │        │
//! │  └────────────────┘  └─────────┬─────────┘        │        │
//! │                                │                  │        │
//! │                      ┌─────────▼─────────┐        │        │
//! │                      │   VoteTransport   │◄───────┘        │
//! │                      │  (per validator)  │                 │
//! │                      └───────────────────┘                 │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transition Flow
//!
//! ```text
//! propose_transition(state, action, params)
//!       │
//!       ▼
//! profile lookup ── unknown ──► InvalidAction
//!       │
//!       ▼
//! project fields ── balance short ──► InsufficientResource
//!       │
//!       ▼
//! select validators ──► dispatch vote requests (concurrent, deadline-bound)
//!       │
//!       ▼
//! verify signature ► weight ► record ► quorum::evaluate
//!       │                                  │
//!       │          Pending ◄───────────────┼──► Confirmed / Rejected
//!       ▼                                  ▼
//! deadline expiry ──► TimedOut       finalize: commit, rewards/slashes,
//!                                    archive, broadcast, anchor (async)
//! ```

pub mod anchor;
pub mod config;
pub mod consensus;
pub mod errors;
pub mod hasher;
pub mod proposer;
pub mod state;
pub mod transport;
pub mod types;
pub mod validator;

pub use anchor::{AnchorClient, InMemoryAnchor, TransitionProof};
pub use config::EngineConfig;
pub use consensus::ConsensusCoordinator;
pub use errors::EngineError;
pub use proposer::TransitionProposer;
pub use state::{Checkpoint, GameStateStore};
pub use transport::VoteTransport;
pub use validator::ValidatorRegistry;
