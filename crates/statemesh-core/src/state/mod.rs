//! Per-player game-state storage and checkpointing.
//!
//! - [`store`]: head-state tracking with strictly serialized per-player
//!   commits.
//! - [`checkpoint`]: full snapshot export/import for cold-start recovery.

pub mod checkpoint;
pub mod store;

pub use checkpoint::{Checkpoint, MerkleIndex};
pub use store::GameStateStore;
