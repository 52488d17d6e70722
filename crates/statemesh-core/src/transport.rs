//! Vote request/response transport seam.
//!
//! The coordinator is transport-agnostic: a deployment plugs in an RPC or
//! message-queue implementation here. Implementations are expected to have
//! the validator sign the response payload with its ed25519 key (see
//! [`VoteResponse::signing_payload`]); the coordinator verifies signatures
//! on arrival and drops votes that fail.

use crate::errors::EngineError;
use crate::types::{ValidatorNode, VoteRequest, VoteResponse};
use async_trait::async_trait;

/// Dispatches one vote request to one validator and awaits its signed vote.
///
/// Individual request failures are per-validator: the coordinator logs them
/// and keeps collecting from the rest of the round's participants. The
/// overall round deadline bounds how long any implementation is awaited.
#[async_trait]
pub trait VoteTransport: Send + Sync {
    /// Sends `request` to `validator` and returns its vote.
    ///
    /// # Errors
    ///
    /// Implementations should map delivery failures to
    /// [`EngineError::InvalidVote`] or a transport-appropriate variant; the
    /// coordinator treats any error as a missing vote.
    async fn request_vote(
        &self,
        validator: &ValidatorNode,
        request: VoteRequest,
    ) -> Result<VoteResponse, EngineError>;
}

#[async_trait]
impl<T: VoteTransport + ?Sized> VoteTransport for std::sync::Arc<T> {
    async fn request_vote(
        &self,
        validator: &ValidatorNode,
        request: VoteRequest,
    ) -> Result<VoteResponse, EngineError> {
        (**self).request_vote(validator, request).await
    }
}
