/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits that the embedding application implements to connect the consensus core to its peers.

use crate::{
    messages::BFTMessage,
    types::{crypto_primitives::VerifyingKey, data_types::CryptoHash, data_types::ViewNumber},
};

pub trait Network: Send {
    /// Send a message to every validator, including this one, without blocking.
    fn broadcast(&mut self, message: BFTMessage);

    /// Send a message to the specified validator without blocking. `peer` may be this validator, in
    /// which case the message must be delivered back to it like any other.
    fn send(&mut self, peer: VerifyingKey, message: BFTMessage);
}

/// The ancestor sync subsystem.
///
/// [`fetch`](Self::fetch) must not block. Once the ancestors are available, the implementation feeds
/// them back as a [`ConsensusEvent::VertexSyncCompleted`](crate::messages::ConsensusEvent::VertexSyncCompleted).
pub trait VertexFetcher: Send {
    fn fetch(&mut self, request: VertexSyncRequest);
}

/// Request for a missing vertex and its missing ancestors.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexSyncRequest {
    /// The vertex that could not be resolved.
    pub vertex_id: CryptoHash,
    /// The view of the vertex that could not be resolved.
    pub view: ViewNumber,
    /// The current committed root. Ancestors at or below it are not needed.
    pub root_view: ViewNumber,
    /// Validators known to have the vertex: the author of the message that referenced it, and the
    /// signers of the QC that certified it.
    pub peers: Vec<VerifyingKey>,
}
