/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for sending messages to the P2P network.

use crate::{
    messages::{BFTMessage, NewView, Proposal, Vote},
    types::crypto_primitives::VerifyingKey,
};

use super::network::Network;

/// Typed outbound handle over a [`Network`].
pub(crate) struct SenderHandle<N: Network> {
    network: N,
}

impl<N: Network> SenderHandle<N> {
    pub(crate) fn new(network: N) -> Self {
        Self { network }
    }

    pub(crate) fn send_vote(&mut self, vote: Vote, next_leader: VerifyingKey) {
        self.network.send(next_leader, vote.into())
    }

    pub(crate) fn broadcast_proposal(&mut self, proposal: Proposal) {
        self.network.broadcast(proposal.into())
    }

    pub(crate) fn send_new_view(&mut self, new_view: NewView, leader: VerifyingKey) {
        self.network.send(leader, new_view.into())
    }
}

impl From<Vote> for BFTMessage {
    fn from(value: Vote) -> Self {
        BFTMessage::Vote(value)
    }
}

impl From<Proposal> for BFTMessage {
    fn from(value: Proposal) -> Self {
        BFTMessage::Proposal(value)
    }
}

impl From<NewView> for BFTMessage {
    fn from(value: NewView) -> Self {
        BFTMessage::NewView(value)
    }
}
