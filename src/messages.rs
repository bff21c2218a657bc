/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages exchanged between validators, and the inbound events that drive the
//! [event reducer](crate::event_reducer::BFTEventReducer).
//!
//! Wire encoding is left to the embedding application's [`Network`](crate::networking::Network)
//! implementation. Every message carries its author and a signature that [`is_correct`](Vote::is_correct)
//! checks.

use crate::types::{
    certificates::{vote_signing_bytes, QuorumCertificate, VoteData},
    crypto_primitives::{signing_bytes, verify, Keypair, VerifyingKey},
    data_types::{CryptoHash, SignatureBytes, Timestamp, ViewNumber},
    vertex::UnverifiedVertex,
};

/// Messages sent through a [`Network`](crate::networking::Network).
#[derive(Clone, Debug, PartialEq)]
pub enum BFTMessage {
    Proposal(Proposal),
    Vote(Vote),
    NewView(NewView),
}

impl From<BFTMessage> for ConsensusEvent {
    fn from(message: BFTMessage) -> Self {
        match message {
            BFTMessage::Proposal(proposal) => ConsensusEvent::Proposal(proposal),
            BFTMessage::Vote(vote) => ConsensusEvent::Vote(vote),
            BFTMessage::NewView(new_view) => ConsensusEvent::NewView(new_view),
        }
    }
}

/// A validator's signed vote for `vote_data`.
///
/// Honest validators only ever obtain a `Vote` for themselves from
/// [`SafetyRules::vote_for`](crate::safety_rules::SafetyRules::vote_for).
#[derive(Clone, Debug, PartialEq)]
pub struct Vote {
    pub author: VerifyingKey,
    pub vote_data: VoteData,
    pub timestamp: Timestamp,
    pub signature: SignatureBytes,
}

impl Vote {
    /// Sign `vote_data` at `timestamp` with `keypair`.
    pub fn new(keypair: &Keypair, vote_data: VoteData, timestamp: Timestamp) -> Self {
        let signature = keypair.sign(&vote_signing_bytes(&vote_data, &timestamp));
        Self {
            author: keypair.public(),
            vote_data,
            timestamp,
            signature,
        }
    }

    /// The view of the vertex this vote is for.
    pub fn view(&self) -> ViewNumber {
        self.vote_data.proposed.view
    }

    /// Check that `signature` was produced by `author` over this vote's content.
    pub fn is_correct(&self) -> bool {
        verify(
            &self.author,
            &vote_signing_bytes(&self.vote_data, &self.timestamp),
            &self.signature,
        )
    }
}

/// A leader's signed proposal of `vertex`.
#[derive(Clone, Debug, PartialEq)]
pub struct Proposal {
    pub author: VerifyingKey,
    pub vertex: UnverifiedVertex,
    pub signature: SignatureBytes,
}

impl Proposal {
    /// Sign the id of `vertex` with `keypair`.
    pub fn new(keypair: &Keypair, vertex: UnverifiedVertex) -> Self {
        let signature = keypair.sign(&vertex.id().bytes());
        Self {
            author: keypair.public(),
            vertex,
            signature,
        }
    }

    pub fn view(&self) -> ViewNumber {
        self.vertex.view
    }

    pub fn is_correct(&self) -> bool {
        verify(&self.author, &self.vertex.id().bytes(), &self.signature)
    }
}

/// A validator's signal that it has entered `view`, sent to the proposer of `view`.
///
/// Carries the sender's highest QC so that the proposer can extend the best known branch.
#[derive(Clone, Debug, PartialEq)]
pub struct NewView {
    pub author: VerifyingKey,
    pub view: ViewNumber,
    pub highest_qc: QuorumCertificate,
    pub signature: SignatureBytes,
}

impl NewView {
    pub fn new(keypair: &Keypair, view: ViewNumber, highest_qc: QuorumCertificate) -> Self {
        let signature = keypair.sign(&new_view_signing_bytes(view, &highest_qc));
        Self {
            author: keypair.public(),
            view,
            highest_qc,
            signature,
        }
    }

    pub fn is_correct(&self) -> bool {
        verify(
            &self.author,
            &new_view_signing_bytes(self.view, &self.highest_qc),
            &self.signature,
        )
    }
}

fn new_view_signing_bytes(view: ViewNumber, highest_qc: &QuorumCertificate) -> Vec<u8> {
    signing_bytes(&(view, highest_qc.proposed().vertex_id))
}

/// Ancestors fetched by a [`VertexFetcher`](crate::networking::VertexFetcher) in answer to a
/// [`VertexSyncRequest`](crate::networking::VertexSyncRequest).
#[derive(Clone, Debug, PartialEq)]
pub struct VertexSyncResponse {
    /// The id that was reported missing.
    pub vertex_id: CryptoHash,
    /// The fetched vertices, ordered oldest first and ending with `vertex_id`.
    pub vertices: Vec<UnverifiedVertex>,
}

/// Every input that can drive the consensus core.
///
/// Network messages, timer firings, and sync completions may originate from different threads but must
/// be funnelled into one ordered queue before reaching
/// [`BFTEventReducer::process_event`](crate::event_reducer::BFTEventReducer::process_event).
#[derive(Clone, Debug, PartialEq)]
pub enum ConsensusEvent {
    Proposal(Proposal),
    Vote(Vote),
    NewView(NewView),
    LocalTimeout(ViewNumber),
    VertexSyncCompleted(VertexSyncResponse),
}
