/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of events for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Events are published by
//! the [event reducer](crate::event_reducer::BFTEventReducer) onto a channel, and handled on a separate
//! thread by the [event bus](crate::event_bus), so that slow handlers never stall consensus.

use std::{sync::mpsc::Sender, time::SystemTime};

use crate::{
    messages::{NewView, Proposal, Vote},
    types::{
        certificates::QuorumCertificate,
        crypto_primitives::VerifyingKey,
        data_types::{CryptoHash, ViewNumber},
        headers::BFTHeader,
    },
};

pub enum Event {
    // Events that change the vertex store or the safety state.
    InsertVertex(InsertVertexEvent),
    CommitVertex(CommitVertexEvent),
    PruneVertex(PruneVertexEvent),
    UpdateHighestQC(UpdateHighestQCEvent),
    UpdateLockedView(UpdateLockedViewEvent),
    // Events that involve sending a message.
    Propose(ProposeEvent),
    Vote(VoteEvent),
    NewView(NewViewEvent),
    // Events that involve receiving a message.
    ReceiveProposal(ReceiveProposalEvent),
    ReceiveVote(ReceiveVoteEvent),
    ReceiveNewView(ReceiveNewViewEvent),
    // Pacemaker and aggregation events.
    StartView(StartViewEvent),
    ViewTimeout(ViewTimeoutEvent),
    CollectQC(CollectQCEvent),
    // Ancestor sync events.
    StartSync(StartSyncEvent),
    EndSync(EndSyncEvent),
}

impl Event {
    /// Send this event to `event_publisher`, if there is one.
    pub(crate) fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            // The event bus has shut down if this fails; events are best-effort.
            let _ = event_publisher.send(self);
        }
    }
}

/// A vertex was inserted into the vertex store.
pub struct InsertVertexEvent {
    pub timestamp: SystemTime,
    pub header: BFTHeader,
}

/// A vertex was committed.
pub struct CommitVertexEvent {
    pub timestamp: SystemTime,
    pub header: BFTHeader,
}

/// An uncommitted vertex was removed because it conflicts with a committed one.
pub struct PruneVertexEvent {
    pub timestamp: SystemTime,
    pub vertex_id: CryptoHash,
}

pub struct UpdateHighestQCEvent {
    pub timestamp: SystemTime,
    pub highest_qc: QuorumCertificate,
}

pub struct UpdateLockedViewEvent {
    pub timestamp: SystemTime,
    pub locked_view: ViewNumber,
}

pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub proposal: Proposal,
}

pub struct VoteEvent {
    pub timestamp: SystemTime,
    pub vote: Vote,
}

pub struct NewViewEvent {
    pub timestamp: SystemTime,
    pub new_view: NewView,
}

pub struct ReceiveProposalEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub proposal: Proposal,
}

pub struct ReceiveVoteEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub vote: Vote,
}

pub struct ReceiveNewViewEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub new_view: NewView,
}

/// This validator entered `view`, whose proposer is `leader`.
pub struct StartViewEvent {
    pub timestamp: SystemTime,
    pub view: ViewNumber,
    pub leader: VerifyingKey,
}

/// The local timer for `view` fired while `view` was still current.
pub struct ViewTimeoutEvent {
    pub timestamp: SystemTime,
    pub view: ViewNumber,
}

/// Votes collected by this validator formed `quorum_certificate`.
pub struct CollectQCEvent {
    pub timestamp: SystemTime,
    pub quorum_certificate: QuorumCertificate,
}

/// Processing of some input was deferred until `vertex_id` is fetched.
pub struct StartSyncEvent {
    pub timestamp: SystemTime,
    pub vertex_id: CryptoHash,
    pub peers: Vec<VerifyingKey>,
}

/// Fetched ancestors of `vertex_id` arrived, and `vertices_inserted` of them were new.
pub struct EndSyncEvent {
    pub timestamp: SystemTime,
    pub vertex_id: CryptoHash,
    pub vertices_inserted: usize,
}
