/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The thread that runs user-supplied and logging event handlers.

use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{events::*, logging::Logger};

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// Handlers for each kind of [`Event`].
#[derive(Default)]
pub struct EventHandlers {
    pub insert_vertex_handlers: Vec<HandlerPtr<InsertVertexEvent>>,
    pub commit_vertex_handlers: Vec<HandlerPtr<CommitVertexEvent>>,
    pub prune_vertex_handlers: Vec<HandlerPtr<PruneVertexEvent>>,
    pub update_highest_qc_handlers: Vec<HandlerPtr<UpdateHighestQCEvent>>,
    pub update_locked_view_handlers: Vec<HandlerPtr<UpdateLockedViewEvent>>,
    pub propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub vote_handlers: Vec<HandlerPtr<VoteEvent>>,
    pub new_view_handlers: Vec<HandlerPtr<NewViewEvent>>,
    pub receive_proposal_handlers: Vec<HandlerPtr<ReceiveProposalEvent>>,
    pub receive_vote_handlers: Vec<HandlerPtr<ReceiveVoteEvent>>,
    pub receive_new_view_handlers: Vec<HandlerPtr<ReceiveNewViewEvent>>,
    pub start_view_handlers: Vec<HandlerPtr<StartViewEvent>>,
    pub view_timeout_handlers: Vec<HandlerPtr<ViewTimeoutEvent>>,
    pub collect_qc_handlers: Vec<HandlerPtr<CollectQCEvent>>,
    pub start_sync_handlers: Vec<HandlerPtr<StartSyncEvent>>,
    pub end_sync_handlers: Vec<HandlerPtr<EndSyncEvent>>,
}

impl EventHandlers {
    /// Create a set of handlers that, if `log_events` is true, contains the default
    /// [logger](crate::logging) for every event.
    pub fn new(log_events: bool) -> Self {
        let mut handlers = Self::default();
        if log_events {
            handlers.add_loggers();
        }
        handlers
    }

    /// Check whether any handler is registered, i.e. whether events need to be published at all.
    pub fn is_empty(&self) -> bool {
        self.insert_vertex_handlers.is_empty()
            && self.commit_vertex_handlers.is_empty()
            && self.prune_vertex_handlers.is_empty()
            && self.update_highest_qc_handlers.is_empty()
            && self.update_locked_view_handlers.is_empty()
            && self.propose_handlers.is_empty()
            && self.vote_handlers.is_empty()
            && self.new_view_handlers.is_empty()
            && self.receive_proposal_handlers.is_empty()
            && self.receive_vote_handlers.is_empty()
            && self.receive_new_view_handlers.is_empty()
            && self.start_view_handlers.is_empty()
            && self.view_timeout_handlers.is_empty()
            && self.collect_qc_handlers.is_empty()
            && self.start_sync_handlers.is_empty()
            && self.end_sync_handlers.is_empty()
    }

    fn add_loggers(&mut self) {
        self.insert_vertex_handlers.push(InsertVertexEvent::get_logger());
        self.commit_vertex_handlers.push(CommitVertexEvent::get_logger());
        self.prune_vertex_handlers.push(PruneVertexEvent::get_logger());
        self.update_highest_qc_handlers
            .push(UpdateHighestQCEvent::get_logger());
        self.update_locked_view_handlers
            .push(UpdateLockedViewEvent::get_logger());
        self.propose_handlers.push(ProposeEvent::get_logger());
        self.vote_handlers.push(VoteEvent::get_logger());
        self.new_view_handlers.push(NewViewEvent::get_logger());
        self.receive_proposal_handlers
            .push(ReceiveProposalEvent::get_logger());
        self.receive_vote_handlers.push(ReceiveVoteEvent::get_logger());
        self.receive_new_view_handlers
            .push(ReceiveNewViewEvent::get_logger());
        self.start_view_handlers.push(StartViewEvent::get_logger());
        self.view_timeout_handlers.push(ViewTimeoutEvent::get_logger());
        self.collect_qc_handlers.push(CollectQCEvent::get_logger());
        self.start_sync_handlers.push(StartSyncEvent::get_logger());
        self.end_sync_handlers.push(EndSyncEvent::get_logger());
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        fn fire<T>(handlers: &[HandlerPtr<T>], event: &T) {
            handlers.iter().for_each(|handler| handler(event))
        }

        match event {
            Event::InsertVertex(e) => fire(&self.insert_vertex_handlers, &e),
            Event::CommitVertex(e) => fire(&self.commit_vertex_handlers, &e),
            Event::PruneVertex(e) => fire(&self.prune_vertex_handlers, &e),
            Event::UpdateHighestQC(e) => fire(&self.update_highest_qc_handlers, &e),
            Event::UpdateLockedView(e) => fire(&self.update_locked_view_handlers, &e),
            Event::Propose(e) => fire(&self.propose_handlers, &e),
            Event::Vote(e) => fire(&self.vote_handlers, &e),
            Event::NewView(e) => fire(&self.new_view_handlers, &e),
            Event::ReceiveProposal(e) => fire(&self.receive_proposal_handlers, &e),
            Event::ReceiveVote(e) => fire(&self.receive_vote_handlers, &e),
            Event::ReceiveNewView(e) => fire(&self.receive_new_view_handlers, &e),
            Event::StartView(e) => fire(&self.start_view_handlers, &e),
            Event::ViewTimeout(e) => fire(&self.view_timeout_handlers, &e),
            Event::CollectQC(e) => fire(&self.collect_qc_handlers, &e),
            Event::StartSync(e) => fire(&self.start_sync_handlers, &e),
            Event::EndSync(e) => fire(&self.end_sync_handlers, &e),
        }
    }
}

/// Run `event_handlers` on every event received from `event_subscriber` until `shutdown_signal` fires
/// or the publisher goes away.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => (),
        }

        match event_subscriber.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => return,
        }
    })
}
