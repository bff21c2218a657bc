/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait definition for pluggable applications: [`App`].
//!
//! The consensus core never interprets commands. It asks the `App` for the next command when this
//! validator proposes, asks it for the ledger state a vertex produces when the vertex is inserted, and
//! tells it when vertices become committed.
//!
//! # Determinism requirements
//!
//! [`prepare`](App::prepare) must be a pure function of its request: every honest validator computes
//! the [`LedgerHeader`] of a vertex independently, and votes over the result. Validators that compute
//! different headers for the same vertex vote for different [`VoteData`](crate::types::certificates::VoteData),
//! and their votes do not aggregate.

use crate::{
    types::{
        data_types::{Command, ViewNumber},
        headers::{BFTHeader, LedgerHeader},
        vertex::VerifiedVertex,
    },
    vertex_store::CommittedChain,
};

pub trait App: Send {
    /// Called when this validator is about to propose in `request.view`.
    ///
    /// Returning `None` proposes an empty vertex, which still advances consensus.
    fn next_command(&mut self, request: NextCommandRequest) -> Option<Command>;

    /// Compute the ledger state after applying `request.vertex`'s command on top of
    /// `request.parent`'s ledger state.
    fn prepare(&mut self, request: PrepareRequest) -> LedgerHeader;

    /// Called with every chain of vertices that becomes committed, oldest first.
    fn commit(&mut self, chain: &CommittedChain);

    /// Called after [`commit`](Self::commit) when a committed header closes its epoch.
    fn end_of_epoch(&mut self, _header: &BFTHeader) {}
}

/// Request for the command to include in a proposal for `view`.
pub struct NextCommandRequest<'a> {
    view: ViewNumber,
    parent: &'a BFTHeader,
    pending: Vec<&'a Command>,
}

impl<'a> NextCommandRequest<'a> {
    pub(crate) fn new(view: ViewNumber, parent: &'a BFTHeader, pending: Vec<&'a Command>) -> Self {
        Self {
            view,
            parent,
            pending,
        }
    }

    /// The view the proposal is for.
    pub fn view(&self) -> ViewNumber {
        self.view
    }

    /// The header of the vertex the proposal will extend.
    pub fn parent(&self) -> &BFTHeader {
        self.parent
    }

    /// Commands already carried by uncommitted ancestors of the proposal. Proposing one of them
    /// again would apply it twice once the branch commits.
    pub fn pending(&self) -> &[&'a Command] {
        &self.pending
    }
}

/// Request for the ledger state produced by `vertex`.
pub struct PrepareRequest<'a> {
    vertex: &'a VerifiedVertex,
    parent: &'a BFTHeader,
}

impl<'a> PrepareRequest<'a> {
    pub(crate) fn new(vertex: &'a VerifiedVertex, parent: &'a BFTHeader) -> Self {
        Self { vertex, parent }
    }

    pub fn vertex(&self) -> &VerifiedVertex {
        self.vertex
    }

    /// The stored header of the vertex's parent, including the ledger state to build on.
    pub fn parent(&self) -> &BFTHeader {
        self.parent
    }
}
