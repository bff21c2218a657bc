/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The state machine that turns inbound events into safety decisions, view changes and outbound
//! messages.
//!
//! ## A view in the common case
//!
//! 1. Every validator entering view `v` sends a [`NewView`](crate::messages::NewView) carrying its
//!    highest QC to the proposer of `v`.
//! 2. Once the proposer of `v` has collected NewViews from a quorum, it asks the
//!    [`App`](crate::app::App) for a command, builds a vertex extending its highest QC, and broadcasts
//!    it as a [`Proposal`](crate::messages::Proposal). The proposer of view 1 proposes right away on
//!    start.
//! 3. Validators receiving the proposal first process the QC it carries (which may lock, commit, and
//!    advance the view), then insert the vertex, and vote for it through
//!    [`SafetyRules`](crate::safety_rules::SafetyRules). The vote goes to the proposer of `v + 1`.
//! 4. Validators that are neither the proposer of `v` nor of `v + 1` have nothing left to do in `v`.
//!    They enter `v + 1` straight away, which sends their NewView to its proposer.
//! 5. The proposer of `v + 1` aggregates the votes into a QC, processes it, and thereby enters `v + 1`
//!    itself, sending a NewView to itself. Step 2 follows.
//!
//! ## When things go wrong
//!
//! - If a view's timer fires, the validator enters the next view and sends its NewView to the proposer
//!   of that view.
//! - If a proposal or QC references a vertex that is not stored, processing of that input is deferred,
//!   and a fetch is requested from the [`VertexFetcher`](crate::networking::VertexFetcher). The input is
//!   replayed when the fetched vertices arrive, unless the view has moved past it by then.
//! - Stale and duplicate inputs are dropped. Malformed inputs are dropped and reported through
//!   [`BFTError::InvalidMessage`].

pub mod implementation;

pub use implementation::{BFTError, BFTEventReducer, BFTEventReducerSpec};
