/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The safety and liveness core of a HotStuff-style Byzantine fault tolerant consensus protocol.
//!
//! A set of `n` validators, of which at most `f < n/3` by power are Byzantine, agree on a growing chain
//! of vertices. Each vertex carries an opaque [command](types::data_types::Command) and a
//! [quorum certificate](types::certificates::QuorumCertificate) for its parent.
//!
//! # Components
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`safety_rules`] | Decides whether to vote, maintains the lock, derives commits. |
//! | [`pending_votes`] | Aggregates votes into quorum certificates. |
//! | [`vertex_store`] | Holds the tree of uncommitted vertices rooted at the last committed vertex. |
//! | [`pacemaker`] | Advances views on QCs, NewView quorums, and timeouts. |
//! | [`proposer_election`] | Deterministically maps views to proposers. |
//! | [`event_reducer`] | Serializes every input and drives the components above. |
//! | [`replica`] | Runs an event reducer on its own threads. |
//!
//! The embedding application supplies the [`App`](app::App), the [`Network`](networking::Network),
//! the [`VertexFetcher`](networking::VertexFetcher), and the
//! [`SafetyStateStore`](safety_rules::SafetyStateStore).

pub mod app;

pub mod counters;

pub mod event_bus;

pub mod event_reducer;

pub mod events;

pub(crate) mod logging;

pub mod messages;

pub mod networking;

pub mod pacemaker;

pub mod pending_votes;

pub mod proposer_election;

pub mod replica;

pub mod safety_rules;

pub mod types;

pub mod vertex_store;
