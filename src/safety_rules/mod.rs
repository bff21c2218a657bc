/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The sole authority for producing votes and recognizing commits.
//!
//! # Safety state
//!
//! A validator's [`SafetyState`] holds two views:
//! 1. `last_voted_view`: the view of the last vertex the validator voted for.
//! 2. `locked_view`: the highest view whose branch the validator must not contradict.
//!
//! Both only ever grow. Every change is written through a [`SafetyStateStore`] before it takes effect
//! in memory, and a vote is only signed after the state recording it is durable. A validator that
//! crashes and restarts therefore reloads a state at least as recent as any vote it has sent.
//!
//! # Voting
//!
//! [`vote_for`](SafetyRules::vote_for) refuses a vertex if:
//! 1. its view is not greater than `last_voted_view` (at most one vote per view, views strictly
//!    increasing), or
//! 2. the view of its parent (the vertex its QC certifies) is below `locked_view`.
//!
//! # Locking
//!
//! For a QC certifying `V` with parent `P`, the 2-chain `P <- V` is complete, so the validator locks on
//! `P`: `locked_view = max(locked_view, P.view)`.
//!
//! # Committing
//!
//! Consider a vertex `V` whose QC certifies `P`, whose own QC certified `GP`. If
//! `V.view == P.view + 1` and `P.view == GP.view + 1`, the three views are contiguous and any QC over
//! `V` finalizes `GP`. A vote for `V` records `GP` in [`VoteData::committed`], and
//! [`process_qc`](SafetyRules::process_qc) reports it once the QC for `V` exists. If either gap is not
//! exactly 1, nothing is committed.

pub mod state;

use std::fmt::{self, Display, Formatter};

use crate::messages::Vote;
use crate::types::{
    certificates::{QuorumCertificate, VoteData},
    crypto_primitives::{Keypair, VerifyingKey},
    data_types::{Timestamp, ViewNumber},
    headers::BFTHeader,
    vertex::VerifiedVertex,
};

pub use state::{SafetyState, SafetyStateStore, SafetyStoreError};

pub struct SafetyRules<S: SafetyStateStore> {
    keypair: Keypair,
    state: SafetyState,
    store: S,
}

impl<S: SafetyStateStore> SafetyRules<S> {
    /// Create a `SafetyRules` whose state is whatever `store` last persisted, or the genesis state if
    /// it has never persisted anything.
    pub fn new(keypair: Keypair, store: S) -> Self {
        let state = store.load().unwrap_or_default();
        Self {
            keypair,
            state,
            store,
        }
    }

    pub fn state(&self) -> &SafetyState {
        &self.state
    }

    pub fn me(&self) -> VerifyingKey {
        self.keypair.public()
    }

    /// Update the lock from `qc` and return the header `qc` finalizes, if any.
    pub fn process_qc(
        &mut self,
        qc: &QuorumCertificate,
    ) -> Result<Option<BFTHeader>, SafetyStoreError> {
        let next = SafetyState {
            locked_view: self.state.locked_view.max(qc.parent().view),
            ..self.state
        };
        self.update_state(next)?;

        Ok(committed_by_qc(qc).cloned())
    }

    /// Decide whether to vote for `vertex`, whose header (with the ledger state it produces) is
    /// `header`, and if so, sign the vote.
    pub fn vote_for(
        &mut self,
        vertex: &VerifiedVertex,
        header: &BFTHeader,
        timestamp: Timestamp,
    ) -> Result<Vote, SafetyRulesError> {
        debug_assert_eq!(header.vertex_id, vertex.id());

        // 1. Check that this is the first vote in a strictly higher view.
        if vertex.view() <= self.state.last_voted_view {
            return Err(SafetyViolation::VoteForNonIncreasingView {
                view: vertex.view(),
                last_voted_view: self.state.last_voted_view,
            }
            .into());
        }

        // 2. Check that the vertex does not contradict the locked branch.
        if vertex.parent_view() < self.state.locked_view {
            return Err(SafetyViolation::ConflictsWithLock {
                parent_view: vertex.parent_view(),
                locked_view: self.state.locked_view,
            }
            .into());
        }

        // 3. Record the vote together with the lock implied by the vertex's QC, durably.
        let next = SafetyState {
            last_voted_view: vertex.view(),
            locked_view: self.state.locked_view.max(vertex.qc().parent().view),
        };
        assert!(
            next.last_voted_view > self.state.last_voted_view,
            "attempted to sign a vote without advancing last_voted_view"
        );
        self.update_state(next)?;

        // 4. Sign.
        let vote_data = VoteData::new(
            header.clone(),
            vertex.parent_header().clone(),
            committed_by_vertex(vertex).cloned(),
        );
        Ok(Vote::new(&self.keypair, vote_data, timestamp))
    }

    /// Persist `next`, then adopt it. The in-memory state is left untouched if persisting fails.
    fn update_state(&mut self, next: SafetyState) -> Result<(), SafetyStoreError> {
        assert!(
            !self.state.is_regressed_by(&next),
            "safety state must never regress: {:?} -> {:?}",
            self.state,
            next
        );

        if next == self.state {
            return Ok(());
        }

        self.store.store(&next)?;
        self.state = next;
        Ok(())
    }
}

/// The header a vote for `vertex` would finalize: its grandparent, if the views of the vertex, its
/// parent and its grandparent are contiguous.
pub fn committed_by_vertex(vertex: &VerifiedVertex) -> Option<&BFTHeader> {
    let parent = vertex.qc().proposed();
    let grandparent = vertex.qc().parent();
    if is_contiguous(vertex.view(), parent.view) && is_contiguous(parent.view, grandparent.view) {
        Some(grandparent)
    } else {
        None
    }
}

/// The header `qc` finalizes, if the commit it carries is backed by contiguous views.
fn committed_by_qc(qc: &QuorumCertificate) -> Option<&BFTHeader> {
    let committed = qc.committed()?;
    if is_contiguous(qc.proposed().view, qc.parent().view)
        && is_contiguous(qc.parent().view, committed.view)
    {
        Some(committed)
    } else {
        None
    }
}

fn is_contiguous(child: ViewNumber, parent: ViewNumber) -> bool {
    child - parent == 1
}

/// A reason to refuse a vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SafetyViolation {
    VoteForNonIncreasingView {
        view: ViewNumber,
        last_voted_view: ViewNumber,
    },
    ConflictsWithLock {
        parent_view: ViewNumber,
        locked_view: ViewNumber,
    },
}

impl Display for SafetyViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SafetyViolation::VoteForNonIncreasingView {
                view,
                last_voted_view,
            } => write!(
                f,
                "vertex view {} is not above last voted view {}",
                view, last_voted_view
            ),
            SafetyViolation::ConflictsWithLock {
                parent_view,
                locked_view,
            } => write!(
                f,
                "parent view {} is below locked view {}",
                parent_view, locked_view
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SafetyRulesError {
    Violation(SafetyViolation),
    Store(SafetyStoreError),
}

impl From<SafetyViolation> for SafetyRulesError {
    fn from(value: SafetyViolation) -> Self {
        SafetyRulesError::Violation(value)
    }
}

impl From<SafetyStoreError> for SafetyRulesError {
    fn from(value: SafetyStoreError) -> Self {
        SafetyRulesError::Store(value)
    }
}
