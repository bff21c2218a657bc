/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Aggregation of [`Vote`]s into [`QuorumCertificate`]s.
//!
//! Votes are accumulated per [`VoteData`], which includes the `(view, proposed header)` pair being
//! voted on. Keying on the full `VoteData` means that signatures over different content can never be
//! mixed into one certificate.

use std::collections::HashMap;

use crate::messages::Vote;
use crate::types::{
    certificates::{QuorumCertificate, VoteData},
    crypto_primitives::VerifyingKey,
    data_types::{SignatureSet, TimestampedSignature, TotalPower, ViewNumber},
    validator_set::ValidatorSet,
};

struct VoteAccumulator {
    signatures: SignatureSet,
    power: TotalPower,
    certified: bool,
}

impl VoteAccumulator {
    fn new(validator_set_len: usize) -> Self {
        Self {
            signatures: SignatureSet::new(validator_set_len),
            power: TotalPower::new(0),
            certified: false,
        }
    }
}

/// Collects votes and emits a [`QuorumCertificate`] the first time the signers of some [`VoteData`]
/// reach a quorum of power.
///
/// ## Bounded memory
///
/// When a new key arrives while `capacity` keys are tracked, the key with the lowest view is dropped,
/// provided it is not above the new key's view; otherwise the new key is refused. Keys at or below
/// the committed view, and keys below the view of a freshly formed QC, are dropped eagerly since
/// their votes can no longer matter.
///
/// A validator opens at most one key per view: a second vote from the same author in the same view
/// for different content is an equivocation and is ignored.
pub struct PendingVotes {
    capacity: usize,
    committed_view: ViewNumber,
    accumulators: HashMap<VoteData, VoteAccumulator>,
    cast: HashMap<(VerifyingKey, ViewNumber), VoteData>,
}

impl PendingVotes {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            committed_view: ViewNumber::genesis(),
            accumulators: HashMap::new(),
            cast: HashMap::new(),
        }
    }

    /// Add `vote` to its key. Returns the QC for the key exactly once: on the vote that makes the
    /// accumulated power reach [`ValidatorSet::quorum`].
    ///
    /// Votes from non-members, repeated votes from the same author, equivocating votes, and votes at or
    /// below the committed view are ignored. `vote`'s signature is not checked here.
    pub fn insert_vote(
        &mut self,
        vote: &Vote,
        validator_set: &ValidatorSet,
    ) -> Option<QuorumCertificate> {
        if vote.view() <= self.committed_view {
            log::debug!("Ignoring stale vote for view {}", vote.view());
            return None;
        }

        let (Some(position), Some(power)) = (
            validator_set.position(&vote.author),
            validator_set.power(&vote.author).copied(),
        ) else {
            log::debug!("Ignoring vote from a non-validator");
            return None;
        };

        let ballot = (vote.author, vote.view());
        if let Some(previous) = self.cast.get(&ballot) {
            if previous != &vote.vote_data {
                log::warn!("Ignoring equivocating vote for view {}", vote.view());
                return None;
            }
        }

        if !self.accumulators.contains_key(&vote.vote_data) && !self.make_room(vote.view()) {
            log::debug!("Ignoring vote for view {}: no room left", vote.view());
            return None;
        }
        self.cast.insert(ballot, vote.vote_data.clone());
        let accumulator = self
            .accumulators
            .entry(vote.vote_data.clone())
            .or_insert_with(|| VoteAccumulator::new(validator_set.len()));

        if accumulator.signatures.get(position).is_some() {
            return None;
        }

        accumulator.signatures.set(
            position,
            Some(TimestampedSignature {
                timestamp: vote.timestamp,
                signature: vote.signature,
            }),
        );
        accumulator.power += power;

        if accumulator.certified || accumulator.power < validator_set.quorum() {
            return None;
        }
        accumulator.certified = true;
        let qc = QuorumCertificate::new(vote.vote_data.clone(), accumulator.signatures.clone());

        let view = vote.view();
        self.accumulators
            .retain(|vote_data, _| vote_data.proposed.view >= view);
        self.prune_cast();

        Some(qc)
    }

    /// Rebuild the QC for `vote_data` from every signature collected so far, if a quorum was reached
    /// and the key has not been evicted.
    pub fn certificate(&self, vote_data: &VoteData) -> Option<QuorumCertificate> {
        self.accumulators
            .get(vote_data)
            .filter(|accumulator| accumulator.certified)
            .map(|accumulator| {
                QuorumCertificate::new(vote_data.clone(), accumulator.signatures.clone())
            })
    }

    /// Discard every key at or below `committed_view`, and reject future votes for them.
    pub fn on_commit(&mut self, committed_view: ViewNumber) {
        if committed_view <= self.committed_view {
            return;
        }
        self.committed_view = committed_view;
        self.accumulators
            .retain(|vote_data, _| vote_data.proposed.view > committed_view);
        self.prune_cast();
    }

    /// Number of vote keys currently tracked.
    pub fn len(&self) -> usize {
        self.accumulators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulators.is_empty()
    }

    /// Evict keys until a new key for `incoming_view` fits. Returns false if that would mean evicting
    /// a key above `incoming_view`.
    fn make_room(&mut self, incoming_view: ViewNumber) -> bool {
        while self.accumulators.len() >= self.capacity {
            let lowest = self
                .accumulators
                .keys()
                .min_by_key(|vote_data| vote_data.proposed.view)
                .cloned();
            match lowest {
                Some(lowest) if lowest.proposed.view <= incoming_view => {
                    self.accumulators.remove(&lowest);
                    self.prune_cast();
                }
                _ => return false,
            }
        }
        true
    }

    fn prune_cast(&mut self) {
        let accumulators = &self.accumulators;
        self.cast
            .retain(|_, vote_data| accumulators.contains_key(vote_data));
    }
}
