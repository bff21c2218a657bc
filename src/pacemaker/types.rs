/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Collection of [`NewView`] messages into view-change quorums.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    messages::NewView,
    types::{
        crypto_primitives::VerifyingKey,
        data_types::{TotalPower, ViewNumber},
        validator_set::ValidatorSet,
    },
};

#[derive(Default)]
struct NewViewTally {
    authors: HashSet<VerifyingKey>,
    reached_quorum: bool,
}

/// Helps leaders find out when a quorum of validators has entered a view, by accumulating the power of
/// the distinct authors of `NewView`s for each view.
///
/// Each author is counted for one view only, the highest it has sent a `NewView` for, so at most one
/// view per validator is ever tracked.
#[derive(Default)]
pub struct PendingNewViews {
    views: BTreeMap<ViewNumber, NewViewTally>,
    latest: HashMap<VerifyingKey, ViewNumber>,
}

impl PendingNewViews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `new_view` to the power collected for its view. Returns `true` exactly once per view: when
    /// the collected power first reaches [`ValidatorSet::quorum`].
    ///
    /// If the author is not part of `validator_set`, or has already sent a `NewView` for this view or
    /// a later one, then this is a no-op. Otherwise the author stops counting towards the view of its
    /// previous `NewView`.
    ///
    /// # Preconditions
    ///
    /// `new_view.is_correct()`.
    pub fn insert_new_view(&mut self, new_view: &NewView, validator_set: &ValidatorSet) -> bool {
        if validator_set.power(&new_view.author).is_none() {
            return false;
        }

        if let Some(previous) = self.latest.get(&new_view.author).copied() {
            if previous >= new_view.view {
                return false;
            }
            if let Some(tally) = self.views.get_mut(&previous) {
                tally.authors.remove(&new_view.author);
                if tally.authors.is_empty() {
                    self.views.remove(&previous);
                }
            }
        }
        self.latest.insert(new_view.author, new_view.view);

        let tally = self.views.entry(new_view.view).or_default();
        tally.authors.insert(new_view.author);
        if tally.reached_quorum {
            return false;
        }

        let mut collected = TotalPower::new(0);
        for author in &tally.authors {
            if let Some(power) = validator_set.power(author) {
                collected += *power;
            }
        }
        tally.reached_quorum = collected >= validator_set.quorum();
        tally.reached_quorum
    }

    /// Forget every view below `view`.
    pub fn prune_below(&mut self, view: ViewNumber) {
        self.views = self.views.split_off(&view);
    }

    /// Number of views with at least one `NewView` counted.
    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}
