/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The per-validator state that must survive restarts, and the store it is written through to.

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::data_types::ViewNumber;

/// The only consensus state whose regression across a restart could make an honest validator
/// equivocate.
///
/// Both fields are monotonically non-decreasing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SafetyState {
    /// The view of the last vertex this validator voted for.
    pub last_voted_view: ViewNumber,
    /// The highest view this validator is bound not to contradict.
    pub locked_view: ViewNumber,
}

impl SafetyState {
    pub fn new(last_voted_view: ViewNumber, locked_view: ViewNumber) -> Self {
        Self {
            last_voted_view,
            locked_view,
        }
    }

    /// Check whether moving from `self` to `next` never decreases either field.
    pub(crate) fn is_regressed_by(&self, next: &SafetyState) -> bool {
        next.last_voted_view < self.last_voted_view || next.locked_view < self.locked_view
    }
}

/// Durable storage for [`SafetyState`], implemented by the embedding application.
///
/// ## Write-through
///
/// [`store`](Self::store) must not return `Ok` until `state` is durable. [`SafetyRules`](super::SafetyRules)
/// only adopts a new state, and only releases the vote that depends on it, after `store` returns `Ok`.
pub trait SafetyStateStore: Send {
    /// Get the last state passed to a successful [`store`](Self::store), or `None` on first boot.
    fn load(&self) -> Option<SafetyState>;

    /// Durably write `state`.
    fn store(&mut self, state: &SafetyState) -> Result<(), SafetyStoreError>;
}

/// Failure reported by a [`SafetyStateStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafetyStoreError(pub String);

impl Display for SafetyStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "failed to persist safety state: {}", self.0)
    }
}
