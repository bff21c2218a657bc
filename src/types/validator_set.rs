/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The epoch-scoped set of validators and the power accounting used for quorum decisions.

use std::{collections::HashMap, slice};

use super::data_types::{Power, TotalPower};

pub use ed25519_dalek::VerifyingKey;

/// Stores the identities of validators and their voting powers.
///
/// A `ValidatorSet` is immutable for the lifetime of an epoch as far as the consensus core is
/// concerned. Rotation happens outside this crate; see [`App::end_of_epoch`](crate::app::App::end_of_epoch).
///
/// ## Ordering of validators
///
/// `ValidatorSet` internally maintains the list of validators in ascending order of their
/// `VerifyingKey`s, and avails the methods [`validators`](ValidatorSet::validators) and
/// [`position`](ValidatorSet::position) that users can use to get them in this order. Positions index
/// into the [`SignatureSet`](super::data_types::SignatureSet)s of quorum certificates.
///
/// ## Limits to total power
///
/// Users must make sure that the total power of the validator set does not exceed `u128::MAX/2`.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatorSet {
    // The verifying keys of validators are included here in ascending order.
    validators: Vec<VerifyingKey>,
    powers: HashMap<VerifyingKey, Power>,
}

impl Default for ValidatorSet {
    fn default() -> Self {
        ValidatorSet::new()
    }
}

impl ValidatorSet {
    /// Create an empty validator set.
    pub fn new() -> ValidatorSet {
        Self {
            validators: Vec::new(),
            powers: HashMap::new(),
        }
    }

    /// Create a validator set from a list of validators and their powers.
    pub fn from_powers(validators_and_powers: impl IntoIterator<Item = (VerifyingKey, Power)>) -> Self {
        let mut validator_set = Self::new();
        for (validator, power) in validators_and_powers {
            validator_set.put(&validator, power);
        }
        validator_set
    }

    /// Put a `validator` with the specified `power` into the validator set, placing them in a position that
    /// preserves the [ordering of validators](Self#ordering-of-validators).
    ///
    /// If `validator` already exists in the validator set, this function updates its power instead.
    pub fn put(&mut self, validator: &VerifyingKey, power: Power) {
        let validator_bytes = validator.to_bytes();
        if let Err(insert_pos) = self
            .validators
            .binary_search_by(|v| v.to_bytes().cmp(&validator_bytes))
        {
            self.validators.insert(insert_pos, *validator);
        }

        self.powers.insert(*validator, power);
    }

    /// Get the power of the specified `validator` inside the validator set.
    pub fn power(&self, validator: &VerifyingKey) -> Option<&Power> {
        self.powers.get(validator)
    }

    /// Get the sum of the powers of all of the validators inside the validator set.
    pub fn total_power(&self) -> TotalPower {
        let mut total_power = TotalPower::new(0);
        for power in self.powers.values() {
            total_power += *power
        }
        total_power
    }

    /// Check whether the validator set contains `validator`.
    pub fn contains(&self, validator: &VerifyingKey) -> bool {
        self.powers.contains_key(validator)
    }

    /// Get an iterator through validators' verifying keys which walks through them in ascending order.
    pub fn validators(&self) -> slice::Iter<VerifyingKey> {
        self.validators.iter()
    }

    /// Get a vector containing each validator and its power, in ascending order of the validators' verifying keys.
    pub fn validators_and_powers(&self) -> Vec<(VerifyingKey, Power)> {
        self.validators
            .iter()
            .filter_map(|v| self.power(v).map(|power| (*v, *power)))
            .collect()
    }

    /// Get the validator at position `pos` in the sorted order.
    pub fn validator(&self, pos: usize) -> Option<&VerifyingKey> {
        self.validators.get(pos)
    }

    /// Get the number of validators currently in the validator set.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Check whether the validator set is empty (i.e., `self.len() == 0`).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the index of the given `validator` in the [sorted order](Self#ordering-of-validators) of
    /// `VerifyingKey`s in the validator set, if it is actually in the validator set.
    pub fn position(&self, validator: &VerifyingKey) -> Option<usize> {
        let validator_bytes = validator.to_bytes();
        self.validators
            .binary_search_by(|v| v.to_bytes().cmp(&validator_bytes))
            .ok()
    }

    /// Compute the total power that a certificate must match or exceed (`>=`) in order to count as a quorum
    /// under the validator set: `floor(2 * total / 3) + 1`.
    pub fn quorum(&self) -> TotalPower {
        let doubled = self.total_power().int().saturating_mul(2);
        TotalPower::new(doubled / 3 + 1)
    }
}
