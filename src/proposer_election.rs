/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Deterministic mapping from views to the validator that proposes in them.
//!
//! The [event reducer](crate::event_reducer::BFTEventReducer) consumes leader selection only through
//! the [`ProposerElection`] trait, so strategies can be swapped without touching consensus logic. Every
//! validator must be configured with the same strategy over the same validator set, or they will
//! disagree about who leads a view.
//!
//! Two strategies are provided:
//! 1. [`WeightedRoundRobin`]: each validator leads a share of views proportional to its power.
//! 2. [`RotatingProposers`]: validators take turns in a fixed order regardless of power.

use crate::types::{
    crypto_primitives::VerifyingKey, data_types::ViewNumber, validator_set::ValidatorSet,
};

/// Pure function from a view to the identity of its proposer.
pub trait ProposerElection: Send {
    fn proposer(&self, view: ViewNumber) -> VerifyingKey;
}

/// Interleaved weighted round robin over a [`ValidatorSet`].
///
/// ## Leader selection
///
/// Conceptually, the validators are laid out in an abstract array of length equal to the total power.
/// The array is filled in rounds: in round `t` (starting from 1), every validator with power `>= t`
/// appears once, in ascending order of verifying key. The proposer of `view` is the validator at
/// `view % total_power` in this array. Over any `total_power` consecutive views, each validator leads
/// exactly as many views as its power, and validators with high power do not lead in long streaks.
///
/// ## Power limits
///
/// The total power must fit in a `u64`, since views are `u64`s. Selecting a proposer walks the
/// abstract array, which takes O(max power × number of validators) steps, so powers should be kept
/// small, for example by expressing stake in coarse units.
#[derive(Clone)]
pub struct WeightedRoundRobin {
    validator_set: ValidatorSet,
    total_power: u64,
}

impl WeightedRoundRobin {
    /// # Panics
    ///
    /// Panics if `validator_set` has zero total power, or a total power that does not fit in a `u64`.
    pub fn new(validator_set: ValidatorSet) -> Self {
        let total_power = match u64::try_from(validator_set.total_power().int()) {
            Ok(total_power) if total_power > 0 => total_power,
            Ok(_) => panic!("cannot elect proposers from a validator set with zero total power"),
            Err(_) => panic!("cannot elect proposers: total power does not fit in a u64"),
        };
        Self {
            validator_set,
            total_power,
        }
    }
}

impl ProposerElection for WeightedRoundRobin {
    fn proposer(&self, view: ViewNumber) -> VerifyingKey {
        let validators_and_powers = self.validator_set.validators_and_powers();
        // Index in the abstract array.
        let index = view.int() % self.total_power;
        // Max. power among the validators.
        let p_max = validators_and_powers
            .iter()
            .map(|(_, power)| power.int())
            .max()
            .unwrap_or(0);

        let mut counter = 0;

        // Search for a validator at given index in the abstract array of leaders.
        for threshold in 1..=p_max {
            for (validator, power) in &validators_and_powers {
                if power.int() >= threshold {
                    if counter == index {
                        return *validator;
                    }
                    counter += 1
                }
            }
        }

        // The abstract array has exactly `p_total` entries, so `index` is always found.
        unreachable!("cannot select a leader: index not found")
    }
}

/// Plain round robin: the proposer of `view` is `proposers[view % proposers.len()]`.
#[derive(Clone)]
pub struct RotatingProposers {
    proposers: Vec<VerifyingKey>,
}

impl RotatingProposers {
    /// # Panics
    ///
    /// Panics if `proposers` is empty.
    pub fn new(proposers: Vec<VerifyingKey>) -> Self {
        assert!(!proposers.is_empty(), "cannot rotate over zero proposers");
        Self { proposers }
    }

    /// Rotate over the members of `validator_set` in ascending order of verifying key.
    pub fn from_validator_set(validator_set: &ValidatorSet) -> Self {
        Self::new(validator_set.validators().copied().collect())
    }
}

impl ProposerElection for RotatingProposers {
    fn proposer(&self, view: ViewNumber) -> VerifyingKey {
        let index = (view.int() % self.proposers.len() as u64) as usize;
        self.proposers[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::data_types::Power;
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    /// Tests if the number of times each validator is selected as a leader is proportional to its power.
    #[test]
    fn select_leader_fairness_test() {
        let mut csprg = OsRng {};
        let n = 20;
        let public_keys: Vec<VerifyingKey> = (0..n)
            .map(|_| SigningKey::generate(&mut csprg).verifying_key())
            .collect();

        let validator_set = ValidatorSet::from_powers(
            public_keys
                .iter()
                .zip(0..n)
                .map(|(validator, power)| (*validator, Power::new(power))),
        );
        let election = WeightedRoundRobin::new(validator_set.clone());

        let total_power = validator_set.total_power().int() as u64;
        let leader_sequence: Vec<VerifyingKey> = (0..total_power)
            .map(|v| election.proposer(ViewNumber::new(v)))
            .collect();

        validator_set.validators().for_each(|validator| {
            assert_eq!(
                leader_sequence
                    .iter()
                    .filter(|leader| leader == &validator)
                    .count(),
                validator_set.power(validator).unwrap().int() as usize
            )
        })
    }

    #[test]
    #[should_panic(expected = "does not fit in a u64")]
    fn total_power_beyond_u64_is_refused_test() {
        let mut csprg = OsRng {};
        let validator_set = ValidatorSet::from_powers((0..2).map(|_| {
            (
                SigningKey::generate(&mut csprg).verifying_key(),
                Power::new(u64::MAX),
            )
        }));
        WeightedRoundRobin::new(validator_set);
    }

    #[test]
    fn rotating_proposers_wrap_around() {
        let mut csprg = OsRng {};
        let keys: Vec<VerifyingKey> = (0..3)
            .map(|_| SigningKey::generate(&mut csprg).verifying_key())
            .collect();
        let election = RotatingProposers::new(keys.clone());

        assert_eq!(election.proposer(ViewNumber::new(0)), keys[0]);
        assert_eq!(election.proposer(ViewNumber::new(4)), keys[1]);
        assert_eq!(election.proposer(ViewNumber::new(5)), keys[2]);
    }
}
