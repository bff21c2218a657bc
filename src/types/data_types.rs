/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, AddAssign, Sub},
    time::{SystemTime, UNIX_EPOCH},
};

use borsh::{BorshDeserialize, BorshSerialize};

/// View number. Starts at 0 for the genesis vertex and increases by 1 every round.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshDeserialize,
    BorshSerialize,
)]
pub struct ViewNumber(u64);

impl ViewNumber {
    /// Create a new `ViewNumber` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the view of the genesis vertex, which is 0.
    pub const fn genesis() -> Self {
        Self(0)
    }

    /// Get the inner `u64` of this `ViewNumber`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Get the view that directly follows this one.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for ViewNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for ViewNumber {
    type Output = ViewNumber;

    fn add(self, rhs: u64) -> Self::Output {
        ViewNumber(self.0.add(rhs))
    }
}

impl Sub<ViewNumber> for ViewNumber {
    type Output = i64;

    fn sub(self, rhs: ViewNumber) -> Self::Output {
        (self.0 as i64).sub(rhs.0 as i64)
    }
}

/// Number that identifies a validator set epoch.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Epoch(u64);

impl Epoch {
    /// Create a new `Epoch` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `Epoch`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Number of state-changing commands applied to the ledger so far.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct StateVersion(u64);

impl StateVersion {
    /// Create a new `StateVersion` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `StateVersion`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Milliseconds since the unix epoch.
///
/// Used in vote and ledger timestamps, where a wall-clock reading must be part of the signed bytes.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new `Timestamp` wrapping `millis`.
    pub const fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Read the current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Get the inner `u64` value (milliseconds since the unix epoch) of this `Timestamp`.
    pub const fn millis(&self) -> u64 {
        self.0
    }
}

/// 32-byte cryptographic hash.
///
/// Vertex ids are always SHA256 hashes of the borsh-serialized vertex. Ledger accumulators may be
/// produced by any 32-byte hash function the [`App`](crate::app::App) prefers.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The all-zero hash. Used as the parent id of the genesis vertex.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ed25519 digital signature.
///
/// These are produced using the [`ed25519_dalek`] crate, whose main definitions are re-exported from
/// the [`crypto_primitives`](super::crypto_primitives) module.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    /// Create a new `SignatureBytes` wrapping `bytes`.
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 64]` value of this `SignatureBytes`.
    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0[..8].fmt(f)
    }
}

/// Opaque unit of work carried by a vertex. Its meaning is entirely up to the [`App`](crate::app::App).
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Command(Vec<u8>);

impl Command {
    /// Create a new `Command` wrapping `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get a reference to the inner `Vec<u8>` of this `Command`.
    pub const fn bytes(&self) -> &Vec<u8> {
        &self.0
    }
}

/// Weight of a specific validator's votes in consensus decisions.
///
/// The higher the power, the more weight the validator's votes have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Power(u64);

impl Power {
    /// Create a new `Power` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `Power`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Sum of the [`Power`]s of a group of validators.
///
/// The inner type is `u128`, which is bigger than the inner `u64` of `Power`, so that summing up large
/// `Power`s does not overflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct TotalPower(u128);

impl TotalPower {
    /// Create a new `TotalPower` wrapping `int`.
    pub const fn new(int: u128) -> Self {
        Self(int)
    }

    /// Get the inner `u128` value of this `TotalPower`.
    pub const fn int(&self) -> u128 {
        self.0
    }
}

impl AddAssign<Power> for TotalPower {
    fn add_assign(&mut self, rhs: Power) {
        self.0.add_assign(rhs.0 as u128)
    }
}

/// A signature together with the time at which its author produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct TimestampedSignature {
    pub timestamp: Timestamp,
    pub signature: SignatureBytes,
}

/// An ordered list of [`TimestampedSignature`]s from the same
/// [`ValidatorSet`](super::validator_set::ValidatorSet).
///
/// # Ordering
///
/// If a signature was created by `validator`, it must sit at position
/// [`validator_set.position(validator)`](super::validator_set::ValidatorSet::position). Callers of
/// [`set`](Self::set) are responsible for upholding this; a misplaced signature fails verification.
///
/// # Optionality
///
/// A `SignatureSet` created using [`new`](Self::new) initially contains `vec![None; len]`.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureSet(Vec<Option<TimestampedSignature>>);

impl SignatureSet {
    /// Create the empty `SignatureSet` that forms a part of the
    /// [genesis QC](crate::types::certificates::QuorumCertificate::genesis).
    pub const fn genesis() -> Self {
        Self(Vec::new())
    }

    /// Create a new `SignatureSet` initially containing `len` `None`s.
    pub(crate) fn new(len: usize) -> Self {
        Self(vec![None; len])
    }

    /// Get an iterator over the entries in this `SignatureSet`.
    pub fn iter(&self) -> std::slice::Iter<'_, Option<TimestampedSignature>> {
        self.0.iter()
    }

    /// Get a reference to the entry at position `pos`, or `None` if `pos` is out of range.
    pub fn get(&self, pos: usize) -> Option<&TimestampedSignature> {
        self.0.get(pos).and_then(Option::as_ref)
    }

    /// Set the value at `pos` in this `SignatureSet` to be `signature`.
    ///
    /// # Panics
    ///
    /// Panics if `pos` is `>=` [`len`](Self::len).
    pub(crate) fn set(&mut self, pos: usize, signature: Option<TimestampedSignature>) {
        self.0[pos] = signature
    }

    /// Get the number of slots in this `SignatureSet`. This equals the size of the validator set the
    /// signatures come from, not the number of signatures collected.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether this `SignatureSet` has no slots at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Count the slots that actually hold a signature.
    pub fn count(&self) -> usize {
        self.0.iter().filter(|signature| signature.is_some()).count()
    }
}
