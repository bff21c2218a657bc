/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! What a vote certifies, and the quorum certificates that votes aggregate into.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::{signing_bytes, verify, VerifyingKey},
    data_types::{SignatureSet, Timestamp, TotalPower, ViewNumber},
    headers::BFTHeader,
    validator_set::ValidatorSet,
};

/// The content a vote certifies.
///
/// `committed` is filled in by [`SafetyRules`](crate::safety_rules::SafetyRules) when voting for
/// `proposed` completes a round-contiguous 3-chain; it is `None` otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct VoteData {
    pub proposed: BFTHeader,
    pub parent: BFTHeader,
    pub committed: Option<BFTHeader>,
}

impl VoteData {
    pub fn new(proposed: BFTHeader, parent: BFTHeader, committed: Option<BFTHeader>) -> Self {
        Self {
            proposed,
            parent,
            committed,
        }
    }
}

/// The bytes a validator signs when it votes for `vote_data` at `timestamp`.
pub(crate) fn vote_signing_bytes(vote_data: &VoteData, timestamp: &Timestamp) -> Vec<u8> {
    let mut bytes = signing_bytes(vote_data);
    bytes.extend(signing_bytes(timestamp));
    bytes
}

/// Proof that a quorum of validators voted for the same [`VoteData`].
///
/// `signatures` is positional: the signature of the validator at
/// [`ValidatorSet::position`] `i` sits in slot `i`.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct QuorumCertificate {
    pub vote_data: VoteData,
    pub signatures: SignatureSet,
}

impl QuorumCertificate {
    pub fn new(vote_data: VoteData, signatures: SignatureSet) -> Self {
        Self {
            vote_data,
            signatures,
        }
    }

    /// The QC that certifies the genesis vertex whose header is `genesis_header`.
    ///
    /// The genesis QC carries no signatures and names the genesis header as its own parent and as
    /// committed, so that the genesis vertex is the initial committed root.
    pub fn genesis(genesis_header: BFTHeader) -> Self {
        Self {
            vote_data: VoteData::new(
                genesis_header.clone(),
                genesis_header.clone(),
                Some(genesis_header),
            ),
            signatures: SignatureSet::genesis(),
        }
    }

    /// The view of the vertex this QC certifies.
    pub fn view(&self) -> ViewNumber {
        self.vote_data.proposed.view
    }

    /// The header of the vertex this QC certifies.
    pub fn proposed(&self) -> &BFTHeader {
        &self.vote_data.proposed
    }

    /// The header of the parent of the vertex this QC certifies.
    pub fn parent(&self) -> &BFTHeader {
        &self.vote_data.parent
    }

    /// The header this QC finalizes, if any.
    pub fn committed(&self) -> Option<&BFTHeader> {
        self.vote_data.committed.as_ref()
    }

    /// Whether this is the shape [`QuorumCertificate::genesis`] builds: no signatures, view 0, and
    /// the certified header named as its own parent and as committed.
    pub fn is_genesis_qc(&self) -> bool {
        self.signatures.is_empty()
            && self.view() == ViewNumber::genesis()
            && self.vote_data.parent == self.vote_data.proposed
            && self.vote_data.committed.as_ref() == Some(&self.vote_data.proposed)
    }

    /// Check whether this QC is cryptographically correct with respect to `validator_set`.
    ///
    /// A correct QC has a signature slot for every validator, every present signature verifies over
    /// [`vote_signing_bytes`], and the signers' power reaches [`ValidatorSet::quorum`]. The genesis QC
    /// is always correct.
    pub fn is_correct(&self, validator_set: &ValidatorSet) -> bool {
        if self.is_genesis_qc() {
            return true;
        }

        if self.signatures.len() != validator_set.len() {
            return false;
        }

        let mut total_power = TotalPower::new(0);
        for (pos, entry) in self.signatures.iter().enumerate() {
            let Some(timestamped) = entry else {
                continue;
            };
            let Some(signer) = validator_set.validator(pos) else {
                return false;
            };
            let message = vote_signing_bytes(&self.vote_data, &timestamped.timestamp);
            if !verify(signer, &message, &timestamped.signature) {
                return false;
            }
            if let Some(power) = validator_set.power(signer) {
                total_power += *power;
            }
        }

        total_power >= validator_set.quorum()
    }

    /// The validators whose signatures appear in this QC.
    pub fn signers(&self, validator_set: &ValidatorSet) -> Vec<VerifyingKey> {
        self.signatures
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_some())
            .filter_map(|(pos, _)| validator_set.validator(pos).copied())
            .collect()
    }
}
