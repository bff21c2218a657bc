//! Test validators, and helpers to build certified chains of vertices without running consensus.

use bft_core::{
    messages::Vote,
    pending_votes::PendingVotes,
    safety_rules::committed_by_vertex,
    types::{
        certificates::{QuorumCertificate, VoteData},
        crypto_primitives::{Keypair, SigningKey, VerifyingKey},
        data_types::{Command, Power, Timestamp, ViewNumber},
        headers::BFTHeader,
        validator_set::ValidatorSet,
        vertex::{UnverifiedVertex, VerifiedVertex},
    },
};
use rand_core::OsRng;

/// `n` validators of power 1 each. `keypair(i)` sits at position `i` of the validator set.
pub(crate) struct Validators {
    signing_keys: Vec<SigningKey>,
    keypairs: Vec<Keypair>,
    validator_set: ValidatorSet,
}

impl Validators {
    pub(crate) fn new(n: usize) -> Validators {
        let mut csprg = OsRng {};
        let mut signing_keys: Vec<SigningKey> = (0..n)
            .map(|_| SigningKey::generate(&mut csprg))
            .collect();
        signing_keys.sort_by_key(|signing_key| signing_key.verifying_key().to_bytes());
        let keypairs: Vec<Keypair> = signing_keys.iter().cloned().map(Keypair::new).collect();

        let validator_set = ValidatorSet::from_powers(
            keypairs
                .iter()
                .map(|keypair| (keypair.public(), Power::new(1))),
        );

        Validators {
            signing_keys,
            keypairs,
            validator_set,
        }
    }

    pub(crate) fn keypair(&self, i: usize) -> &Keypair {
        &self.keypairs[i]
    }

    pub(crate) fn signing_key(&self, i: usize) -> &SigningKey {
        &self.signing_keys[i]
    }

    pub(crate) fn key(&self, i: usize) -> VerifyingKey {
        self.keypairs[i].public()
    }

    pub(crate) fn keys(&self) -> Vec<VerifyingKey> {
        self.keypairs.iter().map(Keypair::public).collect()
    }

    pub(crate) fn validator_set(&self) -> &ValidatorSet {
        &self.validator_set
    }

    pub(crate) fn len(&self) -> usize {
        self.keypairs.len()
    }

    /// A vote by validator `i` for `vertex`, whose header is `header`.
    pub(crate) fn vote(&self, i: usize, vertex: &VerifiedVertex, header: &BFTHeader) -> Vote {
        Vote::new(self.keypair(i), vote_data(vertex, header), Timestamp::new(i as u64))
    }

    /// A QC for `vertex` signed by every validator.
    pub(crate) fn certify(&self, vertex: &VerifiedVertex, header: &BFTHeader) -> QuorumCertificate {
        let mut pending_votes = PendingVotes::new(1);
        (0..self.len())
            .find_map(|i| pending_votes.insert_vote(&self.vote(i, vertex, header), &self.validator_set))
            .unwrap()
    }

    /// A vertex in `view` extending `parent`, certified by all validators (or by the genesis QC if
    /// `parent` is the genesis vertex).
    pub(crate) fn extend(
        &self,
        parent: &VerifiedVertex,
        parent_header: &BFTHeader,
        view: u64,
        command: Option<Command>,
    ) -> VerifiedVertex {
        let qc = if parent.view() == ViewNumber::genesis() {
            QuorumCertificate::genesis(parent_header.clone())
        } else {
            self.certify(parent, parent_header)
        };
        UnverifiedVertex::new(ViewNumber::new(view), command, qc).verify()
    }
}

/// The vote data an honest validator signs for `vertex`.
pub(crate) fn vote_data(vertex: &VerifiedVertex, header: &BFTHeader) -> VoteData {
    VoteData::new(
        header.clone(),
        vertex.parent_header().clone(),
        committed_by_vertex(vertex).cloned(),
    )
}
