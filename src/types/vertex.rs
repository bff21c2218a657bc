/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Vertices: proposed units of work linked to the QC that justifies them.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    certificates::{QuorumCertificate, VoteData},
    crypto_primitives::hash_of,
    data_types::{Command, CryptoHash, SignatureSet, ViewNumber},
    headers::BFTHeader,
};

/// A vertex as received from the network, before its id has been derived.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct UnverifiedVertex {
    pub view: ViewNumber,
    pub command: Option<Command>,
    pub qc: QuorumCertificate,
}

impl UnverifiedVertex {
    pub fn new(view: ViewNumber, command: Option<Command>, qc: QuorumCertificate) -> Self {
        Self { view, command, qc }
    }

    /// SHA256 of the borsh serialization of this vertex.
    pub fn id(&self) -> CryptoHash {
        hash_of(self)
    }

    /// Derive this vertex's id and wrap it in a [`VerifiedVertex`].
    pub fn verify(self) -> VerifiedVertex {
        let id = self.id();
        VerifiedVertex { vertex: self, id }
    }
}

/// An [`UnverifiedVertex`] whose id has been derived from its content.
///
/// Descendants reference this vertex through `id` in the `proposed` header of their QC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedVertex {
    vertex: UnverifiedVertex,
    id: CryptoHash,
}

impl VerifiedVertex {
    /// The genesis vertex: view 0, no command, justified by a signature-less QC pointing at the
    /// all-zero [`BFTHeader::pre_genesis`].
    pub fn genesis() -> Self {
        let pre_genesis = BFTHeader::pre_genesis();
        let qc = QuorumCertificate::new(
            VoteData::new(pre_genesis.clone(), pre_genesis.clone(), Some(pre_genesis)),
            SignatureSet::genesis(),
        );
        UnverifiedVertex::new(ViewNumber::genesis(), None, qc).verify()
    }

    pub fn id(&self) -> CryptoHash {
        self.id
    }

    pub fn view(&self) -> ViewNumber {
        self.vertex.view
    }

    pub fn command(&self) -> Option<&Command> {
        self.vertex.command.as_ref()
    }

    pub fn qc(&self) -> &QuorumCertificate {
        &self.vertex.qc
    }

    /// The header of this vertex's parent, as certified by this vertex's QC.
    pub fn parent_header(&self) -> &BFTHeader {
        self.vertex.qc.proposed()
    }

    pub fn parent_id(&self) -> CryptoHash {
        self.parent_header().vertex_id
    }

    pub fn parent_view(&self) -> ViewNumber {
        self.parent_header().view
    }

    pub fn unverified(&self) -> &UnverifiedVertex {
        &self.vertex
    }

    pub fn into_unverified(self) -> UnverifiedVertex {
        self.vertex
    }
}
