/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Headers that commit to a vertex's position in consensus and to the ledger state it produces.

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::{CryptoHash, Epoch, StateVersion, Timestamp, ViewNumber};

/// Commitment to the ledger state after a vertex's command has been applied.
///
/// Produced by [`App::prepare`](crate::app::App::prepare). The consensus core treats every field as
/// opaque except for `end_of_epoch`, which triggers [`App::end_of_epoch`](crate::app::App::end_of_epoch)
/// once a header carrying it is committed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct LedgerHeader {
    pub epoch: Epoch,
    pub state_version: StateVersion,
    pub accumulator: CryptoHash,
    pub timestamp: Timestamp,
    pub end_of_epoch: bool,
}

impl LedgerHeader {
    /// The ledger header of the genesis vertex for `epoch`, before any command has been applied.
    pub fn genesis(epoch: Epoch, accumulator: CryptoHash) -> Self {
        Self {
            epoch,
            state_version: StateVersion::new(0),
            accumulator,
            timestamp: Timestamp::new(0),
            end_of_epoch: false,
        }
    }
}

/// A vertex's position in consensus (`view`, `vertex_id`) together with the ledger state it produced.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct BFTHeader {
    pub view: ViewNumber,
    pub vertex_id: CryptoHash,
    pub ledger: LedgerHeader,
}

impl BFTHeader {
    pub fn new(view: ViewNumber, vertex_id: CryptoHash, ledger: LedgerHeader) -> Self {
        Self {
            view,
            vertex_id,
            ledger,
        }
    }

    /// Placeholder header that the genesis vertex's own QC points at.
    pub(crate) fn pre_genesis() -> Self {
        Self {
            view: ViewNumber::genesis(),
            vertex_id: CryptoHash::zero(),
            ledger: LedgerHeader::default(),
        }
    }
}
