//! [`NumberApp`], a simple implementation of [`App`] used in the integration tests.

use std::sync::{Arc, Mutex};

use bft_core::{
    app::{App, NextCommandRequest, PrepareRequest},
    types::{
        crypto_primitives::{CryptoHasher, Digest},
        data_types::{Command, CryptoHash, StateVersion, Timestamp},
        headers::{BFTHeader, LedgerHeader},
    },
    vertex_store::CommittedChain,
};

/// A simple implementation of [`App`] for use in integration tests.
///
/// Every command is an "increment". The ledger's `state_version` counts the increments applied on a
/// branch, and its accumulator chains the hashes of their bytes, so that any two validators compute
/// identical headers for the same vertex.
///
/// Commands are taken from a mempool (`tx_queue`) that may be shared between validators. A command is
/// only removed from the mempool once committed, and is never proposed twice on the same branch.
#[derive(Clone)]
pub(crate) struct NumberApp {
    tx_queue: Arc<Mutex<Vec<Command>>>,
    epoch_length: Option<u64>,
    committed: Arc<Mutex<Vec<BFTHeader>>>,
    epochs_ended: Arc<Mutex<Vec<BFTHeader>>>,
}

impl NumberApp {
    pub(crate) fn new(tx_queue: Arc<Mutex<Vec<Command>>>) -> NumberApp {
        Self {
            tx_queue,
            epoch_length: None,
            committed: Arc::new(Mutex::new(Vec::new())),
            epochs_ended: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Mark every vertex whose view is a multiple of `epoch_length` as closing its epoch.
    pub(crate) fn with_epoch_length(mut self, epoch_length: u64) -> NumberApp {
        self.epoch_length = Some(epoch_length);
        self
    }

    /// Headers committed so far, oldest first.
    pub(crate) fn committed(&self) -> Vec<BFTHeader> {
        self.committed.lock().unwrap().clone()
    }

    /// The number in the committed ledger: the count of committed increments.
    pub(crate) fn number(&self) -> u64 {
        self.committed
            .lock()
            .unwrap()
            .last()
            .map(|header| header.ledger.state_version.int())
            .unwrap_or(0)
    }

    pub(crate) fn epochs_ended(&self) -> Vec<BFTHeader> {
        self.epochs_ended.lock().unwrap().clone()
    }

    pub(crate) fn increment(id: u64) -> Command {
        Command::new(id.to_le_bytes().to_vec())
    }
}

impl App for NumberApp {
    fn next_command(&mut self, request: NextCommandRequest) -> Option<Command> {
        self.tx_queue
            .lock()
            .unwrap()
            .iter()
            .find(|command| !request.pending().contains(command))
            .cloned()
    }

    fn prepare(&mut self, request: PrepareRequest) -> LedgerHeader {
        let parent = &request.parent().ledger;
        let vertex = request.vertex();
        let (state_version, accumulator) = match vertex.command() {
            Some(command) => {
                let mut hasher = CryptoHasher::new();
                hasher.update(parent.accumulator.bytes());
                hasher.update(command.bytes());
                (
                    StateVersion::new(parent.state_version.int() + 1),
                    CryptoHash::new(hasher.finalize().into()),
                )
            }
            None => (parent.state_version, parent.accumulator),
        };

        LedgerHeader {
            epoch: parent.epoch,
            state_version,
            accumulator,
            timestamp: Timestamp::new(vertex.view().int()),
            end_of_epoch: self
                .epoch_length
                .is_some_and(|length| vertex.view().int() % length == 0),
        }
    }

    fn commit(&mut self, chain: &CommittedChain) {
        let mut tx_queue = self.tx_queue.lock().unwrap();
        for committed in &chain.vertices {
            if let Some(command) = committed.vertex.command() {
                tx_queue.retain(|queued| queued != command);
            }
            self.committed.lock().unwrap().push(committed.header.clone());
        }
    }

    fn end_of_epoch(&mut self, header: &BFTHeader) {
        self.epochs_ended.lock().unwrap().push(header.clone());
    }
}
