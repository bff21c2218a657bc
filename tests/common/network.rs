use std::{
    collections::HashMap,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
};

use bft_core::{
    messages::{BFTMessage, ConsensusEvent},
    networking::Network,
    types::crypto_primitives::VerifyingKey,
};

/// A mock network stub which passes messages from and to validators using channels.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    all_peers: HashMap<VerifyingKey, Sender<ConsensusEvent>>,
}

impl Network for NetworkStub {
    fn broadcast(&mut self, message: BFTMessage) {
        for peer in self.all_peers.values() {
            let _ = peer.send(message.clone().into());
        }
    }

    fn send(&mut self, peer: VerifyingKey, message: BFTMessage) {
        if let Some(peer) = self.all_peers.get(&peer) {
            let _ = peer.send(message.into());
        }
    }
}

/// Wire up one `NetworkStub` and inbox per peer, in the order of `peers`.
pub(crate) fn mock_network(
    peers: impl Iterator<Item = VerifyingKey>,
) -> Vec<(NetworkStub, Sender<ConsensusEvent>, Receiver<ConsensusEvent>)> {
    let mut all_peers = HashMap::new();
    let peer_and_inboxes: Vec<(VerifyingKey, Sender<ConsensusEvent>, Receiver<ConsensusEvent>)> =
        peers
            .map(|peer| {
                let (sender, receiver) = mpsc::channel();
                all_peers.insert(peer, sender.clone());

                (peer, sender, receiver)
            })
            .collect();

    peer_and_inboxes
        .into_iter()
        .map(|(_, sender, inbox)| {
            (
                NetworkStub {
                    all_peers: all_peers.clone(),
                },
                sender,
                inbox,
            )
        })
        .collect()
}

/// A network that only records what it was asked to send.
#[derive(Clone, Default)]
pub(crate) struct RecordingNetwork {
    sent: Arc<Mutex<Vec<(Option<VerifyingKey>, BFTMessage)>>>,
}

impl RecordingNetwork {
    /// Drain the messages sent so far. Broadcasts are recorded with no recipient.
    pub(crate) fn take(&self) -> Vec<(Option<VerifyingKey>, BFTMessage)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl Network for RecordingNetwork {
    fn broadcast(&mut self, message: BFTMessage) {
        self.sent.lock().unwrap().push((None, message))
    }

    fn send(&mut self, peer: VerifyingKey, message: BFTMessage) {
        self.sent.lock().unwrap().push((Some(peer), message))
    }
}
