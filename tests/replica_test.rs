use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::Sender,
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use bft_core::{
    counters::CounterType,
    events::CommitVertexEvent,
    messages::ConsensusEvent,
    proposer_election::RotatingProposers,
    replica::{Configuration, Replica, ReplicaSpec},
    types::{
        data_types::{Command, Timestamp},
        headers::LedgerHeader,
    },
    vertex_store::VertexStore,
};
use log::LevelFilter;

mod common;

use crate::common::{
    logging::setup_logger,
    mem_safety_store::MemSafetyStore,
    network::mock_network,
    number_app::NumberApp,
    stubs::RecordingFetcher,
    validators::Validators,
};

const DEADLINE: Duration = Duration::from_secs(60);

struct Node {
    app: NumberApp,
    highest_committed_view: Arc<AtomicU64>,
    replica: Replica,
}

/// Start a replica for every validator, all connected through one mock network, and return them
/// together with the senders of their inbound queues.
fn start_replicas(
    validators: &Validators,
    tx_queue: Arc<Mutex<Vec<Command>>>,
) -> (Vec<Node>, Vec<Sender<ConsensusEvent>>) {
    mock_network(validators.keys().into_iter())
        .into_iter()
        .enumerate()
        .map(|(i, (network, inbox, event_receiver))| {
            let app = NumberApp::new(tx_queue.clone());
            let highest_committed_view = Arc::new(AtomicU64::new(0));
            let on_commit = {
                let highest_committed_view = highest_committed_view.clone();
                move |event: &CommitVertexEvent| {
                    highest_committed_view.fetch_max(event.header.view.int(), Ordering::SeqCst);
                }
            };

            let configuration = Configuration::builder()
                .me(validators.signing_key(i).clone())
                .base_view_timeout(Duration::from_millis(300))
                .timeout_backoff_rate(1.2)
                .max_timeout_exponent(3)
                .log_events(true)
                .build();

            let replica = ReplicaSpec::builder()
                .app(app.clone())
                .network(network)
                .fetcher(RecordingFetcher::default())
                .safety_store(MemSafetyStore::new())
                .proposer_election(Box::new(RotatingProposers::new(validators.keys())))
                .validator_set(validators.validator_set().clone())
                .event_receiver(event_receiver)
                .configuration(configuration)
                .on_commit_vertex(on_commit)
                .build()
                .start();

            (
                Node {
                    app,
                    highest_committed_view,
                    replica,
                },
                inbox,
            )
        })
        .unzip()
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(
            start.elapsed() < DEADLINE,
            "condition not reached within {:?}",
            DEADLINE
        );
        thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn replicas_commit_all_commands_test() {
    setup_logger(LevelFilter::Info);

    let validators = Validators::new(4);
    let tx_queue = Arc::new(Mutex::new((1..=5).map(NumberApp::increment).collect()));
    let (nodes, _inboxes) = start_replicas(&validators, tx_queue.clone());

    wait_until(|| nodes.iter().all(|node| node.app.number() == 5));

    // Every replica committed the same ledger.
    let reference = nodes[0].app.committed();
    for node in &nodes {
        let committed = node.app.committed();
        let common = committed.len().min(reference.len());
        assert_eq!(committed[..common], reference[..common]);
        assert!(node.highest_committed_view.load(Ordering::SeqCst) > 0);
        assert!(node.replica.counters().get(CounterType::BftVerticesCommitted) > 0);
    }
    assert!(tx_queue.lock().unwrap().is_empty());
}

#[test]
fn invalid_messages_do_not_halt_replicas_test() {
    setup_logger(LevelFilter::Info);

    let validators = Validators::new(4);
    let tx_queue = Arc::new(Mutex::new((1..=3).map(NumberApp::increment).collect()));
    let (nodes, inboxes) = start_replicas(&validators, tx_queue);

    // A vote for view 1 whose signature does not cover its timestamp, sent to the proposer of view 2.
    let mut store = VertexStore::genesis(LedgerHeader::default());
    let mut app = NumberApp::new(Arc::default());
    let genesis_header = store.root().clone();
    let genesis = store.vertex(&genesis_header.vertex_id).unwrap().clone();
    let v1 = validators.extend(&genesis, &genesis_header, 1, None);
    let v1_header = store
        .insert(v1.clone(), validators.validator_set(), &mut app)
        .unwrap();
    let mut forged_vote = validators.vote(0, &v1, &v1_header);
    forged_vote.timestamp = Timestamp::new(u64::MAX);
    inboxes[2].send(ConsensusEvent::Vote(forged_vote)).unwrap();

    wait_until(|| nodes.iter().all(|node| node.app.number() == 3));
    assert_eq!(nodes[2].replica.counters().get(CounterType::BftRejected), 1);
}
