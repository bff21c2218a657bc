/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a replica on its own threads.
//!
//! The [event reducer](crate::event_reducer) is a passive state machine. This module wraps it in:
//! - An **event loop** thread, which drains the inbound [`ConsensusEvent`] queue in order, and turns timer
//!   deadlines into [`ConsensusEvent::LocalTimeout`]s.
//! - An **event bus** thread, which runs the [event handlers](crate::event_bus::EventHandlers), including
//!   the default loggers if [`Configuration::log_events`] is set.
//!
//! ## Starting a replica
//!
//! ```ignore
//! let (event_sender, event_receiver) = mpsc::channel();
//! // Give `event_sender` to the networking and vertex sync providers.
//!
//! let replica =
//!     ReplicaSpec::builder()
//!     .app(app)
//!     .network(network)
//!     .fetcher(fetcher)
//!     .safety_store(safety_store)
//!     .proposer_election(Box::new(WeightedRoundRobin::new(validator_set.clone())))
//!     .validator_set(validator_set)
//!     .event_receiver(event_receiver)
//!     .configuration(configuration)
//!     .on_commit_vertex(commit_handler)
//!     .build()
//!     .start()
//! ```
//!
//! The replica's [configuration](Configuration) is also built with the builder pattern:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(keypair)
//!     .base_view_timeout(Duration::from_millis(500))
//!     .log_events(true)
//!     .build()
//! ```
//!
//! The event loop panics if the safety state cannot be persisted. Invalid inputs are logged and dropped.

use std::{
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use ed25519_dalek::SigningKey;
use typed_builder::TypedBuilder;

use crate::{
    app::App,
    counters::SystemCounters,
    event_bus::*,
    event_reducer::{BFTEventReducer, BFTEventReducerSpec},
    events::*,
    logging::first_seven_base64_chars,
    messages::ConsensusEvent,
    networking::{Network, VertexFetcher},
    pacemaker::{PacemakerConfiguration, TimeoutScheduler},
    proposer_election::ProposerElection,
    safety_rules::SafetyStateStore,
    types::{
        crypto_primitives::Keypair, data_types::ViewNumber, headers::LedgerHeader,
        validator_set::ValidatorSet,
    },
    vertex_store::VertexStore,
};

/// Longest time the event loop blocks on its queue before checking for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// User-defined parameters of a replica.
///
/// ## Timeouts
///
/// A view entered after `n` consecutive timeouts times out after
/// `base_view_timeout * timeout_backoff_rate ^ min(n, max_timeout_exponent)`. A QC resets `n` to 0.
///
/// ## Log Events
///
/// Logging goes through the [log](https://docs.rs/log/latest/log/) crate. To get these messages printed
/// onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(TypedBuilder)]
pub struct Configuration {
    #[builder(setter(doc = "Set the replica's keypair, used to sign messages. Required."))]
    pub me: SigningKey,
    #[builder(setter(doc = "Set the timeout of a view entered without preceding timeouts. Required."))]
    pub base_view_timeout: Duration,
    #[builder(
        default = 1.5,
        setter(doc = "Set the factor a view's timeout grows by with every consecutive timeout. Defaults to 1.5.")
    )]
    pub timeout_backoff_rate: f64,
    #[builder(
        default = 6,
        setter(doc = "Set the number of consecutive timeouts after which timeouts stop growing. Defaults to 6.")
    )]
    pub max_timeout_exponent: u32,
    #[builder(
        default = 64,
        setter(doc = "Set the number of distinct vote data the vote aggregator tracks at once. Defaults to 64.")
    )]
    pub pending_votes_capacity: usize,
    #[builder(default = false, setter(doc = "Enable logging? Defaults to false."))]
    pub log_events: bool,
}

impl From<&Configuration> for PacemakerConfiguration {
    fn from(configuration: &Configuration) -> Self {
        PacemakerConfiguration {
            base_timeout: configuration.base_view_timeout,
            backoff_rate: configuration.timeout_backoff_rate,
            max_exponent: configuration.max_timeout_exponent,
        }
    }
}

/// Stores all parameters and trait implementations required to run a [`Replica`].
#[derive(TypedBuilder)]
pub struct ReplicaSpec<A, N, F, S>
where
    A: App + 'static,
    N: Network + 'static,
    F: VertexFetcher + 'static,
    S: SafetyStateStore + 'static,
{
    // Required parameters
    #[builder(setter(doc = "Set the application that executes commands. Required."))]
    app: A,
    #[builder(setter(doc = "Set the implementation of peer-to-peer messaging. Required."))]
    network: N,
    #[builder(setter(doc = "Set the implementation of ancestor fetching. Required."))]
    fetcher: F,
    #[builder(setter(doc = "Set the durable store of the safety state. Required."))]
    safety_store: S,
    #[builder(setter(doc = "Set the rule that picks the proposer of each view. Required."))]
    proposer_election: Box<dyn ProposerElection>,
    #[builder(setter(doc = "Set the validator set of the current epoch. Required."))]
    validator_set: ValidatorSet,
    #[builder(setter(
        doc = "Set the queue that network messages and sync completions are delivered on. Required."
    ))]
    event_receiver: Receiver<ConsensusEvent>,
    #[builder(setter(doc = "Set the [configuration](Configuration). Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(
        default = LedgerHeader::default(),
        setter(doc = "Set the ledger state of the genesis vertex. Defaults to the empty ledger.")
    )]
    genesis_ledger: LedgerHeader,
    #[builder(default, setter(transform = |handler: impl Fn(&InsertVertexEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<InsertVertexEvent>),
    doc = "Register a handler closure to be invoked after a vertex is inserted into the vertex store. Optional."))]
    on_insert_vertex: Option<HandlerPtr<InsertVertexEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitVertexEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitVertexEvent>),
    doc = "Register a handler closure to be invoked after a vertex is committed. Optional."))]
    on_commit_vertex: Option<HandlerPtr<CommitVertexEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PruneVertexEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PruneVertexEvent>),
    doc = "Register a handler closure to be invoked after a vertex is removed from the vertex store. Optional."))]
    on_prune_vertex: Option<HandlerPtr<PruneVertexEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateHighestQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateHighestQCEvent>),
    doc = "Register a handler closure to be invoked after the replica updates its highest QC. Optional."))]
    on_update_highest_qc: Option<HandlerPtr<UpdateHighestQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateLockedViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateLockedViewEvent>),
    doc = "Register a handler closure to be invoked after the replica updates its locked view. Optional."))]
    on_update_locked_view: Option<HandlerPtr<UpdateLockedViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ProposeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ProposeEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a proposal. Optional."))]
    on_propose: Option<HandlerPtr<ProposeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&VoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<VoteEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a vote. Optional."))]
    on_vote: Option<HandlerPtr<VoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&NewViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<NewViewEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a NewView to a proposer. Optional."))]
    on_new_view: Option<HandlerPtr<NewViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveProposalEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a proposal. Optional."))]
    on_receive_proposal: Option<HandlerPtr<ReceiveProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveVoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveVoteEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a vote. Optional."))]
    on_receive_vote: Option<HandlerPtr<ReceiveVoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveNewViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveNewViewEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a NewView. Optional."))]
    on_receive_new_view: Option<HandlerPtr<ReceiveNewViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartViewEvent>),
    doc = "Register a handler closure to be invoked after the replica enters a new view. Optional."))]
    on_start_view: Option<HandlerPtr<StartViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ViewTimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ViewTimeoutEvent>),
    doc = "Register a handler closure to be invoked after the replica's view times out. Optional."))]
    on_view_timeout: Option<HandlerPtr<ViewTimeoutEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CollectQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CollectQCEvent>),
    doc = "Register a handler closure to be invoked after the replica collects a quorum certificate. Optional."))]
    on_collect_qc: Option<HandlerPtr<CollectQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartSyncEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartSyncEvent>),
    doc = "Register a handler closure to be invoked after the replica requests missing vertices. Optional."))]
    on_start_sync: Option<HandlerPtr<StartSyncEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EndSyncEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EndSyncEvent>),
    doc = "Register a handler closure to be invoked after fetched vertices are inserted. Optional."))]
    on_end_sync: Option<HandlerPtr<EndSyncEvent>>,
}

impl<A, N, F, S> ReplicaSpec<A, N, F, S>
where
    A: App + 'static,
    N: Network + 'static,
    F: VertexFetcher + 'static,
    S: SafetyStateStore + 'static,
{
    /// Start the event loop and event bus threads, and return the handle that keeps them alive.
    pub fn start(self) -> Replica {
        let mut event_handlers = EventHandlers::new(self.configuration.log_events);
        event_handlers.insert_vertex_handlers.extend(self.on_insert_vertex);
        event_handlers.commit_vertex_handlers.extend(self.on_commit_vertex);
        event_handlers.prune_vertex_handlers.extend(self.on_prune_vertex);
        event_handlers
            .update_highest_qc_handlers
            .extend(self.on_update_highest_qc);
        event_handlers
            .update_locked_view_handlers
            .extend(self.on_update_locked_view);
        event_handlers.propose_handlers.extend(self.on_propose);
        event_handlers.vote_handlers.extend(self.on_vote);
        event_handlers.new_view_handlers.extend(self.on_new_view);
        event_handlers
            .receive_proposal_handlers
            .extend(self.on_receive_proposal);
        event_handlers.receive_vote_handlers.extend(self.on_receive_vote);
        event_handlers
            .receive_new_view_handlers
            .extend(self.on_receive_new_view);
        event_handlers.start_view_handlers.extend(self.on_start_view);
        event_handlers.view_timeout_handlers.extend(self.on_view_timeout);
        event_handlers.collect_qc_handlers.extend(self.on_collect_qc);
        event_handlers.start_sync_handlers.extend(self.on_start_sync);
        event_handlers.end_sync_handlers.extend(self.on_end_sync);

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let (event_bus, event_bus_shutdown) = match event_subscriber {
            Some(event_subscriber) => {
                let (shutdown, shutdown_receiver) = mpsc::channel();
                let event_bus = start_event_bus(event_handlers, event_subscriber, shutdown_receiver);
                (Some(event_bus), Some(shutdown))
            }
            None => (None, None),
        };

        let counters = Arc::new(SystemCounters::new());
        let (timer_sender, timer_receiver) = mpsc::channel();
        let keypair = Keypair::new(self.configuration.me.clone());
        log::info!(
            "Starting replica {}",
            first_seven_base64_chars(&keypair.public().to_bytes())
        );

        let reducer = BFTEventReducer::new(
            BFTEventReducerSpec::builder()
                .keypair(keypair)
                .validator_set(self.validator_set)
                .vertex_store(VertexStore::genesis(self.genesis_ledger))
                .app(self.app)
                .network(self.network)
                .fetcher(self.fetcher)
                .safety_store(self.safety_store)
                .timeout_scheduler(ChannelTimer(timer_sender))
                .proposer_election(self.proposer_election)
                .pacemaker_config(PacemakerConfiguration::from(&self.configuration))
                .pending_votes_capacity(self.configuration.pending_votes_capacity)
                .counters(counters.clone())
                .event_publisher(event_publisher)
                .build(),
        );

        let (event_loop_shutdown, event_loop_shutdown_receiver) = mpsc::channel();
        let event_loop = start_event_loop(
            reducer,
            self.event_receiver,
            timer_receiver,
            event_loop_shutdown_receiver,
        );

        Replica {
            counters,
            event_loop: Some(event_loop),
            event_loop_shutdown,
            event_bus,
            event_bus_shutdown,
        }
    }
}

/// [`TimeoutScheduler`] that hands deadlines to the event loop of the same replica.
struct ChannelTimer(Sender<(ViewNumber, Instant)>);

impl TimeoutScheduler for ChannelTimer {
    fn schedule_timeout(&mut self, view: ViewNumber, timeout: Duration) {
        // The receiver lives as long as the event loop, which owns this timer.
        let _ = self.0.send((view, Instant::now() + timeout));
    }
}

fn start_event_loop<N, A, F, S>(
    mut reducer: BFTEventReducer<N, A, F, S, ChannelTimer>,
    events: Receiver<ConsensusEvent>,
    timers: Receiver<(ViewNumber, Instant)>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()>
where
    N: Network + 'static,
    A: App + 'static,
    F: VertexFetcher + 'static,
    S: SafetyStateStore + 'static,
{
    thread::spawn(move || {
        reducer.start();

        // Only the latest scheduled timer is live.
        let mut timer: Option<(ViewNumber, Instant)> = None;
        loop {
            match shutdown_signal.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => (),
            }

            while let Ok(scheduled) = timers.try_recv() {
                timer = Some(scheduled);
            }

            let event = match timer {
                Some((view, deadline)) if Instant::now() >= deadline => {
                    timer = None;
                    Some(ConsensusEvent::LocalTimeout(view))
                }
                _ => {
                    let wait = timer
                        .map(|(_, deadline)| deadline.saturating_duration_since(Instant::now()))
                        .unwrap_or(POLL_INTERVAL)
                        .min(POLL_INTERVAL);
                    match events.recv_timeout(wait) {
                        Ok(event) => Some(event),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                }
            };

            if let Some(event) = event {
                if let Err(error) = reducer.process_event(event) {
                    if error.is_fatal() {
                        panic!("Consensus halted: {}", error);
                    }
                    log::warn!("{}", error);
                }
            }
        }
    })
}

/// A handle to the background threads of a replica. When this value is dropped, all background threads
/// are gracefully shut down.
pub struct Replica {
    counters: Arc<SystemCounters>,
    event_loop: Option<JoinHandle<()>>,
    event_loop_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl Replica {
    /// Get the replica's [counters](crate::counters).
    pub fn counters(&self) -> &Arc<SystemCounters> {
        &self.counters
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        // The event loop publishes into the event bus, so it is stopped first.
        let _ = self.event_loop_shutdown.send(());
        if let Some(event_loop) = self.event_loop.take() {
            if event_loop.join().is_err() {
                log::error!("Event loop thread panicked");
            }
        }

        if let Some(shutdown) = &self.event_bus_shutdown {
            let _ = shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            if event_bus.join().is_err() {
                log::error!("Event bus thread panicked");
            }
        }
    }
}
