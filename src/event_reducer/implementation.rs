/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of the consensus core, as described in the [module docs](super).
//!
//! Main type: [`BFTEventReducer`].

use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
    sync::{mpsc::Sender, Arc},
    time::SystemTime,
};

use typed_builder::TypedBuilder;

use crate::{
    app::{App, NextCommandRequest},
    counters::{CounterType, SystemCounters},
    events::*,
    logging::first_seven_base64_chars,
    messages::{ConsensusEvent, NewView, Proposal, Vote, VertexSyncResponse},
    networking::{sending::SenderHandle, Network, VertexFetcher, VertexSyncRequest},
    pacemaker::{Pacemaker, PacemakerConfiguration, TimeoutScheduler},
    pending_votes::PendingVotes,
    proposer_election::ProposerElection,
    safety_rules::{SafetyRules, SafetyRulesError, SafetyState, SafetyStateStore, SafetyStoreError},
    types::{
        certificates::QuorumCertificate,
        crypto_primitives::{Keypair, VerifyingKey},
        data_types::{CryptoHash, Timestamp, ViewNumber},
        headers::BFTHeader,
        validator_set::ValidatorSet,
        vertex::UnverifiedVertex,
    },
    vertex_store::{InvalidVertex, VertexStore, VertexStoreError},
};

/// Everything a [`BFTEventReducer`] is made of.
#[derive(TypedBuilder)]
pub struct BFTEventReducerSpec<N, A, F, S, T> {
    #[builder(setter(doc = "Set the keypair this validator signs votes, proposals and new-views with."))]
    keypair: Keypair,
    #[builder(setter(doc = "Set the validator set of the current epoch."))]
    validator_set: ValidatorSet,
    #[builder(setter(doc = "Set the vertex store, rooted at the last committed vertex."))]
    vertex_store: VertexStore,
    app: A,
    network: N,
    fetcher: F,
    safety_store: S,
    timeout_scheduler: T,
    proposer_election: Box<dyn ProposerElection>,
    pacemaker_config: PacemakerConfiguration,
    #[builder(default = 64)]
    pending_votes_capacity: usize,
    #[builder(default)]
    counters: Arc<SystemCounters>,
    #[builder(default)]
    event_publisher: Option<Sender<Event>>,
}

/// An input whose processing waits for a missing vertex.
enum DeferredInput {
    Proposal(Proposal),
    Certificate {
        qc: QuorumCertificate,
        origin: VerifyingKey,
    },
}

impl DeferredInput {
    fn view(&self) -> ViewNumber {
        match self {
            DeferredInput::Proposal(proposal) => proposal.view(),
            DeferredInput::Certificate { qc, .. } => qc.view(),
        }
    }
}

enum SyncStatus {
    Synced,
    Missing(CryptoHash),
    Stale,
}

/// A single validator's consensus core.
///
/// # Usage
///
/// Call [`start`](Self::start) once, then pass every inbound [`ConsensusEvent`] to
/// [`process_event`](Self::process_event), one at a time, in the order they were queued.
///
/// ## Errors
///
/// `process_event` returns [`BFTError::InvalidMessage`] for inputs that failed verification; the
/// caller may penalize their origin and carry on. [`BFTError::SafetyStore`] means the safety state could
/// not be persisted; the validator must stop.
pub struct BFTEventReducer<N, A, F, S, T>
where
    N: Network,
    A: App,
    F: VertexFetcher,
    S: SafetyStateStore,
    T: TimeoutScheduler,
{
    me: Keypair,
    validator_set: ValidatorSet,
    app: A,
    sender: SenderHandle<N>,
    fetcher: F,
    safety_rules: SafetyRules<S>,
    pacemaker: Pacemaker<T>,
    vertex_store: VertexStore,
    pending_votes: PendingVotes,
    proposer_election: Box<dyn ProposerElection>,
    deferred: HashMap<CryptoHash, Vec<DeferredInput>>,
    last_proposed_view: Option<ViewNumber>,
    counters: Arc<SystemCounters>,
    event_publisher: Option<Sender<Event>>,
}

impl<N, A, F, S, T> BFTEventReducer<N, A, F, S, T>
where
    N: Network,
    A: App,
    F: VertexFetcher,
    S: SafetyStateStore,
    T: TimeoutScheduler,
{
    pub fn new(spec: BFTEventReducerSpec<N, A, F, S, T>) -> Self {
        Self {
            safety_rules: SafetyRules::new(spec.keypair.clone(), spec.safety_store),
            me: spec.keypair,
            validator_set: spec.validator_set,
            app: spec.app,
            sender: SenderHandle::new(spec.network),
            fetcher: spec.fetcher,
            pacemaker: Pacemaker::new(spec.pacemaker_config, spec.timeout_scheduler),
            vertex_store: spec.vertex_store,
            pending_votes: PendingVotes::new(spec.pending_votes_capacity),
            proposer_election: spec.proposer_election,
            deferred: HashMap::new(),
            last_proposed_view: None,
            counters: spec.counters,
            event_publisher: spec.event_publisher,
        }
    }

    /// Enter the view after the highest QC in the vertex store. The proposer of that view proposes
    /// immediately; everyone sends it a NewView.
    pub fn start(&mut self) {
        let highest_qc = self.vertex_store.highest_qc().clone();
        if let Some(view) = self.pacemaker.start(&highest_qc) {
            self.proceed_to_view(view);
            if self.is_proposer(view) {
                self.propose(view);
            }
        }
    }

    pub fn process_event(&mut self, event: ConsensusEvent) -> Result<(), BFTError> {
        match event {
            ConsensusEvent::Proposal(proposal) => self.on_proposal(proposal),
            ConsensusEvent::Vote(vote) => self.on_vote(vote),
            ConsensusEvent::NewView(new_view) => self.on_new_view(new_view),
            ConsensusEvent::LocalTimeout(view) => {
                self.on_local_timeout(view);
                Ok(())
            }
            ConsensusEvent::VertexSyncCompleted(response) => self.on_vertex_sync_completed(response),
        }
    }

    pub fn me(&self) -> VerifyingKey {
        self.me.public()
    }

    pub fn current_view(&self) -> ViewNumber {
        self.pacemaker.current_view()
    }

    pub fn safety_state(&self) -> &SafetyState {
        self.safety_rules.state()
    }

    pub fn vertex_store(&self) -> &VertexStore {
        &self.vertex_store
    }

    pub fn counters(&self) -> &Arc<SystemCounters> {
        &self.counters
    }

    /// Number of vertex ids with inputs waiting on them.
    pub fn pending_syncs(&self) -> usize {
        self.deferred.len()
    }

    fn on_proposal(&mut self, proposal: Proposal) -> Result<(), BFTError> {
        Event::ReceiveProposal(ReceiveProposalEvent {
            timestamp: SystemTime::now(),
            origin: proposal.author,
            proposal: proposal.clone(),
        })
        .publish(&self.event_publisher);

        self.handle_proposal(proposal)
    }

    fn handle_proposal(&mut self, proposal: Proposal) -> Result<(), BFTError> {
        let view = proposal.view();
        let origin = proposal.author;

        // 1. Drop proposals for views this validator has left.
        if view < self.current_view() {
            log::debug!("Ignoring stale proposal for view {}", view);
            return Ok(());
        }

        // 2. Check the proposal is from the right proposer and is correctly signed.
        if origin != self.proposer(view) {
            return Err(self.reject(origin, InvalidVertex::WrongProposer));
        }
        if !proposal.is_correct() {
            return Err(self.reject(origin, InvalidVertex::IncorrectSignature));
        }
        if !proposal.vertex.qc.is_correct(&self.validator_set) {
            return Err(self.reject(origin, InvalidVertex::IncorrectCertificate));
        }

        // 3. Make sure the parent is stored, deferring the proposal otherwise.
        let qc = proposal.vertex.qc.clone();
        match self.sync_status(&qc)? {
            SyncStatus::Synced => (),
            SyncStatus::Missing(vertex_id) => {
                let peers = self.sync_peers(&qc, origin);
                self.defer(vertex_id, qc.view(), peers, DeferredInput::Proposal(proposal));
                return Ok(());
            }
            SyncStatus::Stale => return Ok(()),
        }

        // 4. Apply the QC the proposal carries.
        self.process_certificate(&qc)?;

        // 5. Vote.
        self.vote_on(proposal)
    }

    fn vote_on(&mut self, proposal: Proposal) -> Result<(), BFTError> {
        let view = proposal.view();
        let origin = proposal.author;
        // Votes are only cast in the current view, even if the proposal is for a later one.
        if view != self.current_view() {
            log::debug!(
                "Ignoring proposal for view {} while in view {}",
                view,
                self.current_view()
            );
            return Ok(());
        }

        // 1. Insert the vertex.
        let vertex = proposal.vertex.clone().verify();
        let header = match self
            .vertex_store
            .insert(vertex.clone(), &self.validator_set, &mut self.app)
        {
            Ok(header) => header,
            Err(VertexStoreError::Invalid(reason)) => return Err(self.reject(origin, reason)),
            Err(VertexStoreError::Stale { view }) => {
                log::debug!("Ignoring vertex in view {} below the committed root", view);
                return Ok(());
            }
            Err(VertexStoreError::SyncRequired { vertex_id }) => {
                self.defer(vertex_id, view, vec![origin], DeferredInput::Proposal(proposal));
                return Ok(());
            }
        };
        Event::InsertVertex(InsertVertexEvent {
            timestamp: SystemTime::now(),
            header: header.clone(),
        })
        .publish(&self.event_publisher);

        // 2. Ask the safety rules for a vote and send it to the next proposer.
        match self
            .safety_rules
            .vote_for(&vertex, &header, Timestamp::now())
        {
            Ok(vote) => self.send_vote(vote, view.next()),
            Err(SafetyRulesError::Violation(violation)) => {
                log::warn!(
                    "Refusing to vote for vertex {} in view {}: {}",
                    first_seven_base64_chars(&vertex.id().bytes()),
                    view,
                    violation
                );
            }
            Err(SafetyRulesError::Store(error)) => return Err(BFTError::SafetyStore(error)),
        }

        // 3. Unless this validator leads this view or the next, nothing is left to do in this view.
        let me = self.me();
        if self.proposer(view) != me && self.proposer(view.next()) != me {
            if let Some(next_view) = self.pacemaker.process_next_view(view) {
                self.proceed_to_view(next_view);
            }
        }

        Ok(())
    }

    fn on_vote(&mut self, vote: Vote) -> Result<(), BFTError> {
        Event::ReceiveVote(ReceiveVoteEvent {
            timestamp: SystemTime::now(),
            origin: vote.author,
            vote: vote.clone(),
        })
        .publish(&self.event_publisher);

        // 1. Only the proposer of the next view aggregates votes.
        if self.proposer(vote.view().next()) != self.me() {
            log::debug!(
                "Ignoring vote for view {}: not the next proposer",
                vote.view()
            );
            return Ok(());
        }
        // A vote is useful only in the view it is for, and honest votes arrive at most one view ahead.
        if vote.view() > self.current_view().next() {
            log::debug!(
                "Ignoring vote for view {} while in view {}",
                vote.view(),
                self.current_view()
            );
            return Ok(());
        }

        if !vote.is_correct() {
            return Err(self.reject(vote.author, InvalidVertex::IncorrectSignature));
        }

        // 2. Aggregate.
        let Some(qc) = self
            .pending_votes
            .insert_vote(&vote, &self.validator_set)
        else {
            return Ok(());
        };
        self.counters.increment(CounterType::BftVoteQuorums);
        Event::CollectQC(CollectQCEvent {
            timestamp: SystemTime::now(),
            quorum_certificate: qc.clone(),
        })
        .publish(&self.event_publisher);

        // 3. Apply the QC once the vertex it certifies is stored.
        self.handle_certificate(qc, vote.author)
    }

    fn on_new_view(&mut self, new_view: NewView) -> Result<(), BFTError> {
        Event::ReceiveNewView(ReceiveNewViewEvent {
            timestamp: SystemTime::now(),
            origin: new_view.author,
            new_view: new_view.clone(),
        })
        .publish(&self.event_publisher);

        let view = new_view.view;
        let origin = new_view.author;

        // 1. Only the proposer of the view collects NewViews for it.
        if self.proposer(view) != self.me() {
            log::debug!("Ignoring NewView for view {}: not the proposer", view);
            return Ok(());
        }
        if view < self.current_view() {
            log::debug!("Ignoring stale NewView for view {}", view);
            return Ok(());
        }
        if !new_view.is_correct() {
            return Err(self.reject(origin, InvalidVertex::IncorrectSignature));
        }
        if !new_view.highest_qc.is_correct(&self.validator_set) {
            return Err(self.reject(origin, InvalidVertex::IncorrectCertificate));
        }

        // 2. Learn from the sender's highest QC.
        self.handle_certificate(new_view.highest_qc.clone(), origin)?;

        // 3. Count the NewView and propose once a quorum has entered the view.
        let previous_view = self.current_view();
        if let Some(synced_view) = self
            .pacemaker
            .process_new_view(&new_view, &self.validator_set)
        {
            if synced_view > previous_view {
                self.publish_start_view(synced_view);
            }
            if self.is_proposer(synced_view) {
                self.propose(synced_view);
            }
        }

        Ok(())
    }

    fn on_local_timeout(&mut self, view: ViewNumber) {
        let Some(next_view) = self.pacemaker.process_local_timeout(view) else {
            log::debug!("Ignoring stale timeout for view {}", view);
            return;
        };

        self.counters.increment(CounterType::BftTimeout);
        Event::ViewTimeout(ViewTimeoutEvent {
            timestamp: SystemTime::now(),
            view,
        })
        .publish(&self.event_publisher);

        self.proceed_to_view(next_view);
    }

    fn on_vertex_sync_completed(&mut self, response: VertexSyncResponse) -> Result<(), BFTError> {
        // 1. Insert the fetched vertices, oldest first.
        let mut vertices_inserted = 0;
        for unverified in response.vertices {
            let vertex = unverified.verify();
            if self.vertex_store.contains(&vertex.id()) {
                continue;
            }
            match self
                .vertex_store
                .insert(vertex, &self.validator_set, &mut self.app)
            {
                Ok(header) => {
                    vertices_inserted += 1;
                    Event::InsertVertex(InsertVertexEvent {
                        timestamp: SystemTime::now(),
                        header,
                    })
                    .publish(&self.event_publisher);
                }
                Err(VertexStoreError::Stale { .. }) => continue,
                Err(VertexStoreError::SyncRequired { vertex_id }) => {
                    log::debug!(
                        "Fetched vertices do not connect to the store: missing {}",
                        first_seven_base64_chars(&vertex_id.bytes())
                    );
                    break;
                }
                Err(VertexStoreError::Invalid(reason)) => {
                    self.counters.increment(CounterType::BftRejected);
                    log::warn!("Fetched vertex is invalid: {}", reason);
                    break;
                }
            }
        }

        Event::EndSync(EndSyncEvent {
            timestamp: SystemTime::now(),
            vertex_id: response.vertex_id,
            vertices_inserted,
        })
        .publish(&self.event_publisher);

        // 2. Replay whatever was waiting on the vertex, if it is still relevant.
        let Some(inputs) = self.deferred.remove(&response.vertex_id) else {
            return Ok(());
        };
        if !self.vertex_store.contains(&response.vertex_id) {
            log::debug!(
                "Sync for {} completed without the vertex; dropping {} deferred inputs",
                first_seven_base64_chars(&response.vertex_id.bytes()),
                inputs.len()
            );
            return Ok(());
        }

        for input in inputs {
            if input.view() < self.current_view() {
                log::debug!("Dropping deferred input for stale view {}", input.view());
                continue;
            }
            match input {
                DeferredInput::Proposal(proposal) => self.handle_proposal(proposal)?,
                DeferredInput::Certificate { qc, origin } => self.handle_certificate(qc, origin)?,
            }
        }

        Ok(())
    }

    /// Apply `qc` if the vertex it certifies is stored, otherwise defer it.
    fn handle_certificate(
        &mut self,
        qc: QuorumCertificate,
        origin: VerifyingKey,
    ) -> Result<(), BFTError> {
        match self.sync_status(&qc)? {
            SyncStatus::Synced => self.process_certificate(&qc),
            SyncStatus::Missing(vertex_id) => {
                let peers = self.sync_peers(&qc, origin);
                self.defer(
                    vertex_id,
                    qc.view(),
                    peers,
                    DeferredInput::Certificate { qc, origin },
                );
                Ok(())
            }
            SyncStatus::Stale => Ok(()),
        }
    }

    /// Update the highest QC, the lock, the committed root and the current view from `qc`, whose
    /// certified vertex is stored.
    fn process_certificate(&mut self, qc: &QuorumCertificate) -> Result<(), BFTError> {
        // 1. Highest QC.
        if self.vertex_store.add_qc(qc.clone()) {
            Event::UpdateHighestQC(UpdateHighestQCEvent {
                timestamp: SystemTime::now(),
                highest_qc: qc.clone(),
            })
            .publish(&self.event_publisher);
        }

        // 2. Lock and commit.
        let locked_view = self.safety_rules.state().locked_view;
        let committed = self
            .safety_rules
            .process_qc(qc)
            .map_err(BFTError::SafetyStore)?;
        if self.safety_rules.state().locked_view > locked_view {
            Event::UpdateLockedView(UpdateLockedViewEvent {
                timestamp: SystemTime::now(),
                locked_view: self.safety_rules.state().locked_view,
            })
            .publish(&self.event_publisher);
        }
        if let Some(header) = committed {
            self.commit(&header);
        }

        // 3. View.
        if let Some(view) = self.pacemaker.process_qc(qc) {
            self.proceed_to_view(view);
        }

        Ok(())
    }

    fn commit(&mut self, header: &BFTHeader) {
        let chain = self.vertex_store.commit(&header.vertex_id);
        if chain.is_empty() {
            return;
        }

        let root_view = self.vertex_store.root_view();
        self.pending_votes.on_commit(root_view);
        self.deferred.retain(|_, inputs| {
            inputs.retain(|input| input.view() > root_view);
            !inputs.is_empty()
        });

        for vertex_id in &chain.pruned {
            Event::PruneVertex(PruneVertexEvent {
                timestamp: SystemTime::now(),
                vertex_id: *vertex_id,
            })
            .publish(&self.event_publisher);
        }
        for committed in &chain.vertices {
            Event::CommitVertex(CommitVertexEvent {
                timestamp: SystemTime::now(),
                header: committed.header.clone(),
            })
            .publish(&self.event_publisher);
        }
        self.counters.add(
            CounterType::BftVerticesCommitted,
            chain.vertices.len() as u64,
        );

        self.app.commit(&chain);
        for committed in &chain.vertices {
            if committed.header.ledger.end_of_epoch {
                self.app.end_of_epoch(&committed.header);
            }
        }
    }

    /// Announce entry into `view` to its proposer.
    fn proceed_to_view(&mut self, view: ViewNumber) {
        let leader = self.proposer(view);
        self.publish_start_view(view);

        let new_view = NewView::new(&self.me, view, self.vertex_store.highest_qc().clone());
        Event::NewView(NewViewEvent {
            timestamp: SystemTime::now(),
            new_view: new_view.clone(),
        })
        .publish(&self.event_publisher);
        self.sender.send_new_view(new_view, leader);
    }

    fn propose(&mut self, view: ViewNumber) {
        if self.last_proposed_view.is_some_and(|proposed| proposed >= view)
            || view < self.current_view()
        {
            return;
        }

        let highest_qc = self.vertex_store.highest_qc().clone();
        let parent = highest_qc.proposed().clone();
        if parent.view >= view {
            return;
        }

        let command = {
            let pending = self.vertex_store.pending_commands(&parent.vertex_id);
            self.app
                .next_command(NextCommandRequest::new(view, &parent, pending))
        };
        let proposal = Proposal::new(&self.me, UnverifiedVertex::new(view, command, highest_qc));

        self.last_proposed_view = Some(view);
        self.counters.increment(CounterType::BftProposalsMade);
        Event::Propose(ProposeEvent {
            timestamp: SystemTime::now(),
            proposal: proposal.clone(),
        })
        .publish(&self.event_publisher);
        self.sender.broadcast_proposal(proposal);
    }

    fn send_vote(&mut self, vote: Vote, next_view: ViewNumber) {
        let next_leader = self.proposer(next_view);
        self.counters.increment(CounterType::BftVotesSent);
        Event::Vote(VoteEvent {
            timestamp: SystemTime::now(),
            vote: vote.clone(),
        })
        .publish(&self.event_publisher);
        self.sender.send_vote(vote, next_leader);
    }

    fn sync_status(&self, qc: &QuorumCertificate) -> Result<SyncStatus, BFTError> {
        match self.vertex_store.sync_to_qc(qc) {
            Ok(()) => Ok(SyncStatus::Synced),
            Err(VertexStoreError::SyncRequired { vertex_id }) => Ok(SyncStatus::Missing(vertex_id)),
            Err(VertexStoreError::Stale { view }) => {
                log::debug!("Ignoring QC for view {} below the committed root", view);
                Ok(SyncStatus::Stale)
            }
            Err(VertexStoreError::Invalid(reason)) => Err(BFTError::InvalidMessage {
                origin: None,
                reason,
            }),
        }
    }

    fn sync_peers(&self, qc: &QuorumCertificate, origin: VerifyingKey) -> Vec<VerifyingKey> {
        let mut peers = vec![origin];
        peers.extend(
            qc.signers(&self.validator_set)
                .into_iter()
                .filter(|signer| *signer != origin && *signer != self.me()),
        );
        peers
    }

    /// Park `input` until `vertex_id` is fetched. Only the first input waiting on a vertex triggers a
    /// fetch.
    fn defer(
        &mut self,
        vertex_id: CryptoHash,
        view: ViewNumber,
        peers: Vec<VerifyingKey>,
        input: DeferredInput,
    ) {
        let inputs = self.deferred.entry(vertex_id).or_default();
        let first = inputs.is_empty();
        inputs.push(input);
        if !first {
            return;
        }

        self.counters.increment(CounterType::BftSyncRequests);
        Event::StartSync(StartSyncEvent {
            timestamp: SystemTime::now(),
            vertex_id,
            peers: peers.clone(),
        })
        .publish(&self.event_publisher);
        self.fetcher.fetch(VertexSyncRequest {
            vertex_id,
            view,
            root_view: self.vertex_store.root_view(),
            peers,
        });
    }

    fn reject(&self, origin: VerifyingKey, reason: InvalidVertex) -> BFTError {
        self.counters.increment(CounterType::BftRejected);
        log::warn!(
            "Rejecting input from {}: {}",
            first_seven_base64_chars(&origin.to_bytes()),
            reason
        );
        BFTError::InvalidMessage {
            origin: Some(origin),
            reason,
        }
    }

    fn publish_start_view(&self, view: ViewNumber) {
        Event::StartView(StartViewEvent {
            timestamp: SystemTime::now(),
            view,
            leader: self.proposer(view),
        })
        .publish(&self.event_publisher);
    }

    fn proposer(&self, view: ViewNumber) -> VerifyingKey {
        self.proposer_election.proposer(view)
    }

    fn is_proposer(&self, view: ViewNumber) -> bool {
        self.proposer(view) == self.me()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BFTError {
    /// An input failed verification. `origin` is the validator that sent it, when known.
    InvalidMessage {
        origin: Option<VerifyingKey>,
        reason: InvalidVertex,
    },
    /// The safety state could not be persisted. Continuing could lead to equivocation after a restart.
    SafetyStore(SafetyStoreError),
}

impl BFTError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BFTError::SafetyStore(_))
    }
}

impl Display for BFTError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BFTError::InvalidMessage { reason, .. } => write!(f, "invalid message: {}", reason),
            BFTError::SafetyStore(error) => Display::fmt(error, f),
        }
    }
}

impl From<SafetyStoreError> for BFTError {
    fn from(value: SafetyStoreError) -> Self {
        BFTError::SafetyStore(value)
    }
}
