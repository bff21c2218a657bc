/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The tree of speculative, not-yet-committed vertices.
//!
//! # Structure
//!
//! Vertices are kept in an arena keyed by vertex id. Each vertex refers to its parent through the
//! `proposed` header of its QC, and the store additionally indexes the children of every vertex so that
//! pruning can walk downwards. Exactly one vertex is the **root**: the last committed vertex. Every other
//! stored vertex descends from the root.
//!
//! # Invariants
//!
//! 1. A vertex is only stored once its parent is stored. A vertex with an unknown parent is rejected
//!    with [`VertexStoreError::SyncRequired`] so that the caller can fetch the missing ancestors.
//! 2. A stored vertex's view is strictly greater than its parent's, and the QC it carries certifies
//!    exactly the stored header of its parent.
//! 3. [`commit`](VertexStore::commit) only moves the root forward. Vertices that do not descend from the
//!    new root are removed, together with the committed path itself.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{self, Display, Formatter};

use crate::{
    app::{App, PrepareRequest},
    types::{
        certificates::QuorumCertificate,
        data_types::{Command, CryptoHash, ViewNumber},
        headers::{BFTHeader, LedgerHeader},
        validator_set::ValidatorSet,
        vertex::VerifiedVertex,
    },
};

struct StoredVertex {
    vertex: VerifiedVertex,
    header: BFTHeader,
}

pub struct VertexStore {
    root_id: CryptoHash,
    vertices: HashMap<CryptoHash, StoredVertex>,
    children: HashMap<CryptoHash, Vec<CryptoHash>>,
    highest_qc: QuorumCertificate,
}

impl VertexStore {
    /// Create a store rooted at the genesis vertex, whose ledger state is `ledger`.
    pub fn genesis(ledger: LedgerHeader) -> Self {
        let vertex = VerifiedVertex::genesis();
        let header = BFTHeader::new(vertex.view(), vertex.id(), ledger);
        let qc = QuorumCertificate::genesis(header.clone());
        Self::new(vertex, header, qc)
    }

    /// Create a store rooted at `root`, a committed vertex whose header is `root_header` and which is
    /// certified by `root_qc`.
    pub fn new(root: VerifiedVertex, root_header: BFTHeader, root_qc: QuorumCertificate) -> Self {
        let root_id = root.id();
        let mut vertices = HashMap::new();
        vertices.insert(
            root_id,
            StoredVertex {
                vertex: root,
                header: root_header,
            },
        );

        Self {
            root_id,
            vertices,
            children: HashMap::new(),
            highest_qc: root_qc,
        }
    }

    /// Insert `vertex`, computing the ledger state it produces through `app`, and return its header.
    ///
    /// Inserting an already stored vertex returns its stored header.
    pub fn insert<A: App>(
        &mut self,
        vertex: VerifiedVertex,
        validator_set: &ValidatorSet,
        app: &mut A,
    ) -> Result<BFTHeader, VertexStoreError> {
        if let Some(stored) = self.vertices.get(&vertex.id()) {
            return Ok(stored.header.clone());
        }

        // 1. Vertices at or below the root can never be committed.
        if vertex.view() <= self.root_view() {
            return Err(VertexStoreError::Stale {
                view: vertex.view(),
            });
        }

        // 2. Resolve the parent.
        let Some(parent) = self.vertices.get(&vertex.parent_id()) else {
            return Err(if vertex.parent_view() <= self.root_view() {
                VertexStoreError::Stale {
                    view: vertex.view(),
                }
            } else {
                VertexStoreError::SyncRequired {
                    vertex_id: vertex.parent_id(),
                }
            });
        };

        // 3. Check the vertex against its parent.
        if &parent.header != vertex.parent_header() {
            return Err(InvalidVertex::ParentHeaderMismatch.into());
        }
        if vertex.view() <= parent.header.view {
            return Err(InvalidVertex::NonIncreasingView {
                view: vertex.view(),
                parent_view: parent.header.view,
            }
            .into());
        }
        if !vertex.qc().is_correct(validator_set) {
            return Err(InvalidVertex::IncorrectCertificate.into());
        }

        // 4. Compute the ledger state and store.
        let ledger = app.prepare(PrepareRequest::new(&vertex, &parent.header));
        let header = BFTHeader::new(vertex.view(), vertex.id(), ledger);
        let qc = vertex.qc().clone();

        self.children
            .entry(vertex.parent_id())
            .or_default()
            .push(vertex.id());
        self.vertices.insert(
            vertex.id(),
            StoredVertex {
                vertex,
                header: header.clone(),
            },
        );
        self.add_qc(qc);

        Ok(header)
    }

    /// Check that the vertex `qc` certifies is stored, so that `qc` can be applied.
    pub fn sync_to_qc(&self, qc: &QuorumCertificate) -> Result<(), VertexStoreError> {
        let vertex_id = qc.proposed().vertex_id;
        if self.vertices.contains_key(&vertex_id) {
            Ok(())
        } else if qc.view() <= self.root_view() {
            Err(VertexStoreError::Stale { view: qc.view() })
        } else {
            Err(VertexStoreError::SyncRequired { vertex_id })
        }
    }

    /// Replace the highest QC with `qc` if `qc` certifies a stored vertex in a higher view. Returns
    /// whether it did.
    pub fn add_qc(&mut self, qc: QuorumCertificate) -> bool {
        if qc.view() > self.highest_qc.view()
            && self.vertices.contains_key(&qc.proposed().vertex_id)
        {
            self.highest_qc = qc;
            true
        } else {
            false
        }
    }

    /// Get up to `depth` ancestor headers of `vertex_id`, nearest first. The walk stops early at the
    /// root.
    ///
    /// Returns `None` if `vertex_id` is not stored or a parent link is broken before the root.
    pub fn get_ancestry(&self, vertex_id: &CryptoHash, depth: usize) -> Option<Vec<BFTHeader>> {
        let mut current = self.vertices.get(vertex_id)?;
        let mut ancestry = Vec::with_capacity(depth);
        while ancestry.len() < depth && current.vertex.id() != self.root_id {
            let parent = self.vertices.get(&current.vertex.parent_id())?;
            ancestry.push(parent.header.clone());
            current = parent;
        }
        Some(ancestry)
    }

    /// Get the commands carried by `vertex_id` and its uncommitted ancestors.
    pub fn pending_commands(&self, vertex_id: &CryptoHash) -> Vec<&Command> {
        let mut commands = Vec::new();
        let mut current = self.vertices.get(vertex_id);
        while let Some(stored) = current {
            if stored.vertex.id() == self.root_id {
                break;
            }
            if let Some(command) = stored.vertex.command() {
                commands.push(command);
            }
            current = self.vertices.get(&stored.vertex.parent_id());
        }
        commands
    }

    /// Commit `vertex_id` and every uncommitted ancestor, make it the new root, and prune every vertex
    /// that does not descend from it.
    ///
    /// Committing the root, an ancestor of the root, or an unknown vertex returns an empty chain.
    pub fn commit(&mut self, vertex_id: &CryptoHash) -> CommittedChain {
        if *vertex_id == self.root_id {
            return CommittedChain::default();
        }

        // 1. Collect the path from the root (exclusive) to the vertex, oldest first.
        let mut path = Vec::new();
        let mut current = *vertex_id;
        while current != self.root_id {
            let Some(stored) = self.vertices.get(&current) else {
                return CommittedChain::default();
            };
            path.push(current);
            current = stored.vertex.parent_id();
        }
        path.reverse();

        // 2. Keep only the new root and its descendants.
        let mut keep: HashSet<CryptoHash> = HashSet::new();
        let mut frontier = VecDeque::from([*vertex_id]);
        while let Some(id) = frontier.pop_front() {
            keep.insert(id);
            if let Some(children) = self.children.get(&id) {
                frontier.extend(children.iter().copied());
            }
        }

        let removed_ids: Vec<CryptoHash> = self
            .vertices
            .keys()
            .filter(|id| !keep.contains(*id))
            .copied()
            .collect();
        let mut removed: HashMap<CryptoHash, StoredVertex> = removed_ids
            .into_iter()
            .filter_map(|id| self.vertices.remove(&id).map(|stored| (id, stored)))
            .collect();
        self.children.retain(|id, _| keep.contains(id));

        // 3. Move the root.
        let old_root_id = self.root_id;
        self.root_id = *vertex_id;

        let mut vertices = Vec::with_capacity(path.len());
        for id in &path {
            let stored = if id == vertex_id {
                self.vertices.get(id).map(|stored| CommittedVertex {
                    vertex: stored.vertex.clone(),
                    header: stored.header.clone(),
                })
            } else {
                removed.remove(id).map(|stored| CommittedVertex {
                    vertex: stored.vertex,
                    header: stored.header,
                })
            };
            vertices.extend(stored);
        }

        let pruned = removed
            .into_keys()
            .filter(|id| *id != old_root_id)
            .collect();

        CommittedChain { vertices, pruned }
    }

    pub fn root(&self) -> &BFTHeader {
        // The root is never removed from `vertices`.
        &self.vertices[&self.root_id].header
    }

    pub fn root_view(&self) -> ViewNumber {
        self.root().view
    }

    pub fn highest_qc(&self) -> &QuorumCertificate {
        &self.highest_qc
    }

    pub fn contains(&self, vertex_id: &CryptoHash) -> bool {
        self.vertices.contains_key(vertex_id)
    }

    pub fn vertex(&self, vertex_id: &CryptoHash) -> Option<&VerifiedVertex> {
        self.vertices.get(vertex_id).map(|stored| &stored.vertex)
    }

    pub fn header(&self, vertex_id: &CryptoHash) -> Option<&BFTHeader> {
        self.vertices.get(vertex_id).map(|stored| &stored.header)
    }

    /// Number of stored vertices, including the root.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// A vertex leaving the speculative tree because it was committed.
#[derive(Clone, Debug, PartialEq)]
pub struct CommittedVertex {
    pub vertex: VerifiedVertex,
    pub header: BFTHeader,
}

/// Result of [`VertexStore::commit`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommittedChain {
    /// Newly committed vertices, oldest first. The last one is the new root.
    pub vertices: Vec<CommittedVertex>,
    /// Ids of uncommitted vertices removed because they do not descend from the new root.
    pub pruned: Vec<CryptoHash>,
}

impl CommittedChain {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// The header of the newest committed vertex.
    pub fn head(&self) -> Option<&BFTHeader> {
        self.vertices.last().map(|committed| &committed.header)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VertexStoreError {
    /// The vertex with `vertex_id` must be fetched before the input can be processed.
    SyncRequired { vertex_id: CryptoHash },
    /// The input lies at or below the committed root, on a branch that can never be committed.
    Stale { view: ViewNumber },
    Invalid(InvalidVertex),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvalidVertex {
    NonIncreasingView {
        view: ViewNumber,
        parent_view: ViewNumber,
    },
    ParentHeaderMismatch,
    IncorrectCertificate,
    IncorrectSignature,
    WrongProposer,
}

impl From<InvalidVertex> for VertexStoreError {
    fn from(value: InvalidVertex) -> Self {
        VertexStoreError::Invalid(value)
    }
}

impl Display for InvalidVertex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            InvalidVertex::NonIncreasingView { view, parent_view } => write!(
                f,
                "vertex view {} does not exceed parent view {}",
                view, parent_view
            ),
            InvalidVertex::ParentHeaderMismatch => {
                write!(f, "QC does not certify the stored parent header")
            }
            InvalidVertex::IncorrectCertificate => write!(f, "QC failed verification"),
            InvalidVertex::IncorrectSignature => write!(f, "signature failed verification"),
            InvalidVertex::WrongProposer => write!(f, "author is not the proposer of the view"),
        }
    }
}
