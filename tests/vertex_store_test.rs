use std::sync::{Arc, Mutex};

use bft_core::{
    types::{
        data_types::{StateVersion, ViewNumber},
        headers::{BFTHeader, LedgerHeader},
        vertex::{UnverifiedVertex, VerifiedVertex},
    },
    vertex_store::{InvalidVertex, VertexStore, VertexStoreError},
};

mod common;

use crate::common::{number_app::NumberApp, validators::Validators};

struct Fixture {
    validators: Validators,
    store: VertexStore,
    app: NumberApp,
    genesis: (VerifiedVertex, BFTHeader),
}

impl Fixture {
    fn new() -> Fixture {
        let store = VertexStore::genesis(LedgerHeader::default());
        let genesis_header = store.root().clone();
        let genesis = store.vertex(&genesis_header.vertex_id).unwrap().clone();
        Fixture {
            validators: Validators::new(4),
            store,
            app: NumberApp::new(Arc::new(Mutex::new(Vec::new()))),
            genesis: (genesis, genesis_header),
        }
    }

    /// Build a child of `parent` without inserting it.
    fn child(&self, parent: &(VerifiedVertex, BFTHeader), view: u64, command: Option<u64>) -> VerifiedVertex {
        self.validators
            .extend(&parent.0, &parent.1, view, command.map(NumberApp::increment))
    }

    fn insert(&mut self, vertex: VerifiedVertex) -> Result<BFTHeader, VertexStoreError> {
        self.store
            .insert(vertex, self.validators.validator_set(), &mut self.app)
    }

    fn grow(&mut self, parent: &(VerifiedVertex, BFTHeader), view: u64, command: Option<u64>) -> (VerifiedVertex, BFTHeader) {
        let vertex = self.child(parent, view, command);
        let header = self.insert(vertex.clone()).unwrap();
        (vertex, header)
    }
}

#[test]
fn insert_and_ancestry_test() {
    let mut fixture = Fixture::new();
    let genesis = fixture.genesis.clone();
    let v1 = fixture.grow(&genesis, 1, Some(1));
    let v2 = fixture.grow(&v1, 2, None);
    let v3 = fixture.grow(&v2, 3, Some(2));

    assert_eq!(fixture.store.len(), 4);
    assert_eq!(v1.1.ledger.state_version, StateVersion::new(1));
    assert_eq!(v2.1.ledger.state_version, StateVersion::new(1));
    assert_eq!(v3.1.ledger.state_version, StateVersion::new(2));

    // The highest QC is the one carried by the newest vertex.
    assert_eq!(fixture.store.highest_qc().view(), ViewNumber::new(2));
    assert_eq!(fixture.store.highest_qc().proposed(), &v2.1);

    let ancestry = fixture.store.get_ancestry(&v3.0.id(), 2).unwrap();
    assert_eq!(ancestry, vec![v2.1.clone(), v1.1.clone()]);
    let ancestry = fixture.store.get_ancestry(&v3.0.id(), 10).unwrap();
    assert_eq!(ancestry, vec![v2.1.clone(), v1.1.clone(), genesis.1.clone()]);
    assert!(fixture
        .store
        .get_ancestry(&fixture.child(&v3, 4, None).id(), 1)
        .is_none());

    let pending = fixture.store.pending_commands(&v3.0.id());
    assert_eq!(
        pending,
        vec![&NumberApp::increment(2), &NumberApp::increment(1)]
    );
}

#[test]
fn insert_is_idempotent_test() {
    let mut fixture = Fixture::new();
    let genesis = fixture.genesis.clone();
    let v1 = fixture.child(&genesis, 1, None);

    let first = fixture.insert(v1.clone()).unwrap();
    let second = fixture.insert(v1).unwrap();
    assert_eq!(first, second);
    assert_eq!(fixture.store.len(), 2);
}

#[test]
fn orphan_requires_sync_test() {
    let mut fixture = Fixture::new();
    let genesis = fixture.genesis.clone();

    // Build v1 <- v2 in a second store, so that v1 is unknown here.
    let mut other = Fixture::new();
    let v1 = {
        let vertex = fixture.child(&genesis, 1, None);
        let header = other
            .store
            .insert(vertex.clone(), fixture.validators.validator_set(), &mut other.app)
            .unwrap();
        (vertex, header)
    };
    let v2 = fixture.child(&v1, 2, None);

    assert_eq!(
        fixture.insert(v2.clone()),
        Err(VertexStoreError::SyncRequired {
            vertex_id: v1.0.id()
        })
    );
    assert!(!fixture.store.contains(&v2.id()));
    assert_eq!(
        fixture.store.sync_to_qc(v2.qc()),
        Err(VertexStoreError::SyncRequired {
            vertex_id: v1.0.id()
        })
    );

    // Once the parent arrives, the orphan is accepted.
    fixture.insert(v1.0.clone()).unwrap();
    assert_eq!(fixture.store.sync_to_qc(v2.qc()), Ok(()));
    assert!(fixture.insert(v2).is_ok());
}

#[test]
fn commit_moves_root_and_prunes_forks_test() {
    let mut fixture = Fixture::new();
    let genesis = fixture.genesis.clone();
    let v1 = fixture.grow(&genesis, 1, None);
    let v2 = fixture.grow(&v1, 2, None);
    let v3 = fixture.grow(&v2, 3, None);
    let fork = fixture.grow(&v1, 4, Some(9));
    let fork_child = fixture.grow(&fork, 5, None);

    let chain = fixture.store.commit(&v2.0.id());
    assert_eq!(
        chain
            .vertices
            .iter()
            .map(|committed| committed.header.clone())
            .collect::<Vec<_>>(),
        vec![v1.1.clone(), v2.1.clone()]
    );
    assert_eq!(chain.head(), Some(&v2.1));

    let mut pruned = chain.pruned.clone();
    pruned.sort_by_key(|id| id.bytes());
    let mut expected = vec![fork.0.id(), fork_child.0.id()];
    expected.sort_by_key(|id| id.bytes());
    assert_eq!(pruned, expected);

    assert_eq!(fixture.store.root(), &v2.1);
    assert_eq!(fixture.store.len(), 2);
    assert!(fixture.store.contains(&v3.0.id()));
    assert!(!fixture.store.contains(&genesis.0.id()));

    // Committing the root again, or an unknown vertex, does nothing.
    assert!(fixture.store.commit(&v2.0.id()).is_empty());
    assert!(fixture.store.commit(&fork.0.id()).is_empty());
    assert_eq!(fixture.store.len(), 2);
}

#[test]
fn vertices_at_or_below_root_are_stale_test() {
    let mut fixture = Fixture::new();
    let genesis = fixture.genesis.clone();
    let v1 = fixture.grow(&genesis, 1, None);
    let v2 = fixture.grow(&v1, 2, None);
    let w1 = fixture.child(&genesis, 1, Some(3));
    fixture.store.commit(&v2.0.id());

    // A sibling of the root, in the root's view.
    let sibling = fixture.child(&v1, 2, Some(4));
    assert_eq!(
        fixture.insert(sibling),
        Err(VertexStoreError::Stale {
            view: ViewNumber::new(2)
        })
    );

    // A late vertex above the root whose parent was pruned.
    let w1_header = {
        let mut other = Fixture::new();
        other
            .store
            .insert(w1.clone(), fixture.validators.validator_set(), &mut other.app)
            .unwrap()
    };
    let late = fixture.child(&(w1, w1_header), 5, None);
    assert_eq!(
        fixture.insert(late.clone()),
        Err(VertexStoreError::Stale {
            view: ViewNumber::new(5)
        })
    );
    assert_eq!(
        fixture.store.sync_to_qc(late.qc()),
        Err(VertexStoreError::Stale {
            view: ViewNumber::new(1)
        })
    );
}

#[test]
fn invalid_vertices_are_rejected_test() {
    let mut fixture = Fixture::new();
    let genesis = fixture.genesis.clone();
    let v1 = fixture.grow(&genesis, 1, None);

    // Same view as its parent.
    let same_view = fixture.child(&v1, 1, Some(1));
    assert_eq!(
        fixture.insert(same_view),
        Err(VertexStoreError::Invalid(InvalidVertex::NonIncreasingView {
            view: ViewNumber::new(1),
            parent_view: ViewNumber::new(1),
        }))
    );

    // A QC over v1 with a ledger state this validator did not compute.
    let mut forged_header = v1.1.clone();
    forged_header.ledger.state_version = StateVersion::new(100);
    let forged = UnverifiedVertex::new(
        ViewNumber::new(2),
        None,
        fixture.validators.certify(&v1.0, &forged_header),
    )
    .verify();
    assert_eq!(
        fixture.insert(forged),
        Err(VertexStoreError::Invalid(InvalidVertex::ParentHeaderMismatch))
    );

    // A QC signed by validators outside the validator set.
    let strangers = Validators::new(4);
    let unsigned = UnverifiedVertex::new(ViewNumber::new(2), None, strangers.certify(&v1.0, &v1.1)).verify();
    assert_eq!(
        fixture.insert(unsigned),
        Err(VertexStoreError::Invalid(InvalidVertex::IncorrectCertificate))
    );

    assert_eq!(fixture.store.len(), 2);
}
