use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use bft_core::{
    messages::NewView,
    pacemaker::{types::PendingNewViews, Pacemaker, PacemakerConfiguration},
    types::{
        certificates::QuorumCertificate,
        data_types::ViewNumber,
        headers::LedgerHeader,
    },
    vertex_store::VertexStore,
};

mod common;

use crate::common::{number_app::NumberApp, stubs::RecordingTimer, validators::Validators};

const BASE_TIMEOUT: Duration = Duration::from_millis(100);

fn pacemaker(timer: &RecordingTimer) -> Pacemaker<RecordingTimer> {
    Pacemaker::new(
        PacemakerConfiguration {
            base_timeout: BASE_TIMEOUT,
            backoff_rate: 2.0,
            max_exponent: 2,
        },
        timer.clone(),
    )
}

/// QCs for a chain of vertices in views `1..=length`, preceded by the genesis QC.
fn qcs(validators: &Validators, length: u64) -> Vec<QuorumCertificate> {
    let mut store = VertexStore::genesis(LedgerHeader::default());
    let mut app = NumberApp::new(Arc::new(Mutex::new(Vec::new())));
    let mut qcs = vec![store.highest_qc().clone()];

    let mut parent_header = store.root().clone();
    let mut parent = store.vertex(&parent_header.vertex_id).unwrap().clone();
    for view in 1..=length {
        let vertex = validators.extend(&parent, &parent_header, view, None);
        let header = store
            .insert(vertex.clone(), validators.validator_set(), &mut app)
            .unwrap();
        qcs.push(validators.certify(&vertex, &header));
        parent = vertex;
        parent_header = header;
    }
    qcs
}

fn view(int: u64) -> ViewNumber {
    ViewNumber::new(int)
}

#[test]
fn qc_advances_view_once_test() {
    let validators = Validators::new(4);
    let qcs = qcs(&validators, 3);
    let timer = RecordingTimer::default();
    let mut pacemaker = pacemaker(&timer);

    assert_eq!(pacemaker.start(&qcs[0]), Some(view(1)));
    assert_eq!(timer.last(), Some((view(1), BASE_TIMEOUT)));

    assert_eq!(pacemaker.process_qc(&qcs[1]), Some(view(2)));
    assert_eq!(pacemaker.process_qc(&qcs[1]), None);
    assert_eq!(pacemaker.process_qc(&qcs[0]), None);
    assert_eq!(pacemaker.current_view(), view(2));

    // A QC from the future jumps ahead.
    assert_eq!(pacemaker.process_qc(&qcs[3]), Some(view(4)));
    assert_eq!(
        timer.scheduled().iter().map(|(view, _)| *view).collect::<Vec<_>>(),
        vec![view(1), view(2), view(4)]
    );
}

#[test]
fn timeouts_back_off_until_qc_test() {
    let validators = Validators::new(4);
    let qcs = qcs(&validators, 6);
    let timer = RecordingTimer::default();
    let mut pacemaker = pacemaker(&timer);
    pacemaker.start(&qcs[0]);

    // A timer for a view that is not current is stale.
    assert_eq!(pacemaker.process_local_timeout(view(0)), None);
    assert_eq!(pacemaker.process_local_timeout(view(2)), None);

    assert_eq!(pacemaker.process_local_timeout(view(1)), Some(view(2)));
    assert_eq!(timer.last(), Some((view(2), BASE_TIMEOUT * 2)));
    assert_eq!(pacemaker.process_local_timeout(view(2)), Some(view(3)));
    assert_eq!(timer.last(), Some((view(3), BASE_TIMEOUT * 4)));
    assert_eq!(pacemaker.process_local_timeout(view(3)), Some(view(4)));
    assert_eq!(timer.last(), Some((view(4), BASE_TIMEOUT * 4)));
    assert_eq!(pacemaker.consecutive_timeouts(), 3);

    // The same timer firing twice only counts once.
    assert_eq!(pacemaker.process_local_timeout(view(3)), None);

    assert_eq!(pacemaker.process_qc(&qcs[5]), Some(view(6)));
    assert_eq!(pacemaker.consecutive_timeouts(), 0);
    assert_eq!(timer.last(), Some((view(6), BASE_TIMEOUT)));
}

#[test]
fn new_view_quorum_syncs_view_test() {
    let validators = Validators::new(4);
    let qcs = qcs(&validators, 1);
    let timer = RecordingTimer::default();
    let mut pacemaker = pacemaker(&timer);
    pacemaker.start(&qcs[0]);

    let new_view = |i: usize, v: u64| NewView::new(validators.keypair(i), view(v), qcs[1].clone());

    assert_eq!(pacemaker.process_new_view(&new_view(0, 5), validators.validator_set()), None);
    assert_eq!(pacemaker.process_new_view(&new_view(0, 5), validators.validator_set()), None);
    assert_eq!(pacemaker.process_new_view(&new_view(1, 5), validators.validator_set()), None);
    assert_eq!(pacemaker.current_view(), view(1));

    assert_eq!(
        pacemaker.process_new_view(&new_view(2, 5), validators.validator_set()),
        Some(view(5))
    );
    assert_eq!(pacemaker.current_view(), view(5));
    assert_eq!(timer.last(), Some((view(5), BASE_TIMEOUT)));

    // The quorum is only reported once.
    assert_eq!(pacemaker.process_new_view(&new_view(3, 5), validators.validator_set()), None);

    // NewViews for views already left are ignored.
    for i in 0..4 {
        assert_eq!(pacemaker.process_new_view(&new_view(i, 4), validators.validator_set()), None);
    }
    assert_eq!(pacemaker.current_view(), view(5));
}

#[test]
fn each_author_is_counted_for_one_view_test() {
    let validators = Validators::new(4);
    let qcs = qcs(&validators, 1);
    let new_view = |i: usize, v: u64| NewView::new(validators.keypair(i), view(v), qcs[1].clone());
    let mut pending = PendingNewViews::new();

    // One validator naming ever higher views occupies a single entry.
    for v in (10..=10_000).step_by(10) {
        assert!(!pending.insert_new_view(&new_view(0, v), validators.validator_set()));
    }
    assert_eq!(pending.len(), 1);

    // Going back to a lower view does not count.
    assert!(!pending.insert_new_view(&new_view(0, 5), validators.validator_set()));
    assert_eq!(pending.len(), 1);

    // Validators 1 and 2 moving from view 20 to view 10_000 leave nothing behind in view 20.
    assert!(!pending.insert_new_view(&new_view(1, 20), validators.validator_set()));
    assert!(!pending.insert_new_view(&new_view(2, 20), validators.validator_set()));
    assert_eq!(pending.len(), 2);
    assert!(!pending.insert_new_view(&new_view(1, 10_000), validators.validator_set()));
    assert!(pending.insert_new_view(&new_view(2, 10_000), validators.validator_set()));
    assert_eq!(pending.len(), 1);

    // The quorum for view 10_000 is reported once.
    assert!(!pending.insert_new_view(&new_view(3, 10_000), validators.validator_set()));

    pending.prune_below(view(10_001));
    assert!(pending.is_empty());
}

#[test]
fn moved_author_no_longer_counts_for_old_view_test() {
    let validators = Validators::new(4);
    let qcs = qcs(&validators, 1);
    let new_view = |i: usize, v: u64| NewView::new(validators.keypair(i), view(v), qcs[1].clone());
    let mut pending = PendingNewViews::new();

    assert!(!pending.insert_new_view(&new_view(0, 7), validators.validator_set()));
    assert!(!pending.insert_new_view(&new_view(1, 7), validators.validator_set()));
    assert!(!pending.insert_new_view(&new_view(0, 8), validators.validator_set()));

    // Only validators 1 and 2 are left in view 7.
    assert!(!pending.insert_new_view(&new_view(2, 7), validators.validator_set()));
    assert!(pending.insert_new_view(&new_view(3, 7), validators.validator_set()));
}

#[test]
fn new_view_quorum_for_current_view_does_not_reschedule_test() {
    let validators = Validators::new(4);
    let qcs = qcs(&validators, 1);
    let timer = RecordingTimer::default();
    let mut pacemaker = pacemaker(&timer);
    pacemaker.start(&qcs[0]);
    pacemaker.process_qc(&qcs[1]);

    for i in 0..2 {
        let new_view = NewView::new(validators.keypair(i), view(2), qcs[1].clone());
        assert_eq!(pacemaker.process_new_view(&new_view, validators.validator_set()), None);
    }
    let new_view = NewView::new(validators.keypair(2), view(2), qcs[1].clone());
    assert_eq!(
        pacemaker.process_new_view(&new_view, validators.validator_set()),
        Some(view(2))
    );
    assert_eq!(timer.scheduled().len(), 2);
}

#[test]
fn next_view_after_voting_test() {
    let validators = Validators::new(4);
    let qcs = qcs(&validators, 0);
    let timer = RecordingTimer::default();
    let mut pacemaker = pacemaker(&timer);
    pacemaker.start(&qcs[0]);

    assert_eq!(pacemaker.process_next_view(view(1)), Some(view(2)));
    assert_eq!(pacemaker.process_next_view(view(1)), None);
    assert_eq!(pacemaker.current_view(), view(2));
}
