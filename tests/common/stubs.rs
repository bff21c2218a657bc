//! Stand-ins for the timer and the vertex fetcher that record what they were asked to do.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use bft_core::{
    networking::{VertexFetcher, VertexSyncRequest},
    pacemaker::TimeoutScheduler,
    types::data_types::ViewNumber,
};

#[derive(Clone, Default)]
pub(crate) struct RecordingTimer {
    scheduled: Arc<Mutex<Vec<(ViewNumber, Duration)>>>,
}

impl RecordingTimer {
    pub(crate) fn scheduled(&self) -> Vec<(ViewNumber, Duration)> {
        self.scheduled.lock().unwrap().clone()
    }

    pub(crate) fn last(&self) -> Option<(ViewNumber, Duration)> {
        self.scheduled.lock().unwrap().last().copied()
    }
}

impl TimeoutScheduler for RecordingTimer {
    fn schedule_timeout(&mut self, view: ViewNumber, timeout: Duration) {
        self.scheduled.lock().unwrap().push((view, timeout))
    }
}

#[derive(Clone, Default)]
pub(crate) struct RecordingFetcher {
    requests: Arc<Mutex<Vec<VertexSyncRequest>>>,
}

impl RecordingFetcher {
    pub(crate) fn requests(&self) -> Vec<VertexSyncRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl VertexFetcher for RecordingFetcher {
    fn fetch(&mut self, request: VertexSyncRequest) {
        self.requests.lock().unwrap().push(request)
    }
}
