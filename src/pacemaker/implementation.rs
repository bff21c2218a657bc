/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of the Pacemaker.
//!
//! Main type: [`Pacemaker`].

use std::time::Duration;

use crate::{
    messages::NewView,
    types::{certificates::QuorumCertificate, data_types::ViewNumber, validator_set::ValidatorSet},
};

use super::types::PendingNewViews;

/// The external timer.
///
/// After `schedule_timeout(view, timeout)`, the implementation should deliver
/// [`ConsensusEvent::LocalTimeout(view)`](crate::messages::ConsensusEvent::LocalTimeout) once `timeout` has
/// elapsed, unless another timeout has been scheduled since. Timers are single-shot.
pub trait TimeoutScheduler: Send {
    fn schedule_timeout(&mut self, view: ViewNumber, timeout: Duration);
}

/// Timing parameters of the [`Pacemaker`].
///
/// The timeout of a view is `base_timeout * backoff_rate ^ min(n, max_exponent)`, where `n` is the
/// number of views that have timed out since the last QC was seen.
#[derive(Clone, Debug)]
pub struct PacemakerConfiguration {
    pub base_timeout: Duration,
    pub backoff_rate: f64,
    pub max_exponent: u32,
}

impl PacemakerConfiguration {
    /// Compute the timeout for a view entered after `consecutive_timeouts` timeouts.
    pub fn timeout(&self, consecutive_timeouts: u32) -> Duration {
        let exponent = consecutive_timeouts.min(self.max_exponent) as i32;
        self.base_timeout
            .mul_f64(self.backoff_rate.max(1.0).powi(exponent))
    }
}

/// A single validator's view of view progression.
///
/// # Usage
///
/// Call [`start`](Self::start) once before feeding any other input, then call the `process_*` methods
/// as the corresponding inputs arrive. Every method that returns `Some(view)` has just entered `view`
/// and scheduled its timer.
pub struct Pacemaker<T: TimeoutScheduler> {
    config: PacemakerConfiguration,
    current_view: ViewNumber,
    last_synced_view: ViewNumber,
    consecutive_timeouts: u32,
    pending_new_views: PendingNewViews,
    timeout_scheduler: T,
}

impl<T: TimeoutScheduler> Pacemaker<T> {
    pub fn new(config: PacemakerConfiguration, timeout_scheduler: T) -> Self {
        Self {
            config,
            current_view: ViewNumber::genesis(),
            last_synced_view: ViewNumber::genesis(),
            consecutive_timeouts: 0,
            pending_new_views: PendingNewViews::new(),
            timeout_scheduler,
        }
    }

    pub fn current_view(&self) -> ViewNumber {
        self.current_view
    }

    /// Number of views that have timed out since the last QC was processed.
    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    /// Enter the view after the one certified by `highest_qc`.
    pub fn start(&mut self, highest_qc: &QuorumCertificate) -> Option<ViewNumber> {
        self.process_qc(highest_qc)
    }

    /// Enter `qc.view() + 1` if `qc` certifies the current view or a later one.
    pub fn process_qc(&mut self, qc: &QuorumCertificate) -> Option<ViewNumber> {
        let qc_view = qc.view();
        if qc_view < self.current_view {
            return None;
        }

        self.consecutive_timeouts = 0;
        let next = qc_view.next();
        self.update_view(next);
        Some(next)
    }

    /// Count `new_view` towards the quorum for its view. Once a quorum is reached for a view
    /// `>= current_view`, enter that view (if not already in it) and return it.
    ///
    /// Returns `Some` at most once per view.
    ///
    /// # Preconditions
    ///
    /// `new_view.is_correct()`.
    pub fn process_new_view(
        &mut self,
        new_view: &NewView,
        validator_set: &ValidatorSet,
    ) -> Option<ViewNumber> {
        let view = new_view.view;
        if view < self.current_view || view <= self.last_synced_view {
            return None;
        }

        if !self
            .pending_new_views
            .insert_new_view(new_view, validator_set)
        {
            return None;
        }

        self.last_synced_view = view;
        if view > self.current_view {
            self.update_view(view);
        }
        Some(view)
    }

    /// Move on from `view` after having voted in it.
    pub fn process_next_view(&mut self, view: ViewNumber) -> Option<ViewNumber> {
        if view < self.current_view {
            return None;
        }

        let next = view.next();
        self.update_view(next);
        Some(next)
    }

    /// Handle the firing of the timer for `view`.
    ///
    /// A timer for any view other than `current_view` is stale and ignored. Otherwise, the next view is
    /// entered with a longer timeout and returned.
    pub fn process_local_timeout(&mut self, view: ViewNumber) -> Option<ViewNumber> {
        if view != self.current_view {
            return None;
        }

        self.consecutive_timeouts = self.consecutive_timeouts.saturating_add(1);
        let next = view.next();
        self.update_view(next);
        Some(next)
    }

    fn update_view(&mut self, view: ViewNumber) {
        debug_assert!(view > self.current_view);
        self.current_view = view;
        self.pending_new_views.prune_below(view);
        let timeout = self.config.timeout(self.consecutive_timeouts);
        self.timeout_scheduler.schedule_timeout(view, timeout);
    }
}
