/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Liveness: moving the local view forward despite crashed or slow leaders.
//!
//! # View transitions
//!
//! The [`Pacemaker`] owns `current_view`, which never decreases. It moves forward when:
//! 1. A QC for a view `>= current_view` is seen ([`process_qc`](Pacemaker::process_qc)): the view after
//!    the certified one is entered, and the timeout backoff resets.
//! 2. A quorum of [`NewView`](crate::messages::NewView)s for a view `>= current_view` is collected
//!    ([`process_new_view`](Pacemaker::process_new_view)): that view is entered.
//! 3. This validator has voted in `current_view` and will not collect votes for it
//!    ([`process_next_view`](Pacemaker::process_next_view)).
//! 4. The local timer for `current_view` fires ([`process_local_timeout`](Pacemaker::process_local_timeout)):
//!    the next view is entered with a longer timeout.
//!
//! # Timers
//!
//! Entering a view schedules exactly one timer for it through the [`TimeoutScheduler`]. Scheduling a
//! timer for a new view supersedes the previous one. A timer that fires anyway for a view other than
//! `current_view` is stale and has no effect.

pub mod implementation;

pub mod types;

pub use implementation::{Pacemaker, PacemakerConfiguration, TimeoutScheduler};
