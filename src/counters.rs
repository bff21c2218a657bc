/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Monotonic counters that expose what the consensus core has done, for metrics exporters.

use std::sync::atomic::{AtomicU64, Ordering};

/// The kinds of counters kept by [`SystemCounters`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CounterType {
    /// Local timeouts that caused a view change.
    BftTimeout,
    BftProposalsMade,
    BftVotesSent,
    /// QCs formed from votes collected by this validator.
    BftVoteQuorums,
    BftVerticesCommitted,
    BftSyncRequests,
    /// Inputs rejected as invalid.
    BftRejected,
}

impl CounterType {
    const ALL: [CounterType; 7] = [
        CounterType::BftTimeout,
        CounterType::BftProposalsMade,
        CounterType::BftVotesSent,
        CounterType::BftVoteQuorums,
        CounterType::BftVerticesCommitted,
        CounterType::BftSyncRequests,
        CounterType::BftRejected,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Counters shared between the consensus thread and any number of readers.
#[derive(Debug, Default)]
pub struct SystemCounters {
    counters: [AtomicU64; CounterType::ALL.len()],
}

impl SystemCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, counter: CounterType) {
        self.add(counter, 1)
    }

    pub fn add(&self, counter: CounterType, amount: u64) {
        self.counters[counter.index()].fetch_add(amount, Ordering::Relaxed);
    }

    pub fn get(&self, counter: CounterType) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Read every counter.
    pub fn snapshot(&self) -> Vec<(CounterType, u64)> {
        CounterType::ALL
            .iter()
            .map(|counter| (*counter, self.get(*counter)))
            .collect()
    }
}
