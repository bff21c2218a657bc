/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable peer-to-peer networking, and the outbound handles the consensus core uses on top of it.
//!
//! Transport and wire encoding are entirely the concern of the [`Network`] implementation. The core only
//! hands it typed [`BFTMessage`](crate::messages::BFTMessage)s and fetch requests.

pub mod network;

pub(crate) mod sending;

pub use network::{Network, VertexFetcher, VertexSyncRequest};
