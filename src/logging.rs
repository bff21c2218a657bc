/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the replica's
//! [config](crate::replica::Configuration).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceiveProposal](crate::events::ReceiveProposalEvent) is printed:
//!
//! ```text
//! ReceiveProposal, 1701329264, Id5u7f6, fNGCJyk, 12
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the public key of the
//!   origin of the proposal.
//! - The fourth value is the first seven characters of the Base64 encoding of the id of the proposed
//!   vertex.
//! - The fifth value is the view of the proposed vertex.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use std::time::SystemTime;

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const INSERT_VERTEX: &str = "InsertVertex";
pub const COMMIT_VERTEX: &str = "CommitVertex";
pub const PRUNE_VERTEX: &str = "PruneVertex";
pub const UPDATE_HIGHEST_QC: &str = "UpdateHighestQC";
pub const UPDATE_LOCKED_VIEW: &str = "UpdateLockedView";

pub const PROPOSE: &str = "Propose";
pub const VOTE: &str = "Vote";
pub const NEW_VIEW: &str = "NewView";

pub const RECEIVE_PROPOSAL: &str = "ReceiveProposal";
pub const RECEIVE_VOTE: &str = "ReceiveVote";
pub const RECEIVE_NEW_VIEW: &str = "ReceiveNewView";

pub const START_VIEW: &str = "StartView";
pub const VIEW_TIMEOUT: &str = "ViewTimeout";
pub const COLLECT_QC: &str = "CollectQC";

pub const START_SYNC: &str = "StartSync";
pub const END_SYNC: &str = "EndSync";

pub(crate) trait Logger {
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for InsertVertexEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |insert_vertex_event: &InsertVertexEvent| {
            log::info!(
                "{}, {}, {}, {}",
                INSERT_VERTEX,
                secs_since_unix_epoch(insert_vertex_event.timestamp),
                first_seven_base64_chars(&insert_vertex_event.header.vertex_id.bytes()),
                insert_vertex_event.header.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitVertexEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_vertex_event: &CommitVertexEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COMMIT_VERTEX,
                secs_since_unix_epoch(commit_vertex_event.timestamp),
                first_seven_base64_chars(&commit_vertex_event.header.vertex_id.bytes()),
                commit_vertex_event.header.view,
                commit_vertex_event.header.ledger.state_version.int()
            )
        };
        Box::new(logger)
    }
}

impl Logger for PruneVertexEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |prune_vertex_event: &PruneVertexEvent| {
            log::info!(
                "{}, {}, {}",
                PRUNE_VERTEX,
                secs_since_unix_epoch(prune_vertex_event.timestamp),
                first_seven_base64_chars(&prune_vertex_event.vertex_id.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateHighestQCEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_highest_qc_event: &UpdateHighestQCEvent| {
            log::info!(
                "{}, {}, {}, {}",
                UPDATE_HIGHEST_QC,
                secs_since_unix_epoch(update_highest_qc_event.timestamp),
                first_seven_base64_chars(
                    &update_highest_qc_event.highest_qc.proposed().vertex_id.bytes()
                ),
                update_highest_qc_event.highest_qc.view()
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateLockedViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_locked_view_event: &UpdateLockedViewEvent| {
            log::info!(
                "{}, {}, {}",
                UPDATE_LOCKED_VIEW,
                secs_since_unix_epoch(update_locked_view_event.timestamp),
                update_locked_view_event.locked_view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ProposeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propose_event: &ProposeEvent| {
            log::info!(
                "{}, {}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(propose_event.timestamp),
                first_seven_base64_chars(&propose_event.proposal.vertex.id().bytes()),
                propose_event.proposal.view()
            )
        };
        Box::new(logger)
    }
}

impl Logger for VoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |vote_event: &VoteEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                VOTE,
                secs_since_unix_epoch(vote_event.timestamp),
                first_seven_base64_chars(&vote_event.vote.vote_data.proposed.vertex_id.bytes()),
                vote_event.vote.view(),
                vote_event.vote.vote_data.committed.is_some()
            )
        };
        Box::new(logger)
    }
}

impl Logger for NewViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |new_view_event: &NewViewEvent| {
            log::info!(
                "{}, {}, {}, {}",
                NEW_VIEW,
                secs_since_unix_epoch(new_view_event.timestamp),
                new_view_event.new_view.view,
                new_view_event.new_view.highest_qc.view()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_proposal_event: &ReceiveProposalEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_PROPOSAL,
                secs_since_unix_epoch(receive_proposal_event.timestamp),
                first_seven_base64_chars(&receive_proposal_event.origin.to_bytes()),
                first_seven_base64_chars(&receive_proposal_event.proposal.vertex.id().bytes()),
                receive_proposal_event.proposal.view()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveVoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_vote_event: &ReceiveVoteEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_VOTE,
                secs_since_unix_epoch(receive_vote_event.timestamp),
                first_seven_base64_chars(&receive_vote_event.origin.to_bytes()),
                first_seven_base64_chars(
                    &receive_vote_event.vote.vote_data.proposed.vertex_id.bytes()
                ),
                receive_vote_event.vote.view()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveNewViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_new_view_event: &ReceiveNewViewEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_NEW_VIEW,
                secs_since_unix_epoch(receive_new_view_event.timestamp),
                first_seven_base64_chars(&receive_new_view_event.origin.to_bytes()),
                receive_new_view_event.new_view.view,
                receive_new_view_event.new_view.highest_qc.view()
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_view_event: &StartViewEvent| {
            log::info!(
                "{}, {}, {}, {}",
                START_VIEW,
                secs_since_unix_epoch(start_view_event.timestamp),
                start_view_event.view,
                first_seven_base64_chars(&start_view_event.leader.to_bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ViewTimeoutEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |view_timeout_event: &ViewTimeoutEvent| {
            log::info!(
                "{}, {}, {}",
                VIEW_TIMEOUT,
                secs_since_unix_epoch(view_timeout_event.timestamp),
                view_timeout_event.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for CollectQCEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |collect_qc_event: &CollectQCEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COLLECT_QC,
                secs_since_unix_epoch(collect_qc_event.timestamp),
                first_seven_base64_chars(
                    &collect_qc_event.quorum_certificate.proposed().vertex_id.bytes()
                ),
                collect_qc_event.quorum_certificate.view(),
                collect_qc_event.quorum_certificate.signatures.count()
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_sync_event: &StartSyncEvent| {
            log::info!(
                "{}, {}, {}, {}",
                START_SYNC,
                secs_since_unix_epoch(start_sync_event.timestamp),
                first_seven_base64_chars(&start_sync_event.vertex_id.bytes()),
                start_sync_event.peers.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for EndSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |end_sync_event: &EndSyncEvent| {
            log::info!(
                "{}, {}, {}, {}",
                END_SYNC,
                secs_since_unix_epoch(end_sync_event.timestamp),
                first_seven_base64_chars(&end_sync_event.vertex_id.bytes()),
                end_sync_event.vertices_inserted
            )
        };
        Box::new(logger)
    }
}

pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
