/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the chain node's
//! [config](crate::chain_node::Configuration).
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
//! is how a [StartConsensus](crate::events::StartConsensusEvent) is printed:
//!
//! ```text
//! StartConsensus, 1701329264, AQEBAQE, 12, fNGCJyk
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the committee address.
//! - The fourth value is the log index.
//! - The fifth value is the first seven characters of the Base64 encoding of the base anchor's output ID.

use crate::events::*;
use crate::types::crypto_primitives::VerifyingKey;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use log;
use std::time::SystemTime;

// Names of each event in PascalCase for printing:
pub const RECEIVE_ANCHOR: &str = "ReceiveAnchor";
pub const PUBLISH_TX: &str = "PublishTx";
pub const TX_PUBLISH_RESULT: &str = "TxPublishResult";

pub const UPDATE_LOCAL_VIEW: &str = "UpdateLocalView";
pub const START_CONSENSUS: &str = "StartConsensus";
pub const END_CONSENSUS: &str = "EndConsensus";
pub const CONSENSUS_RECOVER: &str = "ConsensusRecover";
pub const UPDATE_COMMITTEE: &str = "UpdateCommittee";

pub const UPDATE_ACCESS_NODES: &str = "UpdateAccessNodes";
pub const UPDATE_SERVER_NODES: &str = "UpdateServerNodes";

pub const TRACK_STATE: &str = "TrackState";
pub const RESOLVE_RECEIPT: &str = "ResolveReceipt";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for ReceiveAnchorEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_anchor_event: &ReceiveAnchorEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_ANCHOR,
                secs_since_unix_epoch(receive_anchor_event.timestamp),
                first_seven_base64_chars(&receive_anchor_event.anchor.output_id.bytes()),
                receive_anchor_event.anchor.state_index,
                first_seven_base64_chars(&receive_anchor_event.anchor.state_controller.bytes()),
            )
        };
        Box::new(logger)
    }
}

impl Logger for PublishTxEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |publish_tx_event: &PublishTxEvent| {
            log::info!(
                "{}, {}, {}, {}",
                PUBLISH_TX,
                secs_since_unix_epoch(publish_tx_event.timestamp),
                first_seven_base64_chars(&publish_tx_event.tx_id.bytes()),
                first_seven_base64_chars(&publish_tx_event.next_anchor.bytes()),
            )
        };
        Box::new(logger)
    }
}

impl Logger for TxPublishResultEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |tx_publish_result_event: &TxPublishResultEvent| {
            log::info!(
                "{}, {}, {}, {}",
                TX_PUBLISH_RESULT,
                secs_since_unix_epoch(tx_publish_result_event.timestamp),
                first_seven_base64_chars(&tx_publish_result_event.tx_id.bytes()),
                if tx_publish_result_event.confirmed { "confirmed" } else { "rejected" },
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateLocalViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_local_view_event: &UpdateLocalViewEvent| {
            let base = match &update_local_view_event.base {
                Some(base) => first_seven_base64_chars(&base.output_id.bytes()),
                None => String::from("none"),
            };
            log::info!(
                "{}, {}, {}",
                UPDATE_LOCAL_VIEW,
                secs_since_unix_epoch(update_local_view_event.timestamp),
                base,
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartConsensusEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_consensus_event: &StartConsensusEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                START_CONSENSUS,
                secs_since_unix_epoch(start_consensus_event.timestamp),
                first_seven_base64_chars(&start_consensus_event.committee.bytes()),
                start_consensus_event.log_index,
                first_seven_base64_chars(&start_consensus_event.base_anchor.bytes()),
            )
        };
        Box::new(logger)
    }
}

impl Logger for EndConsensusEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |end_consensus_event: &EndConsensusEvent| {
            let transaction = match &end_consensus_event.transaction {
                Some(tx_id) => first_seven_base64_chars(&tx_id.bytes()),
                None => String::from("skipped"),
            };
            log::info!(
                "{}, {}, {}, {}, {}",
                END_CONSENSUS,
                secs_since_unix_epoch(end_consensus_event.timestamp),
                first_seven_base64_chars(&end_consensus_event.committee.bytes()),
                end_consensus_event.log_index,
                transaction,
            )
        };
        Box::new(logger)
    }
}

impl Logger for ConsensusRecoverEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |consensus_recover_event: &ConsensusRecoverEvent| {
            log::info!(
                "{}, {}, {}, {}",
                CONSENSUS_RECOVER,
                secs_since_unix_epoch(consensus_recover_event.timestamp),
                first_seven_base64_chars(&consensus_recover_event.committee.bytes()),
                consensus_recover_event.log_index,
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateCommitteeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_committee_event: &UpdateCommitteeEvent| {
            log::info!(
                "{}, {}, {}, [{}]",
                UPDATE_COMMITTEE,
                secs_since_unix_epoch(update_committee_event.timestamp),
                first_seven_base64_chars(&update_committee_event.committee.bytes()),
                short_keys(&update_committee_event.members),
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateAccessNodesEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_access_nodes_event: &UpdateAccessNodesEvent| {
            log::info!(
                "{}, {}, [{}]",
                UPDATE_ACCESS_NODES,
                secs_since_unix_epoch(update_access_nodes_event.timestamp),
                short_keys(&update_access_nodes_event.access_nodes),
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateServerNodesEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_server_nodes_event: &UpdateServerNodesEvent| {
            log::info!(
                "{}, {}, [{}]",
                UPDATE_SERVER_NODES,
                secs_since_unix_epoch(update_server_nodes_event.timestamp),
                short_keys(&update_server_nodes_event.server_nodes),
            )
        };
        Box::new(logger)
    }
}

impl Logger for TrackStateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |track_state_event: &TrackStateEvent| {
            let from = match &track_state_event.from {
                Some(from) => first_seven_base64_chars(&from.bytes()),
                None => String::from("none"),
            };
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}, {}",
                TRACK_STATE,
                secs_since_unix_epoch(track_state_event.timestamp),
                track_state_event.tracker,
                from,
                first_seven_base64_chars(&track_state_event.till.bytes()),
                track_state_event.state_index,
                track_state_event.added,
                track_state_event.removed,
            )
        };
        Box::new(logger)
    }
}

impl Logger for ResolveReceiptEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |resolve_receipt_event: &ResolveReceiptEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RESOLVE_RECEIPT,
                secs_since_unix_epoch(resolve_receipt_event.timestamp),
                resolve_receipt_event.tracker,
                resolve_receipt_event.count,
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

// Abbreviate every key, space-separated.
fn short_keys(keys: &[VerifyingKey]) -> String {
    let keys: Vec<String> = keys
        .iter()
        .map(|key| first_seven_base64_chars(&key.to_bytes()))
        .collect();
    keys.join(" ")
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Event occured before the Unix Epoch.")
        .as_secs()
}
