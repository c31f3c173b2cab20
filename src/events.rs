/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Events that a chain node emits as it orchestrates its chain.
//!
//! An event for a given action indicates that the action has been completed. Handlers for events can
//! be registered through the `on_*` setters of [`ChainNodeSpec`](crate::chain_node::ChainNodeSpec), and
//! are run on a dedicated event bus thread. The [`logging`](crate::logging) module defines the default
//! handlers, which log every event.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::{
    state_tracker::StateTrackerKind,
    types::{
        anchor::AnchorOutput,
        crypto_primitives::VerifyingKey,
        data_types::{CommitteeAddress, LogIndex, OutputID, StateIndex, TransactionID},
    },
};

pub enum Event {
    // Events about the base ledger.
    ReceiveAnchor(ReceiveAnchorEvent),
    PublishTx(PublishTxEvent),
    TxPublishResult(TxPublishResultEvent),
    // Events about consensus.
    UpdateLocalView(UpdateLocalViewEvent),
    StartConsensus(StartConsensusEvent),
    EndConsensus(EndConsensusEvent),
    ConsensusRecover(ConsensusRecoverEvent),
    UpdateCommittee(UpdateCommitteeEvent),
    // Events about peers.
    UpdateAccessNodes(UpdateAccessNodesEvent),
    UpdateServerNodes(UpdateServerNodesEvent),
    // Events about state.
    TrackState(TrackStateEvent),
    ResolveReceipt(ResolveReceiptEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            // The event bus may already be shut down.
            let _ = event_publisher.send(event);
        }
    }
}

/// The base ledger reported `anchor` as the chain's unspent anchor output.
pub struct ReceiveAnchorEvent {
    pub timestamp: SystemTime,
    pub anchor: AnchorOutput,
}

/// The chain node started publishing the transaction `tx_id`, which produces `next_anchor`.
pub struct PublishTxEvent {
    pub timestamp: SystemTime,
    pub tx_id: TransactionID,
    pub next_anchor: OutputID,
}

pub struct TxPublishResultEvent {
    pub timestamp: SystemTime,
    pub tx_id: TransactionID,
    pub confirmed: bool,
}

/// The base anchor of the local view changed.
pub struct UpdateLocalViewEvent {
    pub timestamp: SystemTime,
    pub base: Option<AnchorOutput>,
}

/// The consensus instance `(committee, log_index)` was given its input.
pub struct StartConsensusEvent {
    pub timestamp: SystemTime,
    pub committee: CommitteeAddress,
    pub log_index: LogIndex,
    pub base_anchor: OutputID,
}

/// The consensus instance `(committee, log_index)` decided. `transaction` is `None` if the round was
/// skipped.
pub struct EndConsensusEvent {
    pub timestamp: SystemTime,
    pub committee: CommitteeAddress,
    pub log_index: LogIndex,
    pub transaction: Option<TransactionID>,
}

pub struct ConsensusRecoverEvent {
    pub timestamp: SystemTime,
    pub committee: CommitteeAddress,
    pub log_index: LogIndex,
}

/// The members of the active committee changed.
pub struct UpdateCommitteeEvent {
    pub timestamp: SystemTime,
    pub committee: CommitteeAddress,
    pub members: Vec<VerifyingKey>,
}

/// The set of nodes this node serves as an access node changed.
pub struct UpdateAccessNodesEvent {
    pub timestamp: SystemTime,
    pub access_nodes: Vec<VerifyingKey>,
}

/// The set of nodes that serve this node changed.
pub struct UpdateServerNodesEvent {
    pub timestamp: SystemTime,
    pub server_nodes: Vec<VerifyingKey>,
}

/// A state tracker learned the state at `till`.
pub struct TrackStateEvent {
    pub timestamp: SystemTime,
    pub tracker: StateTrackerKind,
    pub from: Option<OutputID>,
    pub till: OutputID,
    pub state_index: StateIndex,
    pub added: usize,
    pub removed: usize,
}

/// `count` receipt queries registered with a state tracker were answered.
pub struct ResolveReceiptEvent {
    pub timestamp: SystemTime,
    pub tracker: StateTrackerKind,
    pub count: usize,
}
