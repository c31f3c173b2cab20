/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Inputs and outputs of the [chain manager](super::ChainManager) automaton.

use std::{collections::BTreeMap, time::SystemTime};

use crate::types::{
    anchor::AnchorOutput,
    committee::Committee,
    crypto_primitives::VerifyingKey,
    data_types::{CommitteeAddress, LogIndex, OutputID, TransactionID},
    transaction::Transaction,
};

use super::messages::ChainMgrMessage;

/// Everything that happens to a chain node, as seen by its chain manager.
#[derive(Clone, Debug)]
pub enum ChainMgrInput {
    /// The base ledger confirmed `anchor` as the chain's current anchor output.
    AnchorConfirmed { anchor: AnchorOutput },

    /// The base anchor of the node's [local view](crate::local_view::LocalView) changed. `None` means
    /// "do not build on anything for now".
    LocalViewUpdated { base: Option<AnchorOutput> },

    /// The consensus instance `(committee, log_index)` agreed on `transaction`, built on `base_anchor`.
    ConsensusOutputDone {
        committee: CommitteeAddress,
        log_index: LogIndex,
        base_anchor: OutputID,
        transaction: Transaction,
    },

    /// The consensus instance `(committee, log_index)` produced nothing.
    ConsensusOutputSkipped {
        committee: CommitteeAddress,
        log_index: LogIndex,
    },

    /// The consensus instance `(committee, log_index)` timed out and went into recovery.
    ConsensusTimeout {
        committee: CommitteeAddress,
        log_index: LogIndex,
    },

    /// The base ledger confirmed or rejected the transaction `tx_id`, which produces `next_anchor`.
    TxPublishResult {
        tx_id: TransactionID,
        next_anchor: AnchorOutput,
        confirmed: bool,
    },

    /// Periodic clock tick, used to redeliver messages.
    Tick { now: SystemTime },
}

/// Request to run the consensus instance `(committee, log_index)` on `base_anchor`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeedConsensus {
    pub committee: Committee,
    pub log_index: LogIndex,
    pub base_anchor: AnchorOutput,
}

/// Request to post `tx`, decided by the consensus instance `(committee, log_index)`, to the base ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeedPublishTx {
    pub committee: CommitteeAddress,
    pub log_index: LogIndex,
    pub tx_id: TransactionID,
    pub tx: Transaction,
    pub base_anchor: OutputID,
    pub next_anchor: AnchorOutput,
}

/// What the chain manager wants the chain node to be doing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainMgrOutput {
    pub need_consensus: Option<NeedConsensus>,
    pub need_publish_tx: BTreeMap<TransactionID, NeedPublishTx>,
}

/// A message the chain manager wants delivered to `recipient`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutMessage {
    pub recipient: VerifyingKey,
    pub message: ChainMgrMessage,
}
