/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for the collaborators a chain node is built from.
//!
//! A [chain node](crate::chain_node) only orchestrates. Everything it orchestrates is provided by the
//! library user through the traits in this module:
//! - [`NodeConnection`]: the connector to the base ledger.
//! - [`StateManager`]: the state-replication subsystem, which computes state diffs between anchors.
//! - [`ChainMempool`]: the pool of pending requests.
//! - [`ConsensusProvider`]: the factory of BFT [consensus instances](ConsensusInstance).
//! - [`CommitteeRegistry`]: the source of committee membership.
//!
//! Every method in these traits must return without blocking. Results of long-running work are
//! delivered through callbacks or channels, and every piece of long-running work is started with a
//! [`CancellationToken`] that the implementation should poll.

use std::{
    fmt::{self, Display, Formatter},
    sync::mpsc::Receiver,
    time::{Duration, SystemTime},
};

use crate::{
    cancellation::CancellationToken,
    types::{
        anchor::AnchorOutput,
        block::Block,
        committee::Committee,
        crypto_primitives::{SigningKey, VerifyingKey},
        data_types::{ChainID, CommitteeAddress, LogIndex, OutputID, PeeringID, RequestID},
        state::StateHandle,
        transaction::Transaction,
    },
};

/// A request that was posted to the base ledger, as opposed to being sent to a node directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnLedgerRequest {
    pub request_id: RequestID,
    pub output_id: OutputID,
    pub payload: Vec<u8>,
}

/// A request sent to a node directly, rather than posted to the base ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OffLedgerRequest {
    pub request_id: RequestID,
    /// The key of the account that signed the request.
    pub sender: VerifyingKey,
    pub payload: Vec<u8>,
}

/// Invoked exactly once with the published transaction and whether the base ledger confirmed it.
pub type TxPublishedCallback = Box<dyn FnOnce(Transaction, bool) + Send>;

pub type OnLedgerRequestHandler = Box<dyn Fn(OnLedgerRequest) + Send>;

/// Invoked with a batch of anchor outputs in ledger order. The last one in a batch is the currently
/// unspent one.
pub type AnchorOutputsHandler = Box<dyn Fn(Vec<AnchorOutput>) + Send>;

pub type MilestoneHandler = Box<dyn Fn(SystemTime) + Send>;

pub trait NodeConnection: Send + 'static {
    /// Post `tx` to the base ledger. `callback` must be invoked exactly once, unless `cancel` is
    /// cancelled first.
    fn publish_tx(
        &mut self,
        cancel: CancellationToken,
        chain_id: ChainID,
        tx: Transaction,
        callback: TxPublishedCallback,
    );

    /// Subscribe to the base-ledger events of `chain_id` until `cancel` is cancelled.
    fn attach_chain(
        &mut self,
        cancel: CancellationToken,
        chain_id: ChainID,
        on_request: OnLedgerRequestHandler,
        on_anchor_outputs: AnchorOutputsHandler,
        on_milestone: MilestoneHandler,
    );
}

/// The blocks added and removed when moving from one anchor's state to another's, together with the
/// resulting state.
pub struct StateDiff {
    pub state: StateHandle,
    pub added: Vec<Block>,
    pub removed: Vec<Block>,
}

pub trait StateManager: Clone + Send + 'static {
    /// Prepare the state manager for serving `chain_id`. An error prevents the chain from starting.
    fn open(&mut self, chain_id: ChainID, peering_id: PeeringID) -> Result<(), StateManagerError>;

    /// Compute the state diff from `from` (or from the beginning of the chain if `None`) to `to`.
    ///
    /// The result is sent exactly once on the returned channel. If `cancel` is cancelled first, the
    /// implementation drops the sender without sending anything.
    fn fetch_state_diff(
        &mut self,
        cancel: CancellationToken,
        from: Option<AnchorOutput>,
        to: AnchorOutput,
    ) -> Receiver<StateDiff>;

    /// Inform the state manager of the nodes it may synchronize blocks with: the nodes that serve this
    /// node, the nodes this node serves, and the members of the active committee.
    fn chain_nodes_updated(
        &mut self,
        server_nodes: Vec<VerifyingKey>,
        access_nodes: Vec<VerifyingKey>,
        committee_nodes: Vec<VerifyingKey>,
    );
}

/// Error returned by a [`StateManager`] that cannot open a chain.
#[derive(Debug)]
pub enum StateManagerError {
    StoreUnavailable(String),
    AlreadyOpen(ChainID),
}

impl Display for StateManagerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StateManagerError::StoreUnavailable(reason) => {
                write!(f, "chain store unavailable: {}", reason)
            }
            StateManagerError::AlreadyOpen(chain_id) => {
                write!(f, "chain {} is already open", chain_id)
            }
        }
    }
}

pub trait ChainMempool: Clone + Send + 'static {
    fn receive_on_ledger_request(&mut self, request: OnLedgerRequest);

    /// Admit a request a client sent to this node. Validating it is up to the mempool.
    fn receive_off_ledger_request(&mut self, request: OffLedgerRequest);

    /// Called every time the active state moves from `from` to `till`, so that requests processed in
    /// `added` blocks can be evicted and requests of `removed` blocks re-admitted.
    fn track_new_chain_head(
        &mut self,
        state: StateHandle,
        from: Option<AnchorOutput>,
        till: AnchorOutput,
        added: &[Block],
        removed: &[Block],
    );

    /// Called when the active committee or the set of access nodes this node serves changes.
    fn access_nodes_updated(
        &mut self,
        committee_nodes: Vec<VerifyingKey>,
        access_nodes: Vec<VerifyingKey>,
    );

    /// Called when the set of nodes that serve this node changes.
    fn server_nodes_updated(
        &mut self,
        committee_nodes: Vec<VerifyingKey>,
        server_nodes: Vec<VerifyingKey>,
    );

    fn time_updated(&mut self, time: SystemTime);
}

/// What a consensus instance decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsensusOutput {
    /// The committee agreed on `transaction`, which consumes the instance's base anchor.
    Done { transaction: Transaction },
    /// The round produced nothing.
    Skipped,
}

pub type ConsensusOutputCallback = Box<dyn FnOnce(ConsensusOutput) + Send>;

pub type ConsensusRecoverCallback = Box<dyn FnOnce() + Send>;

/// Parameters a [`ConsensusProvider`] builds a new instance with.
#[derive(Clone)]
pub struct ConsensusParams {
    /// Cancelled when the instance is garbage-collected or the chain stops.
    pub cancel: CancellationToken,
    pub chain_id: ChainID,
    pub committee: Committee,
    pub log_index: LogIndex,
    pub me: SigningKey,
    pub recovery_timeout: Duration,
    pub redelivery_period: Duration,
    pub print_status_period: Duration,
    /// The committee the node operator wants the chain rotated to, if any.
    pub rotate_to: Option<CommitteeAddress>,
}

pub trait ConsensusInstance: Send + 'static {
    /// Start agreeing on a transaction consuming `base_anchor`. Called at most once per instance.
    ///
    /// Exactly one of `on_output` and `on_recover` is eventually invoked, unless the instance is
    /// cancelled.
    fn input(
        &mut self,
        base_anchor: AnchorOutput,
        on_output: ConsensusOutputCallback,
        on_recover: ConsensusRecoverCallback,
    );

    /// Inform the instance of the latest base-ledger time.
    fn time(&mut self, now: SystemTime);

    /// Suggest rotating the chain to the committee at `address`, or withdraw the suggestion if `None`.
    fn rotate_to(&mut self, address: Option<CommitteeAddress>);
}

pub trait ConsensusProvider: Send + 'static {
    type Instance: ConsensusInstance;

    fn new_instance(&mut self, params: ConsensusParams) -> Self::Instance;
}

/// Source of committee membership, backed by the node's distributed key shares.
pub trait CommitteeRegistry: Send + 'static {
    /// Get the committee at `address`, if this node knows it.
    fn committee(&self, address: &CommitteeAddress) -> Option<Committee>;
}
