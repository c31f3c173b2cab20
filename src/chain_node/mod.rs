/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run the node of one chain.
//!
//! A chain node replicates a chain whose state is anchored to a single-writer output (the "anchor
//! output") on an underlying base ledger. It follows the anchor outputs the base ledger confirms, runs
//! the consensus rounds its [chain manager](crate::chain_manager) asks for, publishes the transactions
//! those rounds decide, and keeps track of the resulting states so that clients can wait for their
//! requests to be processed.
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the chain node](ChainNodeSpec) with:
//!   1. `ChainNodeSpec::builder` to construct a `ChainNodeSpecBuilder`,
//!   2. The setters of the `ChainNodeSpecBuilder`, and
//!   3. The `ChainNodeSpecBuilder::build` method to construct a [ChainNodeSpec],
//! - The function to [start](ChainNodeSpec::start) a [ChainNode] given its specification,
//! - [The type](ChainNode) which keeps the chain node alive, takes in requests and peer-set updates, and
//!   answers queries about it.
//!
//! ## Threads
//!
//! All of a chain node's orchestration state (its [local view](crate::local_view), its
//! [state trackers](crate::state_tracker), its consensus instances and its in-flight publications) is
//! owned by a single reactor thread. Every collaborator reports back to the reactor by sending a message
//! into the reactor's inbox, never by touching the reactor's state. Events are handled by a separate
//! event bus thread.
//!
//! ## Starting a chain node
//!
//! ```ignore
//! let chain_node =
//!     ChainNodeSpec::builder()
//!     .node_conn(node_conn)
//!     .state_mgr(state_mgr)
//!     .mempool(mempool)
//!     .consensus(consensus_provider)
//!     .network(network)
//!     .chain_manager(DefaultChainManager::new(signing_key.clone(), chain_id, committee_registry))
//!     .configuration(configuration)
//!     .on_receive_anchor(receive_anchor_handler)
//!     .build()
//!     .start()?;
//! ```
//!
//! ### Required setters
//!
//! - `.node_conn(...)`
//! - `.state_mgr(...)`
//! - `.mempool(...)`
//! - `.consensus(...)`
//! - `.network(...)`
//! - `.chain_manager(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! The optional setters are for registering user-defined event handlers for events from [crate::events]:
//! - `.on_receive_anchor(...)`
//! - `.on_publish_tx(...)`
//! - `.on_tx_publish_result(...)`
//! - `.on_update_local_view(...)`
//! - `.on_start_consensus(...)`
//! - `.on_end_consensus(...)`
//! - `.on_consensus_recover(...)`
//! - `.on_update_committee(...)`
//! - `.on_update_access_nodes(...)`
//! - `.on_update_server_nodes(...)`
//! - `.on_track_state(...)`
//! - `.on_resolve_receipt(...)`
//!
//! The chain node's [configuration](Configuration) can also be defined using the builder pattern:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(signing_key)
//!     .chain_id(chain_id)
//!     .recovery_timeout(Duration::from_secs(60))
//!     .log_events(true)
//!     .build()
//! ```

pub(crate) mod consensus_insts;

pub(crate) mod reactor;

use std::{
    fmt::{self, Display, Formatter},
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, PoisonError, RwLock,
    },
    thread::JoinHandle,
    time::Duration,
};

use typed_builder::TypedBuilder;

use crate::{
    cancellation::CancellationToken,
    chain_manager::ChainManager,
    event_bus::*,
    events::*,
    networking::{
        messages::RECEIVER_CHAIN_MGR,
        network::{Network, NetworkError},
    },
    pluggables::{
        ChainMempool, ConsensusProvider, NodeConnection, OffLedgerRequest, StateManager,
        StateManagerError,
    },
    state_tracker::await_receipt::AwaitReceiptQuery,
    types::{
        anchor::AnchorOutput,
        block::RequestReceipt,
        committee::Committee,
        crypto_primitives::{CryptoHasher, Digest, SigningKey, VerifyingKey},
        data_types::{ChainID, CommitteeAddress, PeeringID, RequestID},
        state::StateHandle,
    },
};

use self::reactor::{ChainNodeInput, ChainNodeReactor};

/// Stores the user-defined parameters required to start a chain node.
///
/// ## Periods
///
/// `recovery_timeout`, `redelivery_period` and `print_status_period` are handed to every consensus
/// instance. The chain node itself also ticks its chain manager every `redelivery_period`, and logs its
/// status every `print_status_period`.
///
/// ## Log Events
///
/// This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(Clone, TypedBuilder)]
#[builder(builder_method(doc =
    "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`
    - `.chain_id(...)`

    Optional:
    - `.recovery_timeout(...)`
    - `.redelivery_period(...)`
    - `.print_status_period(...)`
    - `.consensus_insts_in_advance(...)`
    - `.await_receipt_cleanup_every(...)`
    - `.poll_interval(...)`
    - `.access_nodes(...)`
    - `.log_events(...)`
"
))]
pub struct Configuration {
    #[builder(setter(doc = "Set the node's keypair, used to sign messages and to take part in consensus. Required."))]
    pub me: SigningKey,
    #[builder(setter(doc = "Set the ID of the chain this node replicates. Required."))]
    pub chain_id: ChainID,
    #[builder(default = Duration::from_secs(15 * 60),
    setter(doc = "Set the time after which a consensus instance gives up and recovers. Defaults to 15 minutes."))]
    pub recovery_timeout: Duration,
    #[builder(default = Duration::from_secs(2),
    setter(doc = "Set the period with which messages are redelivered. Defaults to 2 seconds."))]
    pub redelivery_period: Duration,
    #[builder(default = Duration::from_secs(3),
    setter(doc = "Set the period with which status is logged. Defaults to 3 seconds."))]
    pub print_status_period: Duration,
    #[builder(default = 3,
    setter(doc = "Set the number of consecutive consensus instances kept running ahead of need. Defaults to 3."))]
    pub consensus_insts_in_advance: usize,
    #[builder(default = 100,
    setter(doc = "Set how many receipt queries are registered between two cleanups of abandoned queries. Defaults to 100."))]
    pub await_receipt_cleanup_every: usize,
    #[builder(default = Duration::from_millis(10),
    setter(doc = "Set the maximum time the reactor waits for input before servicing its trackers and timers. Defaults to 10 milliseconds."))]
    pub poll_interval: Duration,
    #[builder(default,
    setter(doc = "Set the nodes this node serves as an access node, as configured by its operator. Defaults to none."))]
    pub access_nodes: Vec<VerifyingKey>,
    #[builder(default = false, setter(doc = "Enable logging? Defaults to false."))]
    pub log_events: bool,
}

/// Stores all necessary parameters and trait implementations required to run a [ChainNode].
#[derive(TypedBuilder)]
#[builder(builder_method(doc =
    "
    Create a builder for building a [ChainNodeSpec]. On the builder call the following methods to construct a valid [ChainNodeSpec].

    Required:
    - `.node_conn(...)`
    - `.state_mgr(...)`
    - `.mempool(...)`
    - `.consensus(...)`
    - `.network(...)`
    - `.chain_manager(...)`
    - `.configuration(...)`

    Optional:
    - `.on_receive_anchor(...)`
    - `.on_publish_tx(...)`
    - `.on_tx_publish_result(...)`
    - `.on_update_local_view(...)`
    - `.on_start_consensus(...)`
    - `.on_end_consensus(...)`
    - `.on_consensus_recover(...)`
    - `.on_update_committee(...)`
    - `.on_update_access_nodes(...)`
    - `.on_update_server_nodes(...)`
    - `.on_track_state(...)`
    - `.on_resolve_receipt(...)`
"
))]
pub struct ChainNodeSpec<NC, SM, MP, CP, N, CM>
where
    NC: NodeConnection,
    SM: StateManager,
    MP: ChainMempool,
    CP: ConsensusProvider,
    N: Network,
    CM: ChainManager,
{
    // Required parameters
    #[builder(setter(doc = "Set the connector to the base ledger. Required."))]
    node_conn: NC,
    #[builder(setter(doc = "Set the state-replication subsystem. Required."))]
    state_mgr: SM,
    #[builder(setter(doc = "Set the pool of pending requests. Required."))]
    mempool: MP,
    #[builder(setter(doc = "Set the factory of consensus instances. Required."))]
    consensus: CP,
    #[builder(setter(doc = "Set the implementation of peer-to-peer networking. Required."))]
    network: N,
    #[builder(setter(doc = "Set the automaton deciding which consensus rounds to run. Required."))]
    chain_manager: CM,
    #[builder(setter(doc = "Set the [configuration](Configuration) of the chain node. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveAnchorEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveAnchorEvent>),
    doc = "Register a handler closure to be invoked after the base ledger reports a new anchor output. Optional."))]
    on_receive_anchor: Option<HandlerPtr<ReceiveAnchorEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PublishTxEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PublishTxEvent>),
    doc = "Register a handler closure to be invoked after the node starts publishing a transaction. Optional."))]
    on_publish_tx: Option<HandlerPtr<PublishTxEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&TxPublishResultEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<TxPublishResultEvent>),
    doc = "Register a handler closure to be invoked after the base ledger confirms or rejects a published transaction. Optional."))]
    on_tx_publish_result: Option<HandlerPtr<TxPublishResultEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateLocalViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateLocalViewEvent>),
    doc = "Register a handler closure to be invoked after the base anchor of the local view changes. Optional."))]
    on_update_local_view: Option<HandlerPtr<UpdateLocalViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartConsensusEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartConsensusEvent>),
    doc = "Register a handler closure to be invoked after a consensus instance is given its input. Optional."))]
    on_start_consensus: Option<HandlerPtr<StartConsensusEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EndConsensusEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EndConsensusEvent>),
    doc = "Register a handler closure to be invoked after a consensus instance decides. Optional."))]
    on_end_consensus: Option<HandlerPtr<EndConsensusEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ConsensusRecoverEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ConsensusRecoverEvent>),
    doc = "Register a handler closure to be invoked after a consensus instance times out. Optional."))]
    on_consensus_recover: Option<HandlerPtr<ConsensusRecoverEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateCommitteeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateCommitteeEvent>),
    doc = "Register a handler closure to be invoked after the members of the active committee change. Optional."))]
    on_update_committee: Option<HandlerPtr<UpdateCommitteeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateAccessNodesEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateAccessNodesEvent>),
    doc = "Register a handler closure to be invoked after the set of nodes this node serves changes. Optional."))]
    on_update_access_nodes: Option<HandlerPtr<UpdateAccessNodesEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateServerNodesEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateServerNodesEvent>),
    doc = "Register a handler closure to be invoked after the set of nodes serving this node changes. Optional."))]
    on_update_server_nodes: Option<HandlerPtr<UpdateServerNodesEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&TrackStateEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<TrackStateEvent>),
    doc = "Register a handler closure to be invoked after a state tracker learns a new state. Optional."))]
    on_track_state: Option<HandlerPtr<TrackStateEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ResolveReceiptEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ResolveReceiptEvent>),
    doc = "Register a handler closure to be invoked after receipt queries are answered. Optional."))]
    on_resolve_receipt: Option<HandlerPtr<ResolveReceiptEvent>>,
}

impl<NC, SM, MP, CP, N, CM> ChainNodeSpec<NC, SM, MP, CP, N, CM>
where
    NC: NodeConnection,
    SM: StateManager,
    MP: ChainMempool,
    CP: ConsensusProvider,
    N: Network,
    CM: ChainManager,
{
    /// Opens the chain with the state manager and the network, starts the reactor and event bus threads,
    /// and returns the handle to them in a [ChainNode].
    ///
    /// Fails if the state manager cannot open the chain or the network cannot open its peering domain.
    pub fn start(mut self) -> Result<ChainNode, ChainNodeError> {
        let chain_id = self.configuration.chain_id;
        let peering_id = chain_peering_id(&chain_id);

        self.state_mgr.open(chain_id, peering_id)?;

        let (to_inbox, inbox) = mpsc::channel();
        let to_inbox_from_network = to_inbox.clone();
        let attach_id = self.network.attach(
            &peering_id,
            RECEIVER_CHAIN_MGR,
            Box::new(move |msg| {
                let _ = to_inbox_from_network.send(ChainNodeInput::PeerMessage(msg));
            }),
        )?;

        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            self.on_receive_anchor,
            self.on_publish_tx,
            self.on_tx_publish_result,
            self.on_update_local_view,
            self.on_start_consensus,
            self.on_end_consensus,
            self.on_consensus_recover,
            self.on_update_committee,
            self.on_update_access_nodes,
            self.on_update_server_nodes,
            self.on_track_state,
            self.on_resolve_receipt,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let cancel = CancellationToken::new();
        let latest = Arc::new(RwLock::new(LatestState::default()));

        attach_chain(&mut self.node_conn, &cancel, chain_id, &to_inbox);

        let (reactor_shutdown, reactor_shutdown_receiver) = mpsc::channel();
        let reactor = ChainNodeReactor::new(
            &self.configuration,
            peering_id,
            cancel.clone(),
            self.node_conn,
            self.state_mgr,
            self.mempool,
            self.consensus,
            self.network,
            attach_id,
            self.chain_manager,
            to_inbox.clone(),
            latest.clone(),
            event_publisher,
        );
        let reactor = reactor.start(inbox, reactor_shutdown_receiver);

        let (event_bus_shutdown, event_bus_shutdown_receiver) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let event_bus = match (event_subscriber, event_bus_shutdown_receiver) {
            (Some(event_subscriber), Some(shutdown_receiver)) => {
                Some(start_event_bus(event_handlers, event_subscriber, shutdown_receiver))
            }
            _ => None,
        };

        Ok(ChainNode {
            chain_id,
            cancel,
            to_inbox,
            latest,
            reactor: Some(reactor),
            reactor_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }
}

/// Subscribe the reactor's inbox to the base-ledger events of `chain_id`.
fn attach_chain<NC: NodeConnection>(
    node_conn: &mut NC,
    cancel: &CancellationToken,
    chain_id: ChainID,
    to_inbox: &Sender<ChainNodeInput>,
) {
    let (to_inbox_requests, to_inbox_anchors, to_inbox_milestones) =
        (to_inbox.clone(), to_inbox.clone(), to_inbox.clone());
    node_conn.attach_chain(
        cancel.child(),
        chain_id,
        Box::new(move |request| {
            let _ = to_inbox_requests.send(ChainNodeInput::OnLedgerRequest(request));
        }),
        Box::new(move |anchors| {
            let _ = to_inbox_anchors.send(ChainNodeInput::AnchorOutputs(anchors));
        }),
        Box::new(move |time| {
            let _ = to_inbox_milestones.send(ChainNodeInput::Milestone(time));
        }),
    );
}

/// Get the ID of the peering group in which the nodes of `chain_id` exchange chain manager messages.
pub fn chain_peering_id(chain_id: &ChainID) -> PeeringID {
    let mut hasher = CryptoHasher::new();
    hasher.update(chain_id.bytes());
    hasher.update(b"ChainManager");
    PeeringID::new(hasher.finalize().into())
}

/// Error that prevents a chain node from starting.
#[derive(Debug)]
pub enum ChainNodeError {
    Network(NetworkError),
    StateManager(StateManagerError),
}

impl From<NetworkError> for ChainNodeError {
    fn from(value: NetworkError) -> Self {
        ChainNodeError::Network(value)
    }
}

impl From<StateManagerError> for ChainNodeError {
    fn from(value: StateManagerError) -> Self {
        ChainNodeError::StateManager(value)
    }
}

impl Display for ChainNodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ChainNodeError::Network(err) => write!(f, "cannot start chain node: {}", err),
            ChainNodeError::StateManager(err) => write!(f, "cannot start chain node: {}", err),
        }
    }
}

impl std::error::Error for ChainNodeError {}

/// Which state a query is answered from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateFreshness {
    /// The latest state consensus built on. May not be confirmed by the base ledger yet.
    Active,
    /// The latest state confirmed by the base ledger.
    Confirmed,
}

/// The latest anchors and states known to the reactor, shared with the [ChainNode] handle.
#[derive(Default)]
pub(crate) struct LatestState {
    pub(crate) confirmed_anchor: Option<AnchorOutput>,
    pub(crate) confirmed_state: Option<StateHandle>,
    pub(crate) active_anchor: Option<AnchorOutput>,
    pub(crate) active_state: Option<StateHandle>,
    pub(crate) committee: Option<Committee>,
    pub(crate) access_nodes: Vec<VerifyingKey>,
    pub(crate) server_nodes: Vec<VerifyingKey>,
}

pub(crate) fn update_latest(latest: &RwLock<LatestState>, update: impl FnOnce(&mut LatestState)) {
    let mut latest = latest.write().unwrap_or_else(PoisonError::into_inner);
    update(&mut latest)
}

/// A handle to the background threads of a chain node. When this value is dropped, every consensus
/// instance, publication, and state fetch of the chain is cancelled, and all background threads are
/// gracefully shut down.
pub struct ChainNode {
    chain_id: ChainID,
    cancel: CancellationToken,
    to_inbox: Sender<ChainNodeInput>,
    latest: Arc<RwLock<LatestState>>,
    reactor: Option<JoinHandle<()>>,
    reactor_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl ChainNode {
    pub fn chain_id(&self) -> ChainID {
        self.chain_id
    }

    /// Wait for the receipt of `request_id` in the confirmed state (if `confirmed`) or in the active state.
    ///
    /// The returned receiver yields the receipt once it is known, and disconnects right after. If
    /// `cancel` is cancelled or the chain node stops first, it disconnects without yielding anything.
    pub fn await_request_processed(
        &self,
        cancel: &CancellationToken,
        request_id: RequestID,
        confirmed: bool,
    ) -> Receiver<RequestReceipt> {
        let (responder, receiver) = mpsc::channel();
        let query = AwaitReceiptQuery {
            cancel: cancel.clone(),
            request_id,
            responder,
        };
        let _ = self
            .to_inbox
            .send(ChainNodeInput::AwaitReceipt { query, confirmed });
        receiver
    }

    /// Hand a request a client sent to this node over to the mempool.
    pub fn receive_off_ledger_request(&self, request: OffLedgerRequest) {
        let _ = self
            .to_inbox
            .send(ChainNodeInput::OffLedgerRequest(request));
    }

    /// Replace the access nodes configured by the node operator. The nodes this node actually serves
    /// also include the ones authorized by the chain's governance and the committee members.
    pub fn access_nodes_updated(&self, access_nodes: Vec<VerifyingKey>) {
        let _ = self
            .to_inbox
            .send(ChainNodeInput::AccessNodesConfigured(access_nodes));
    }

    /// Replace the set of nodes that accept this node as an access node.
    pub fn servers_updated(&self, server_nodes: Vec<VerifyingKey>) {
        let _ = self
            .to_inbox
            .send(ChainNodeInput::ServersUpdated(server_nodes));
    }

    /// Ask the committee to rotate the chain to the committee at `address`. `None` withdraws the request.
    pub fn rotate_to(&self, address: Option<CommitteeAddress>) {
        let _ = self.to_inbox.send(ChainNodeInput::RotateTo(address));
    }

    /// Get the latest anchor output of the given `freshness`.
    pub fn latest_anchor(&self, freshness: StateFreshness) -> Option<AnchorOutput> {
        let latest = self.latest.read().unwrap_or_else(PoisonError::into_inner);
        match freshness {
            StateFreshness::Active => latest.active_anchor.clone(),
            StateFreshness::Confirmed => latest.confirmed_anchor.clone(),
        }
    }

    /// Get the latest state of the given `freshness`.
    pub fn latest_state(&self, freshness: StateFreshness) -> Option<StateHandle> {
        let latest = self.latest.read().unwrap_or_else(PoisonError::into_inner);
        match freshness {
            StateFreshness::Active => latest.active_state.clone(),
            StateFreshness::Confirmed => latest.confirmed_state.clone(),
        }
    }

    /// Get the committee this node currently runs consensus with, if any.
    pub fn committee(&self) -> Option<Committee> {
        let latest = self.latest.read().unwrap_or_else(PoisonError::into_inner);
        latest.committee.clone()
    }

    /// Get the nodes this node serves: itself, the operator's and the governance's access nodes, and the
    /// committee members.
    pub fn access_nodes(&self) -> Vec<VerifyingKey> {
        let latest = self.latest.read().unwrap_or_else(PoisonError::into_inner);
        latest.access_nodes.clone()
    }

    pub fn server_nodes(&self) -> Vec<VerifyingKey> {
        let latest = self.latest.read().unwrap_or_else(PoisonError::into_inner);
        latest.server_nodes.clone()
    }

    /// Get the members of the committee this node currently runs consensus with.
    pub fn committee_nodes(&self) -> Vec<VerifyingKey> {
        self.committee()
            .map(|committee| committee.members)
            .unwrap_or_default()
    }
}

impl Drop for ChainNode {
    fn drop(&mut self) {
        self.cancel.cancel();

        self.event_bus_shutdown.iter().for_each(|shutdown| {
            let _ = shutdown.send(());
        });
        if let Some(event_bus) = self.event_bus.take() {
            event_bus.join().unwrap();
        }

        let _ = self.reactor_shutdown.send(());
        if let Some(reactor) = self.reactor.take() {
            reactor.join().unwrap();
        }
    }
}
