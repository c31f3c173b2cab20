/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The reactor thread, which owns and drives all orchestration state of a chain node.
//!
//! The reactor waits on its inbox for [inputs](ChainNodeInput). Between inputs, at most every
//! `poll_interval`, it checks whether its state trackers' fetches completed, ticks its chain manager
//! every `redelivery_period`, and logs its status every `print_status_period`.
//!
//! After every input that reaches the chain manager, the reactor re-reads the chain manager's output and
//! makes the world match it:
//! 1. If consensus is needed at `(committee, log_index)`, the instance is made to exist (together with
//!    the instances ahead of it) and is given its input once.
//! 2. Exactly the transactions the chain manager wants published are being published. Publications
//!    that are no longer wanted are cancelled.
//! 3. If the chain manager has no output, every instance that was not given input and every
//!    publication is cancelled.
//!
//! The reactor also keeps the peer sets of the chain. The nodes it serves (its "access nodes") are the
//! union of itself, the access nodes configured by its operator, the access nodes authorized by the
//! governance of the active and of the confirmed state, and the members of the active committee. The
//! nodes that serve it are set from outside. The mempool and the state manager are told whenever
//! either set or the committee changes.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc, RwLock,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime},
};

use borsh::BorshDeserialize;

use crate::{
    cancellation::CancellationToken,
    chain_manager::{
        messages::ChainMgrMessage,
        types::{ChainMgrInput, NeedConsensus, NeedPublishTx},
        ChainManager,
    },
    events::*,
    local_view::LocalView,
    networking::{
        messages::{PeerMessageIn, RECEIVER_CHAIN_MGR},
        network::{AttachID, Network},
        sending::SenderHandle,
    },
    pluggables::{
        ChainMempool, ConsensusInstance, ConsensusOutput, ConsensusParams, ConsensusProvider,
        NodeConnection, OffLedgerRequest, OnLedgerRequest, StateManager,
    },
    state_tracker::{
        await_receipt::AwaitReceiptQuery, StateTracker, StateTrackerKind, StateTrackerStep,
    },
    types::{
        anchor::AnchorOutput,
        committee::Committee,
        crypto_primitives::{Keypair, VerifyingKey},
        data_types::{ChainID, CommitteeAddress, OutputID, PeeringID, TransactionID},
        transaction::Transaction,
    },
};

use super::{
    consensus_insts::ConsensusInsts, update_latest, Configuration, LatestState,
};

/// Everything that is delivered to the reactor's inbox.
pub(crate) enum ChainNodeInput {
    /// The base ledger reported the chain's current anchor outputs, oldest first.
    AnchorOutputs(Vec<AnchorOutput>),
    OnLedgerRequest(OnLedgerRequest),
    OffLedgerRequest(OffLedgerRequest),
    Milestone(SystemTime),
    TxPublished { tx: Transaction, confirmed: bool },
    PeerMessage(PeerMessageIn),
    ConsensusOutput { request: NeedConsensus, output: ConsensusOutput },
    ConsensusRecover { request: NeedConsensus },
    AwaitReceipt { query: AwaitReceiptQuery, confirmed: bool },
    AccessNodesConfigured(Vec<VerifyingKey>),
    ServersUpdated(Vec<VerifyingKey>),
    RotateTo(Option<CommitteeAddress>),
}

pub(crate) struct ChainNodeReactor<NC, SM, MP, CP, N, CM>
where
    NC: NodeConnection,
    SM: StateManager,
    MP: ChainMempool,
    CP: ConsensusProvider,
    N: Network,
    CM: ChainManager,
{
    chain_id: ChainID,
    peering_id: PeeringID,
    keypair: Keypair,
    cancel: CancellationToken,
    recovery_timeout: Duration,
    redelivery_period: Duration,
    print_status_period: Duration,
    poll_interval: Duration,

    node_conn: NC,
    state_mgr: SM,
    mempool: MP,
    consensus: CP,
    sender: SenderHandle<N>,
    attach_id: AttachID,
    chain_mgr: CM,

    local_view: LocalView,
    last_base: Option<OutputID>,
    /// The newest anchor output the base ledger reported.
    latest_confirmed: Option<AnchorOutput>,
    tracker_act: StateTracker<SM>,
    tracker_cnf: StateTracker<SM>,
    consensus_insts: ConsensusInsts<CP::Instance>,
    publishing: HashMap<TransactionID, CancellationToken>,
    committee: Option<Committee>,
    latest_time: Option<SystemTime>,
    rotate_to: Option<CommitteeAddress>,

    access_nodes_from_node: Vec<VerifyingKey>,
    access_nodes_from_act: Vec<VerifyingKey>,
    access_nodes_from_cnf: Vec<VerifyingKey>,
    active_access_nodes: Vec<VerifyingKey>,
    active_committee_nodes: Vec<VerifyingKey>,
    /// `None` until first set from outside.
    server_nodes: Option<Vec<VerifyingKey>>,

    to_inbox: Sender<ChainNodeInput>,
    latest: Arc<RwLock<LatestState>>,
    event_publisher: Option<Sender<Event>>,
}

impl<NC, SM, MP, CP, N, CM> ChainNodeReactor<NC, SM, MP, CP, N, CM>
where
    NC: NodeConnection,
    SM: StateManager,
    MP: ChainMempool,
    CP: ConsensusProvider,
    N: Network,
    CM: ChainManager,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        configuration: &Configuration,
        peering_id: PeeringID,
        cancel: CancellationToken,
        node_conn: NC,
        state_mgr: SM,
        mempool: MP,
        consensus: CP,
        network: N,
        attach_id: AttachID,
        chain_mgr: CM,
        to_inbox: Sender<ChainNodeInput>,
        latest: Arc<RwLock<LatestState>>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let tracker_act = {
            let mut mempool = mempool.clone();
            let latest = latest.clone();
            let event_publisher = event_publisher.clone();
            StateTracker::new(
                StateTrackerKind::Active,
                state_mgr.clone(),
                cancel.child(),
                configuration.await_receipt_cleanup_every,
                Box::new(move |step: &StateTrackerStep| {
                    mempool.track_new_chain_head(
                        step.state.clone(),
                        step.from.clone(),
                        step.till.clone(),
                        &step.added,
                        &step.removed,
                    );
                    update_latest(&latest, |latest| {
                        latest.active_anchor = Some(step.till.clone());
                        latest.active_state = Some(step.state.clone());
                    });
                    Event::publish(
                        &event_publisher,
                        Event::TrackState(track_state_event(StateTrackerKind::Active, step)),
                    );
                }),
            )
        };

        let tracker_cnf = {
            let latest = latest.clone();
            let event_publisher = event_publisher.clone();
            StateTracker::new(
                StateTrackerKind::Confirmed,
                state_mgr.clone(),
                cancel.child(),
                configuration.await_receipt_cleanup_every,
                Box::new(move |step: &StateTrackerStep| {
                    update_latest(&latest, |latest| {
                        latest.confirmed_anchor = Some(step.till.clone());
                        latest.confirmed_state = Some(step.state.clone());
                    });
                    Event::publish(
                        &event_publisher,
                        Event::TrackState(track_state_event(StateTrackerKind::Confirmed, step)),
                    );
                }),
            )
        };

        Self {
            chain_id: configuration.chain_id,
            peering_id,
            keypair: Keypair::new(configuration.me.clone()),
            cancel,
            recovery_timeout: configuration.recovery_timeout,
            redelivery_period: configuration.redelivery_period,
            print_status_period: configuration.print_status_period,
            poll_interval: configuration.poll_interval,
            node_conn,
            state_mgr,
            mempool,
            consensus,
            sender: SenderHandle::new(network, peering_id),
            attach_id,
            chain_mgr,
            local_view: LocalView::new(),
            last_base: None,
            latest_confirmed: None,
            tracker_act,
            tracker_cnf,
            consensus_insts: ConsensusInsts::new(configuration.consensus_insts_in_advance),
            publishing: HashMap::new(),
            committee: None,
            latest_time: None,
            rotate_to: None,
            access_nodes_from_node: configuration.access_nodes.clone(),
            access_nodes_from_act: Vec::new(),
            access_nodes_from_cnf: Vec::new(),
            active_access_nodes: Vec::new(),
            active_committee_nodes: Vec::new(),
            server_nodes: None,
            to_inbox,
            latest,
            event_publisher,
        }
    }

    pub(crate) fn start(
        mut self,
        inbox: Receiver<ChainNodeInput>,
        shutdown_signal: Receiver<()>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            self.update_access_nodes(|_| ());

            let mut next_tick = Instant::now() + self.redelivery_period;
            let mut next_status = Instant::now() + self.print_status_period;
            loop {
                match shutdown_signal.try_recv() {
                    Ok(()) => break,
                    Err(TryRecvError::Empty) => (),
                    Err(TryRecvError::Disconnected) => {
                        panic!("Reactor thread disconnected from main thread")
                    }
                }

                match inbox.recv_timeout(self.poll_interval) {
                    Ok(input) => self.handle_input(input),
                    Err(RecvTimeoutError::Timeout) => (),
                    // The reactor holds a sender to its own inbox.
                    Err(RecvTimeoutError::Disconnected) => unreachable!(),
                }

                self.poll_state_trackers();

                let now = Instant::now();
                if now >= next_tick {
                    self.chain_mgr_input(ChainMgrInput::Tick {
                        now: SystemTime::now(),
                    });
                    next_tick = now + self.redelivery_period;
                }
                if now >= next_status {
                    self.print_status();
                    next_status = now + self.print_status_period;
                }
            }

            self.cancel.cancel();
            self.sender.detach(self.attach_id);
        })
    }

    fn handle_input(&mut self, input: ChainNodeInput) {
        match input {
            ChainNodeInput::AnchorOutputs(anchors) => self.handle_anchor_outputs(anchors),
            ChainNodeInput::OnLedgerRequest(request) => {
                self.mempool.receive_on_ledger_request(request)
            }
            ChainNodeInput::OffLedgerRequest(request) => {
                log::debug!("{}: off-ledger request {} received", self.chain_id, request.request_id);
                self.mempool.receive_off_ledger_request(request)
            }
            ChainNodeInput::Milestone(time) => self.handle_milestone(time),
            ChainNodeInput::TxPublished { tx, confirmed } => self.handle_tx_published(tx, confirmed),
            ChainNodeInput::PeerMessage(msg) => self.handle_peer_message(msg),
            ChainNodeInput::ConsensusOutput { request, output } => {
                self.handle_consensus_output(request, output)
            }
            ChainNodeInput::ConsensusRecover { request } => self.handle_consensus_recover(request),
            ChainNodeInput::AwaitReceipt { query, confirmed } => {
                self.handle_await_receipt(query, confirmed)
            }
            ChainNodeInput::AccessNodesConfigured(access_nodes) => {
                self.update_access_nodes(|reactor| reactor.access_nodes_from_node = access_nodes)
            }
            ChainNodeInput::ServersUpdated(server_nodes) => self.handle_servers_updated(server_nodes),
            ChainNodeInput::RotateTo(address) => self.handle_rotate_to(address),
        }
    }

    /// Only the newest anchor of a batch matters; the ones before it are already consumed.
    fn handle_anchor_outputs(&mut self, anchors: Vec<AnchorOutput>) {
        let Some(anchor) = anchors.into_iter().last() else {
            return;
        };
        log::debug!(
            "{}: received anchor {}@{}",
            self.chain_id,
            anchor.output_id,
            anchor.state_index
        );
        Event::publish(
            &self.event_publisher,
            Event::ReceiveAnchor(ReceiveAnchorEvent {
                timestamp: SystemTime::now(),
                anchor: anchor.clone(),
            }),
        );

        self.tracker_cnf.track_anchor(&anchor);
        self.tracker_act.track_anchor(&anchor);
        self.local_view.anchor_received(&anchor);
        self.latest_confirmed = Some(anchor.clone());
        self.chain_mgr_input(ChainMgrInput::AnchorConfirmed { anchor });
        self.local_view_updated();
    }

    fn handle_milestone(&mut self, time: SystemTime) {
        self.latest_time = Some(time);
        self.consensus_insts
            .iter_mut()
            .for_each(|inst| inst.instance.time(time));
        self.mempool.time_updated(time);
    }

    fn handle_tx_published(&mut self, tx: Transaction, confirmed: bool) {
        let tx_id = tx.id();
        if self.publishing.remove(&tx_id).is_none() {
            log::debug!("{}: ignoring result of cancelled publication of {}", self.chain_id, tx_id);
            return;
        }
        if !confirmed {
            self.local_view.anchor_rejected(&tx.produced.output_id);
            // The confirmed anchor stays unspent, and the ledger will not report it again.
            if self.local_view.is_empty() || self.local_view.all_pending_rejected() {
                if let Some(anchor) = &self.latest_confirmed {
                    log::info!(
                        "{}: every pending anchor was rejected, falling back to {}@{}",
                        self.chain_id,
                        anchor.output_id,
                        anchor.state_index
                    );
                    self.local_view.anchor_received(anchor);
                }
            }
        }
        Event::publish(
            &self.event_publisher,
            Event::TxPublishResult(TxPublishResultEvent {
                timestamp: SystemTime::now(),
                tx_id,
                confirmed,
            }),
        );

        self.chain_mgr_input(ChainMgrInput::TxPublishResult {
            tx_id,
            next_anchor: tx.produced,
            confirmed,
        });
        self.local_view_updated();
    }

    fn handle_peer_message(&mut self, msg: PeerMessageIn) {
        if msg.data.peering_id != self.peering_id || msg.data.receiver != RECEIVER_CHAIN_MGR {
            log::warn!(
                "{}: dropping message for {}/{} from {:?}",
                self.chain_id,
                msg.data.peering_id,
                msg.data.receiver,
                msg.sender
            );
            return;
        }
        let message = match ChainMgrMessage::try_from_slice(&msg.data.data) {
            Ok(message) if message.msg_type() == msg.data.msg_type => message,
            Ok(_) => {
                log::warn!("{}: message type mismatch from {:?}", self.chain_id, msg.sender);
                return;
            }
            Err(err) => {
                log::warn!("{}: cannot decode message from {:?}: {}", self.chain_id, msg.sender, err);
                return;
            }
        };

        let msgs = self.chain_mgr.message(msg.sender, message);
        self.sender.send_all(msgs);
        self.handle_chain_mgr_output();
    }

    fn handle_consensus_output(&mut self, request: NeedConsensus, output: ConsensusOutput) {
        let committee = request.committee.address;
        if !self.consensus_insts.finish(&committee, request.log_index) {
            return;
        }

        match output {
            ConsensusOutput::Done { transaction } => {
                log::debug!(
                    "{}: consensus {}/{} decided {}",
                    self.chain_id,
                    committee,
                    request.log_index,
                    transaction.id()
                );
                Event::publish(
                    &self.event_publisher,
                    Event::EndConsensus(EndConsensusEvent {
                        timestamp: SystemTime::now(),
                        committee,
                        log_index: request.log_index,
                        transaction: Some(transaction.id()),
                    }),
                );
                self.local_view
                    .anchor_published(&request.base_anchor.output_id, &transaction.produced);
                // The chain manager keeps needing this log index until it learns the new base. The
                // tombstone left by `finish` keeps that need from starting a second round.
                self.chain_mgr_input(ChainMgrInput::ConsensusOutputDone {
                    committee,
                    log_index: request.log_index,
                    base_anchor: request.base_anchor.output_id,
                    transaction,
                });
                self.local_view_updated();
            }
            ConsensusOutput::Skipped => {
                log::debug!("{}: consensus {}/{} skipped", self.chain_id, committee, request.log_index);
                Event::publish(
                    &self.event_publisher,
                    Event::EndConsensus(EndConsensusEvent {
                        timestamp: SystemTime::now(),
                        committee,
                        log_index: request.log_index,
                        transaction: None,
                    }),
                );
                self.chain_mgr_input(ChainMgrInput::ConsensusOutputSkipped {
                    committee,
                    log_index: request.log_index,
                });
            }
        }
    }

    fn handle_consensus_recover(&mut self, request: NeedConsensus) {
        let committee = request.committee.address;
        if !self.consensus_insts.finish(&committee, request.log_index) {
            return;
        }

        log::warn!("{}: consensus {}/{} timed out", self.chain_id, committee, request.log_index);
        Event::publish(
            &self.event_publisher,
            Event::ConsensusRecover(ConsensusRecoverEvent {
                timestamp: SystemTime::now(),
                committee,
                log_index: request.log_index,
            }),
        );
        self.chain_mgr_input(ChainMgrInput::ConsensusTimeout {
            committee,
            log_index: request.log_index,
        });
    }

    fn handle_await_receipt(&mut self, query: AwaitReceiptQuery, confirmed: bool) {
        let tracker = if confirmed {
            &mut self.tracker_cnf
        } else {
            &mut self.tracker_act
        };
        if tracker.await_request_receipt(query) {
            Event::publish(
                &self.event_publisher,
                Event::ResolveReceipt(ResolveReceiptEvent {
                    timestamp: SystemTime::now(),
                    tracker: tracker.kind(),
                    count: 1,
                }),
            );
        }
    }

    fn poll_state_trackers(&mut self) {
        for kind in [StateTrackerKind::Active, StateTrackerKind::Confirmed] {
            let tracker = match kind {
                StateTrackerKind::Active => &mut self.tracker_act,
                StateTrackerKind::Confirmed => &mut self.tracker_cnf,
            };
            let Some(diff) = tracker.try_recv_response() else {
                continue;
            };
            let resolved = tracker.handle_response(diff);
            let access_nodes = tracker.have_state().map(|state| state.access_nodes());

            if resolved > 0 {
                Event::publish(
                    &self.event_publisher,
                    Event::ResolveReceipt(ResolveReceiptEvent {
                        timestamp: SystemTime::now(),
                        tracker: kind,
                        count: resolved,
                    }),
                );
            }
            if let Some(access_nodes) = access_nodes {
                self.governance_access_nodes_updated(kind, access_nodes);
            }
        }
    }

    /// Tell the chain manager if the base anchor of the local view changed.
    fn local_view_updated(&mut self) {
        let base = self.local_view.base_anchor().cloned();
        let base_id = base.as_ref().map(AnchorOutput::id);
        if base_id == self.last_base {
            return;
        }
        self.last_base = base_id;

        Event::publish(
            &self.event_publisher,
            Event::UpdateLocalView(UpdateLocalViewEvent {
                timestamp: SystemTime::now(),
                base: base.clone(),
            }),
        );
        self.chain_mgr_input(ChainMgrInput::LocalViewUpdated { base });
    }

    fn chain_mgr_input(&mut self, input: ChainMgrInput) {
        let msgs = self.chain_mgr.input(input);
        self.sender.send_all(msgs);
        self.handle_chain_mgr_output();
    }

    fn handle_chain_mgr_output(&mut self) {
        match self.chain_mgr.output() {
            Some(output) => {
                if let Some(need_consensus) = output.need_consensus {
                    self.ensure_consensus_input(need_consensus);
                }
                self.publish_needed(&output.need_publish_tx);
            }
            None => {
                self.consensus_insts.cancel_uninput();
                self.publishing.drain().for_each(|(_, cancel)| cancel.cancel());
            }
        }
    }

    fn ensure_consensus_input(&mut self, need: NeedConsensus) {
        let chain_id = self.chain_id;
        let me = self.keypair.signing_key().clone();
        let (recovery_timeout, redelivery_period, print_status_period) = (
            self.recovery_timeout,
            self.redelivery_period,
            self.print_status_period,
        );
        let (latest_time, rotate_to) = (self.latest_time, self.rotate_to);
        let cancel = &self.cancel;
        let consensus = &mut self.consensus;

        let inst = self
            .consensus_insts
            .ensure(&need.committee, need.log_index, |committee, log_index| {
                let cancel = cancel.child();
                let mut instance = consensus.new_instance(ConsensusParams {
                    cancel: cancel.clone(),
                    chain_id,
                    committee: committee.clone(),
                    log_index,
                    me: me.clone(),
                    recovery_timeout,
                    redelivery_period,
                    print_status_period,
                    rotate_to,
                });
                if let Some(time) = latest_time {
                    instance.time(time);
                }
                (cancel, instance)
            });
        if inst.request.is_some() || inst.finished {
            return;
        }
        inst.request = Some(need.clone());

        let (to_inbox_output, to_inbox_recover) = (self.to_inbox.clone(), self.to_inbox.clone());
        let (request_output, request_recover) = (need.clone(), need.clone());
        inst.instance.input(
            need.base_anchor.clone(),
            Box::new(move |output| {
                let _ = to_inbox_output.send(ChainNodeInput::ConsensusOutput {
                    request: request_output,
                    output,
                });
            }),
            Box::new(move || {
                let _ = to_inbox_recover.send(ChainNodeInput::ConsensusRecover {
                    request: request_recover,
                });
            }),
        );

        log::debug!(
            "{}: consensus {}/{} started on {}@{}",
            self.chain_id,
            need.committee.address,
            need.log_index,
            need.base_anchor.output_id,
            need.base_anchor.state_index
        );
        Event::publish(
            &self.event_publisher,
            Event::StartConsensus(StartConsensusEvent {
                timestamp: SystemTime::now(),
                committee: need.committee.address,
                log_index: need.log_index,
                base_anchor: need.base_anchor.output_id,
            }),
        );

        self.tracker_act.track_anchor(&need.base_anchor);
        self.update_committee(&need.committee);
    }

    /// Make the set of in-flight publications equal to `needed`.
    fn publish_needed(&mut self, needed: &BTreeMap<TransactionID, NeedPublishTx>) {
        self.publishing.retain(|tx_id, cancel| {
            let keep = needed.contains_key(tx_id);
            if !keep {
                cancel.cancel();
            }
            keep
        });

        for (tx_id, need) in needed {
            if self.publishing.contains_key(tx_id) {
                continue;
            }
            let cancel = self.cancel.child();
            self.publishing.insert(*tx_id, cancel.clone());

            log::debug!(
                "{}: publishing {} producing {}@{}",
                self.chain_id,
                tx_id,
                need.next_anchor.output_id,
                need.next_anchor.state_index
            );
            let to_inbox = self.to_inbox.clone();
            self.node_conn.publish_tx(
                cancel,
                self.chain_id,
                need.tx.clone(),
                Box::new(move |tx, confirmed| {
                    let _ = to_inbox.send(ChainNodeInput::TxPublished { tx, confirmed });
                }),
            );
            Event::publish(
                &self.event_publisher,
                Event::PublishTx(PublishTxEvent {
                    timestamp: SystemTime::now(),
                    tx_id: *tx_id,
                    next_anchor: need.next_anchor.output_id,
                }),
            );
        }
    }

    fn update_committee(&mut self, committee: &Committee) {
        if self.committee.as_ref() == Some(committee) {
            return;
        }
        self.committee = Some(committee.clone());
        update_latest(&self.latest, |latest| latest.committee = Some(committee.clone()));

        log::info!(
            "{}: committee is now {} with {} members",
            self.chain_id,
            committee.address,
            committee.len()
        );
        Event::publish(
            &self.event_publisher,
            Event::UpdateCommittee(UpdateCommitteeEvent {
                timestamp: SystemTime::now(),
                committee: committee.address,
                members: committee.members.clone(),
            }),
        );
        let members = committee.members.clone();
        self.update_access_nodes(|reactor| reactor.active_committee_nodes = members);
    }

    fn governance_access_nodes_updated(&mut self, kind: StateTrackerKind, access_nodes: Vec<VerifyingKey>) {
        let current = match kind {
            StateTrackerKind::Active => &self.access_nodes_from_act,
            StateTrackerKind::Confirmed => &self.access_nodes_from_cnf,
        };
        if same_nodes(current, &access_nodes) {
            return;
        }
        self.update_access_nodes(|reactor| match kind {
            StateTrackerKind::Active => reactor.access_nodes_from_act = access_nodes,
            StateTrackerKind::Confirmed => reactor.access_nodes_from_cnf = access_nodes,
        });
    }

    /// Apply `update` to the sources of the active access nodes or to the committee nodes, re-derive the
    /// active access nodes, and tell the collaborators about whatever changed.
    fn update_access_nodes(&mut self, update: impl FnOnce(&mut Self)) {
        let old_access_nodes = self.active_access_nodes.clone();
        let old_committee_nodes = self.active_committee_nodes.clone();
        update(self);

        self.active_access_nodes = derive_active_access_nodes(
            self.keypair.public(),
            [
                &self.access_nodes_from_node,
                &self.access_nodes_from_act,
                &self.access_nodes_from_cnf,
                &self.active_committee_nodes,
            ],
        );
        let access_nodes_same = same_nodes(&old_access_nodes, &self.active_access_nodes);
        let committee_nodes_same = same_nodes(&old_committee_nodes, &self.active_committee_nodes);

        if !access_nodes_same {
            log::info!(
                "{}: access nodes updated, {} active",
                self.chain_id,
                self.active_access_nodes.len()
            );
            let access_nodes = self.active_access_nodes.clone();
            update_latest(&self.latest, |latest| latest.access_nodes = access_nodes.clone());
            Event::publish(
                &self.event_publisher,
                Event::UpdateAccessNodes(UpdateAccessNodesEvent {
                    timestamp: SystemTime::now(),
                    access_nodes,
                }),
            );
        }
        if !access_nodes_same || !committee_nodes_same {
            self.mempool.access_nodes_updated(
                self.active_committee_nodes.clone(),
                self.active_access_nodes.clone(),
            );
            self.state_mgr.chain_nodes_updated(
                self.server_nodes.clone().unwrap_or_default(),
                self.active_access_nodes.clone(),
                self.active_committee_nodes.clone(),
            );
        }
    }

    fn handle_servers_updated(&mut self, server_nodes: Vec<VerifyingKey>) {
        let unchanged = self
            .server_nodes
            .as_ref()
            .map_or(false, |old| same_nodes(old, &server_nodes));
        self.server_nodes = Some(server_nodes.clone());
        if unchanged {
            return;
        }

        log::info!("{}: server nodes updated, {} servers", self.chain_id, server_nodes.len());
        update_latest(&self.latest, |latest| latest.server_nodes = server_nodes.clone());
        self.mempool
            .server_nodes_updated(self.active_committee_nodes.clone(), server_nodes.clone());
        self.state_mgr.chain_nodes_updated(
            server_nodes.clone(),
            self.active_access_nodes.clone(),
            self.active_committee_nodes.clone(),
        );
        Event::publish(
            &self.event_publisher,
            Event::UpdateServerNodes(UpdateServerNodesEvent {
                timestamp: SystemTime::now(),
                server_nodes,
            }),
        );
    }

    /// Remember the rotation target for instances created later, and pass it on to the running ones.
    fn handle_rotate_to(&mut self, address: Option<CommitteeAddress>) {
        log::info!("{}: rotation target set to {:?}", self.chain_id, address);
        self.rotate_to = address;
        self.consensus_insts
            .iter_mut()
            .for_each(|inst| inst.instance.rotate_to(address));
    }

    fn print_status(&self) {
        log::info!(
            "{}: {}, {}, {}, {}, publishing: {}, {}",
            self.chain_id,
            self.local_view.status_string(),
            self.tracker_act.status_string(),
            self.tracker_cnf.status_string(),
            self.consensus_insts.status_string(),
            self.publishing.len(),
            self.chain_mgr.status_string()
        );
    }
}

/// Itself first, then every key of `sources` not seen before, in order.
fn derive_active_access_nodes(me: VerifyingKey, sources: [&Vec<VerifyingKey>; 4]) -> Vec<VerifyingKey> {
    let mut nodes = vec![me];
    for key in sources.into_iter().flatten() {
        if !nodes.contains(key) {
            nodes.push(*key);
        }
    }
    nodes
}

/// Whether `a` and `b` hold the same keys, ignoring order.
fn same_nodes(a: &[VerifyingKey], b: &[VerifyingKey]) -> bool {
    a.len() == b.len() && a.iter().all(|key| b.contains(key))
}

fn track_state_event(tracker: StateTrackerKind, step: &StateTrackerStep) -> TrackStateEvent {
    TrackStateEvent {
        timestamp: SystemTime::now(),
        tracker,
        from: step.from.as_ref().map(AnchorOutput::id),
        till: step.till.output_id,
        state_index: step.till.state_index,
        added: step.added.len(),
        removed: step.removed.len(),
    }
}
