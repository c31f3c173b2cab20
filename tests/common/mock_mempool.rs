use std::{
    sync::{Arc, Mutex},
    time::SystemTime,
};

use anchor_chain::{
    pluggables::{ChainMempool, OffLedgerRequest, OnLedgerRequest},
    types::{
        anchor::AnchorOutput, block::Block, crypto_primitives::VerifyingKey, state::StateHandle,
    },
};

#[derive(Default)]
pub(crate) struct MempoolLog {
    pub(crate) requests: Vec<OnLedgerRequest>,
    pub(crate) off_ledger_requests: Vec<OffLedgerRequest>,
    pub(crate) heads: Vec<AnchorOutput>,
    /// `(committee_nodes, access_nodes)` of every access-node update.
    pub(crate) access_nodes: Vec<(Vec<VerifyingKey>, Vec<VerifyingKey>)>,
    /// `(committee_nodes, server_nodes)` of every server-node update.
    pub(crate) server_nodes: Vec<(Vec<VerifyingKey>, Vec<VerifyingKey>)>,
    pub(crate) times: Vec<SystemTime>,
}

/// A mempool that records everything the chain node tells it.
#[derive(Clone, Default)]
pub(crate) struct MockMempool(Arc<Mutex<MempoolLog>>);

impl MockMempool {
    pub(crate) fn read<T>(&self, read: impl FnOnce(&MempoolLog) -> T) -> T {
        read(&self.0.lock().unwrap())
    }
}

impl ChainMempool for MockMempool {
    fn receive_on_ledger_request(&mut self, request: OnLedgerRequest) {
        self.0.lock().unwrap().requests.push(request);
    }

    fn receive_off_ledger_request(&mut self, request: OffLedgerRequest) {
        self.0.lock().unwrap().off_ledger_requests.push(request);
    }

    fn track_new_chain_head(
        &mut self,
        _state: StateHandle,
        _from: Option<AnchorOutput>,
        till: AnchorOutput,
        _added: &[Block],
        _removed: &[Block],
    ) {
        self.0.lock().unwrap().heads.push(till);
    }

    fn access_nodes_updated(
        &mut self,
        committee_nodes: Vec<VerifyingKey>,
        access_nodes: Vec<VerifyingKey>,
    ) {
        self.0
            .lock()
            .unwrap()
            .access_nodes
            .push((committee_nodes, access_nodes));
    }

    fn server_nodes_updated(
        &mut self,
        committee_nodes: Vec<VerifyingKey>,
        server_nodes: Vec<VerifyingKey>,
    ) {
        self.0
            .lock()
            .unwrap()
            .server_nodes
            .push((committee_nodes, server_nodes));
    }

    fn time_updated(&mut self, time: SystemTime) {
        self.0.lock().unwrap().times.push(time);
    }
}
