use std::{
    collections::{BTreeMap, HashMap},
    sync::{mpsc, Arc, Mutex},
};

use anchor_chain::{
    cancellation::CancellationToken,
    pluggables::{StateDiff, StateManager, StateManagerError},
    types::{
        anchor::AnchorOutput,
        block::{Block, RequestReceipt},
        crypto_primitives::VerifyingKey,
        data_types::{ChainID, PeeringID, RequestID, StateIndex},
        state::ChainState,
    },
};

/// A chain state that only knows the receipts of the requests processed up to it, and the access nodes
/// its governance authorizes.
pub(crate) struct MockState {
    state_index: StateIndex,
    receipts: HashMap<RequestID, RequestReceipt>,
    access_nodes: Vec<VerifyingKey>,
}

impl MockState {
    /// Build the state at `state_index` from the receipts of every block up to it.
    pub(crate) fn at(
        state_index: StateIndex,
        blocks: &BTreeMap<StateIndex, Vec<RequestReceipt>>,
        access_nodes: Vec<VerifyingKey>,
    ) -> MockState {
        let receipts = blocks
            .range(..=state_index)
            .flat_map(|(_, receipts)| receipts.iter())
            .map(|receipt| (receipt.request_id, receipt.clone()))
            .collect();
        MockState {
            state_index,
            receipts,
            access_nodes,
        }
    }
}

impl ChainState for MockState {
    fn state_index(&self) -> StateIndex {
        self.state_index
    }

    fn request_receipt(&self, request_id: &RequestID) -> Option<RequestReceipt> {
        self.receipts.get(request_id).cloned()
    }

    fn access_nodes(&self) -> Vec<VerifyingKey> {
        self.access_nodes.clone()
    }
}

pub(crate) fn receipt(request_id: RequestID, state_index: StateIndex) -> RequestReceipt {
    RequestReceipt {
        request_id,
        state_index,
        request_index: 0,
        result: vec![1],
        error: None,
    }
}

/// The peer sets of one `chain_nodes_updated` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ChainNodes {
    pub(crate) server_nodes: Vec<VerifyingKey>,
    pub(crate) access_nodes: Vec<VerifyingKey>,
    pub(crate) committee_nodes: Vec<VerifyingKey>,
}

struct StateManagerInner {
    blocks: BTreeMap<StateIndex, Vec<RequestReceipt>>,
    governance_access_nodes: Vec<VerifyingKey>,
    open_fails: bool,
    opened: Vec<(ChainID, PeeringID)>,
    fetches: Vec<(Option<StateIndex>, StateIndex)>,
    chain_nodes: Vec<ChainNodes>,
}

/// A state manager that answers every fetch immediately, from blocks registered by the test.
#[derive(Clone)]
pub(crate) struct MockStateManager(Arc<Mutex<StateManagerInner>>);

impl MockStateManager {
    pub(crate) fn new() -> MockStateManager {
        MockStateManager(Arc::new(Mutex::new(StateManagerInner {
            blocks: BTreeMap::new(),
            governance_access_nodes: Vec::new(),
            open_fails: false,
            opened: Vec::new(),
            fetches: Vec::new(),
            chain_nodes: Vec::new(),
        })))
    }

    /// A state manager whose chain store cannot be opened.
    pub(crate) fn failing() -> MockStateManager {
        let state_mgr = MockStateManager::new();
        state_mgr.0.lock().unwrap().open_fails = true;
        state_mgr
    }

    /// Register the receipts of the block that produces the state at `state_index`.
    pub(crate) fn add_block(&self, state_index: StateIndex, receipts: Vec<RequestReceipt>) {
        self.0.lock().unwrap().blocks.insert(state_index, receipts);
    }

    /// Make every state fetched from now on authorize `access_nodes`.
    pub(crate) fn set_governance_access_nodes(&self, access_nodes: Vec<VerifyingKey>) {
        self.0.lock().unwrap().governance_access_nodes = access_nodes;
    }

    pub(crate) fn opened(&self) -> Vec<(ChainID, PeeringID)> {
        self.0.lock().unwrap().opened.clone()
    }

    pub(crate) fn fetches(&self) -> Vec<(Option<StateIndex>, StateIndex)> {
        self.0.lock().unwrap().fetches.clone()
    }

    pub(crate) fn chain_nodes(&self) -> Vec<ChainNodes> {
        self.0.lock().unwrap().chain_nodes.clone()
    }
}

impl StateManager for MockStateManager {
    fn open(&mut self, chain_id: ChainID, peering_id: PeeringID) -> Result<(), StateManagerError> {
        let mut inner = self.0.lock().unwrap();
        if inner.open_fails {
            return Err(StateManagerError::StoreUnavailable(String::from("disk full")));
        }
        inner.opened.push((chain_id, peering_id));
        Ok(())
    }

    fn fetch_state_diff(
        &mut self,
        _cancel: CancellationToken,
        from: Option<AnchorOutput>,
        to: AnchorOutput,
    ) -> mpsc::Receiver<StateDiff> {
        let mut inner = self.0.lock().unwrap();
        let from_index = from.as_ref().map(|anchor| anchor.state_index);
        inner.fetches.push((from_index, to.state_index));

        let added = inner
            .blocks
            .iter()
            .filter(|(state_index, _)| {
                Some(**state_index) > from_index && **state_index <= to.state_index
            })
            .map(|(state_index, receipts)| Block::new(*state_index, None, receipts))
            .collect();
        let diff = StateDiff {
            state: Arc::new(MockState::at(
                to.state_index,
                &inner.blocks,
                inner.governance_access_nodes.clone(),
            )),
            added,
            removed: Vec::new(),
        };

        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(diff);
        receiver
    }

    fn chain_nodes_updated(
        &mut self,
        server_nodes: Vec<VerifyingKey>,
        access_nodes: Vec<VerifyingKey>,
        committee_nodes: Vec<VerifyingKey>,
    ) {
        self.0.lock().unwrap().chain_nodes.push(ChainNodes {
            server_nodes,
            access_nodes,
            committee_nodes,
        });
    }
}
