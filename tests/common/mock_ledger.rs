use std::{
    sync::{Arc, Mutex},
    time::SystemTime,
};

use anchor_chain::{
    cancellation::CancellationToken,
    pluggables::{
        AnchorOutputsHandler, MilestoneHandler, NodeConnection, OnLedgerRequest,
        OnLedgerRequestHandler, TxPublishedCallback,
    },
    types::{anchor::AnchorOutput, data_types::ChainID, transaction::Transaction},
};

struct Attachment {
    cancel: CancellationToken,
    chain_id: ChainID,
    on_request: OnLedgerRequestHandler,
    on_anchor_outputs: AnchorOutputsHandler,
    on_milestone: MilestoneHandler,
}

/// A transaction handed to the ledger and not resolved yet.
pub(crate) struct Publication {
    pub(crate) cancel: CancellationToken,
    pub(crate) tx: Transaction,
    callback: Option<TxPublishedCallback>,
}

struct LedgerInner {
    anchor: Option<AnchorOutput>,
    attachments: Vec<Attachment>,
    publications: Vec<Publication>,
    auto_resolve: bool,
}

impl LedgerInner {
    fn notify_anchor(&self, anchor: &AnchorOutput) {
        for attachment in self.attachments.iter().filter(|a| !a.cancel.is_cancelled()) {
            (attachment.on_anchor_outputs)(vec![anchor.clone()]);
        }
    }

    /// Confirm `tx` if it consumes the current anchor, reject it otherwise.
    fn resolve(&mut self, tx: Transaction, callback: TxPublishedCallback) -> bool {
        let confirmed = self.anchor.as_ref().map(AnchorOutput::id) == Some(tx.consumed);
        if confirmed {
            self.anchor = Some(tx.produced.clone());
        }
        callback(tx.clone(), confirmed);
        if confirmed {
            self.notify_anchor(&tx.produced);
        }
        confirmed
    }
}

/// A single-chain base ledger shared by every node of a test.
///
/// An auto-resolving ledger confirms or rejects transactions as soon as they are published. Otherwise
/// publications wait until the test resolves them.
#[derive(Clone)]
pub(crate) struct MockLedger(Arc<Mutex<LedgerInner>>);

impl MockLedger {
    pub(crate) fn new(auto_resolve: bool) -> MockLedger {
        MockLedger(Arc::new(Mutex::new(LedgerInner {
            anchor: None,
            attachments: Vec::new(),
            publications: Vec::new(),
            auto_resolve,
        })))
    }

    /// Make `anchor` the chain's unspent anchor output and tell every attached node.
    pub(crate) fn post_anchor(&self, anchor: AnchorOutput) {
        let mut inner = self.0.lock().unwrap();
        inner.anchor = Some(anchor.clone());
        inner.notify_anchor(&anchor);
    }

    pub(crate) fn anchor(&self) -> Option<AnchorOutput> {
        self.0.lock().unwrap().anchor.clone()
    }

    pub(crate) fn post_request(&self, request: OnLedgerRequest) {
        let inner = self.0.lock().unwrap();
        for attachment in inner.attachments.iter().filter(|a| !a.cancel.is_cancelled()) {
            (attachment.on_request)(request.clone());
        }
    }

    pub(crate) fn milestone(&self, time: SystemTime) {
        let inner = self.0.lock().unwrap();
        for attachment in inner.attachments.iter().filter(|a| !a.cancel.is_cancelled()) {
            (attachment.on_milestone)(time);
        }
    }

    pub(crate) fn attached_chains(&self) -> Vec<ChainID> {
        let inner = self.0.lock().unwrap();
        inner.attachments.iter().map(|a| a.chain_id).collect()
    }

    pub(crate) fn all_detached(&self) -> bool {
        let inner = self.0.lock().unwrap();
        inner.attachments.iter().all(|a| a.cancel.is_cancelled())
    }

    pub(crate) fn with_publications<T>(&self, read: impl FnOnce(&[Publication]) -> T) -> T {
        read(&self.0.lock().unwrap().publications)
    }

    /// Resolve the `index`-th publication, as the ledger would, even if it was cancelled.
    pub(crate) fn resolve(&self, index: usize) -> Option<bool> {
        let mut inner = self.0.lock().unwrap();
        let publication = inner.publications.get_mut(index)?;
        let callback = publication.callback.take()?;
        let tx = publication.tx.clone();
        Some(inner.resolve(tx, callback))
    }

    /// Reject the `index`-th publication, even if it consumes the current anchor.
    pub(crate) fn reject(&self, index: usize) -> bool {
        let mut inner = self.0.lock().unwrap();
        let Some(publication) = inner.publications.get_mut(index) else {
            return false;
        };
        match publication.callback.take() {
            Some(callback) => {
                callback(publication.tx.clone(), false);
                true
            }
            None => false,
        }
    }
}

impl NodeConnection for MockLedger {
    fn publish_tx(
        &mut self,
        cancel: CancellationToken,
        _chain_id: ChainID,
        tx: Transaction,
        callback: TxPublishedCallback,
    ) {
        let mut inner = self.0.lock().unwrap();
        if inner.auto_resolve {
            inner.resolve(tx.clone(), callback);
            inner.publications.push(Publication {
                cancel,
                tx,
                callback: None,
            });
        } else {
            inner.publications.push(Publication {
                cancel,
                tx,
                callback: Some(callback),
            });
        }
    }

    fn attach_chain(
        &mut self,
        cancel: CancellationToken,
        chain_id: ChainID,
        on_request: OnLedgerRequestHandler,
        on_anchor_outputs: AnchorOutputsHandler,
        on_milestone: MilestoneHandler,
    ) {
        self.0.lock().unwrap().attachments.push(Attachment {
            cancel,
            chain_id,
            on_request,
            on_anchor_outputs,
            on_milestone,
        });
    }
}
