/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Registry of clients waiting for request receipts.
//!
//! Callers register an [`AwaitReceiptQuery`] and hold on to the receiving end of its responder
//! channel. Every query is resolved at most once:
//! - When its receipt appears in a state, the receipt is sent and the responder is dropped.
//! - When its cancellation token is cancelled, the responder is dropped without sending anything.
//!
//! Either way the receiver observes a disconnected channel afterwards. A receiver that disconnects
//! without yielding a value means "not found / given up", never an error.
//!
//! ## Reconciliation
//!
//! The first state the registry is told about is checked against every pending query. After that, only
//! the receipts of the blocks added by each state transition are matched against pending queries.
//!
//! ## Cleanup
//!
//! Queries whose callers went away without cancelling are only noticed when they are resolved. To bound
//! memory, every `cleanup_every`-th call to [`await_receipt`](AwaitReceipt::await_receipt) drops every
//! pending query whose token is cancelled.

use std::{collections::HashMap, sync::mpsc::Sender};

use crate::{
    cancellation::CancellationToken,
    types::{
        block::{Block, RequestReceipt},
        data_types::RequestID,
        state::StateHandle,
    },
};

pub struct AwaitReceiptQuery {
    pub cancel: CancellationToken,
    pub request_id: RequestID,
    pub responder: Sender<RequestReceipt>,
}

impl AwaitReceiptQuery {
    fn respond(self, receipt: RequestReceipt) {
        if !self.cancel.is_cancelled() {
            // The caller may have dropped its receiver already.
            let _ = self.responder.send(receipt);
        }
    }
}

pub struct AwaitReceipt {
    queries: HashMap<RequestID, Vec<AwaitReceiptQuery>>,
    state: Option<StateHandle>,
    cleanup_every: usize,
    cleanup_countdown: usize,
}

impl AwaitReceipt {
    pub fn new(cleanup_every: usize) -> AwaitReceipt {
        let cleanup_every = cleanup_every.max(1);
        AwaitReceipt {
            queries: HashMap::new(),
            state: None,
            cleanup_every,
            cleanup_countdown: cleanup_every,
        }
    }

    /// Resolve `query` immediately if the latest known state has its receipt, otherwise register it.
    ///
    /// Returns whether the query was resolved immediately.
    pub fn await_receipt(&mut self, query: AwaitReceiptQuery) -> bool {
        self.cleanup_countdown -= 1;
        if self.cleanup_countdown == 0 {
            self.cleanup();
            self.cleanup_countdown = self.cleanup_every;
        }

        if query.cancel.is_cancelled() {
            return false;
        }
        if let Some(state) = &self.state {
            if let Some(receipt) = state.request_receipt(&query.request_id) {
                query.respond(receipt);
                return true;
            }
        }
        self.queries
            .entry(query.request_id)
            .or_insert_with(Vec::new)
            .push(query);
        false
    }

    /// Resolve the pending queries whose receipts became available in `state`, which was reached by
    /// applying `added` blocks to the previously considered state.
    ///
    /// Returns the number of queries resolved.
    ///
    /// # Panics
    ///
    /// Panics if the receipts of one of the `added` blocks cannot be decoded: blocks handed out by the
    /// state manager are well-formed.
    pub fn consider_state(&mut self, state: StateHandle, added: &[Block]) -> usize {
        let mut resolved = 0;
        if self.state.is_none() {
            let found: Vec<(RequestID, RequestReceipt)> = self
                .queries
                .keys()
                .filter_map(|request_id| {
                    state
                        .request_receipt(request_id)
                        .map(|receipt| (*request_id, receipt))
                })
                .collect();
            for (request_id, receipt) in found {
                resolved += self.resolve(&request_id, receipt);
            }
        } else {
            for block in added {
                let receipts = block.receipts().unwrap_or_else(|err| {
                    panic!(
                        "cannot decode receipts of block {}: {}",
                        block.state_index, err
                    )
                });
                for receipt in receipts {
                    let request_id = receipt.request_id;
                    resolved += self.resolve(&request_id, receipt);
                }
            }
        }
        self.state = Some(state);
        resolved
    }

    /// Drop every pending query whose token is cancelled.
    pub fn cleanup(&mut self) {
        self.queries.retain(|_, queries| {
            queries.retain(|query| !query.cancel.is_cancelled());
            !queries.is_empty()
        });
    }

    /// Get the number of pending queries.
    pub fn len(&self) -> usize {
        self.queries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    fn resolve(&mut self, request_id: &RequestID, receipt: RequestReceipt) -> usize {
        match self.queries.remove(request_id) {
            Some(queries) => {
                let count = queries.len();
                for query in queries {
                    query.respond(receipt.clone())
                }
                count
            }
            None => 0,
        }
    }
}
