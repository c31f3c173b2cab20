/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Read-only views of a chain's state, as handed out by the
//! [state manager](crate::pluggables::StateManager).

use std::sync::Arc;

use super::{
    block::RequestReceipt,
    crypto_primitives::VerifyingKey,
    data_types::{RequestID, StateIndex},
};

/// A chain state at a particular state index.
pub trait ChainState: Send + Sync {
    /// Index of this state.
    fn state_index(&self) -> StateIndex;

    /// Get the receipt of `request_id` if the request was processed in this state or any earlier one.
    fn request_receipt(&self, request_id: &RequestID) -> Option<RequestReceipt>;

    /// The access nodes the chain's governance authorizes in this state.
    fn access_nodes(&self) -> Vec<VerifyingKey> {
        Vec::new()
    }
}

/// Shared handle to a [`ChainState`].
pub type StateHandle = Arc<dyn ChainState>;
