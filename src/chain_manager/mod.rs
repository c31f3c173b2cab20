/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The automaton that decides which consensus rounds a chain node runs and which transactions it
//! publishes.
//!
//! The [chain node](crate::chain_node) feeds every event it observes into its [`ChainManager`] as a
//! [`ChainMgrInput`](types::ChainMgrInput), sends the [messages](types::OutMessage) the automaton
//! returns, and then reads the automaton's [output](ChainManager::output). The output is interpreted
//! the same way regardless of which input produced it:
//! - [`NeedConsensus`](types::NeedConsensus): the consensus instance for the given committee and log
//!   index must be running on the given base anchor.
//! - [`NeedPublishTx`](types::NeedPublishTx): these transactions must be in the process of being
//!   published.
//! - `None`: nothing should be running.
//!
//! [`DefaultChainManager`] is the implementation shipped with this crate.

pub mod messages;

pub mod types;

mod implementation;
pub use implementation::DefaultChainManager;

use crate::types::crypto_primitives::VerifyingKey;

use self::{
    messages::ChainMgrMessage,
    types::{ChainMgrInput, ChainMgrOutput, OutMessage},
};

pub trait ChainManager: Send + 'static {
    /// Handle an event observed by the chain node.
    fn input(&mut self, input: ChainMgrInput) -> Vec<OutMessage>;

    /// Handle a message from the chain manager of `sender`.
    fn message(&mut self, sender: VerifyingKey, message: ChainMgrMessage) -> Vec<OutMessage>;

    /// Get what the chain node should currently be doing.
    fn output(&self) -> Option<ChainMgrOutput>;

    fn status_string(&self) -> String;
}
