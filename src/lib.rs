/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A Rust library for replicating the state of a chain anchored to a base ledger, and for orchestrating
//! the BFT consensus rounds that advance it.
//!
//! A chain's state is committed to a single unspent "anchor output" on the base ledger. Every state
//! transition is a transaction that consumes the current anchor output and produces the next one. The
//! nodes of the chain's committee agree on these transactions through consensus, post them to the base
//! ledger, and follow the anchor outputs the base ledger confirms.
//!
//! ## Modules
//!
//! - [`chain_node`]: builds and runs the node of one chain. Start here.
//! - [`chain_manager`]: the automaton that decides which consensus rounds to run and which
//!   transactions to publish.
//! - [`local_view`]: the node's view of the anchor chain, including its own unconfirmed transactions.
//! - [`state_tracker`]: follows the state at a target anchor and answers receipt queries against it.
//! - [`pluggables`]: the traits of the collaborators a chain node is built from.
//! - [`networking`]: the peer-to-peer transport trait and the envelope of chain manager messages.
//! - [`events`]: the events a chain node emits, and [`logging`] of them.
//! - [`cancellation`]: hierarchical cancellation of long-running work.
//! - [`types`]: types shared by all of the above.

pub mod cancellation;

pub mod chain_manager;

pub mod chain_node;

pub mod events;

pub(crate) mod event_bus;

pub mod local_view;

pub mod logging;

pub mod networking;

pub mod pluggables;

pub mod state_tracker;

pub mod types;
