/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types shared by every component of a chain node.

pub mod anchor;

pub mod block;

pub mod committee;

pub mod crypto_primitives;

pub mod data_types;

pub(crate) mod signed_messages;

pub mod state;

pub mod transaction;
