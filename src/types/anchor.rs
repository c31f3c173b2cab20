/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the [`AnchorOutput`] type.

use std::hash::{Hash, Hasher};

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::{CommitteeAddress, CryptoHash, OutputID, StateIndex};

/// Immutable snapshot of the single-writer base-ledger output that commits to a chain's state.
///
/// Two `AnchorOutput`s are equal if and only if their [`output_id`](Self::output_id)s are equal. The
/// remaining fields are carried along for convenience and never take part in comparisons.
#[derive(Clone, Debug, BorshDeserialize, BorshSerialize)]
pub struct AnchorOutput {
    pub output_id: OutputID,
    pub state_index: StateIndex,
    pub state_commitment: CryptoHash,
    /// Address of the committee allowed to consume this output.
    pub state_controller: CommitteeAddress,
}

impl AnchorOutput {
    pub fn new(
        output_id: OutputID,
        state_index: StateIndex,
        state_commitment: CryptoHash,
        state_controller: CommitteeAddress,
    ) -> Self {
        Self {
            output_id,
            state_index,
            state_commitment,
            state_controller,
        }
    }

    pub const fn id(&self) -> OutputID {
        self.output_id
    }
}

impl PartialEq for AnchorOutput {
    fn eq(&self, other: &Self) -> bool {
        self.output_id == other.output_id
    }
}

impl Eq for AnchorOutput {}

impl Hash for AnchorOutput {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.output_id.hash(state)
    }
}
