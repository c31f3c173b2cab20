/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the base-ledger [`Transaction`] type produced by consensus.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    anchor::AnchorOutput,
    crypto_primitives::{CryptoHasher, Digest},
    data_types::{OutputID, TransactionID},
};

/// A base-ledger transaction that consumes one anchor output and produces the next one.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Transaction {
    /// The anchor output this transaction spends.
    pub consumed: OutputID,
    /// The anchor output this transaction creates.
    pub produced: AnchorOutput,
    /// Ledger-specific payload (unlocks, signatures, other outputs), opaque to this crate.
    pub essence: Vec<u8>,
}

impl Transaction {
    pub fn new(consumed: OutputID, produced: AnchorOutput, essence: Vec<u8>) -> Self {
        Self {
            consumed,
            produced,
            essence,
        }
    }

    /// Compute the SHA256 hash of the Borsh encoding of this transaction.
    pub fn id(&self) -> TransactionID {
        let mut hasher = CryptoHasher::new();
        hasher.update(&self.consumed.bytes());
        hasher.update(&self.produced.try_to_vec().unwrap());
        hasher.update(&self.essence);
        TransactionID::new(hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::data_types::{CommitteeAddress, CryptoHash, StateIndex};

    fn anchor(id: u8) -> AnchorOutput {
        AnchorOutput::new(
            OutputID::new([id; 32]),
            StateIndex::new(id as u32),
            CryptoHash::new([0; 32]),
            CommitteeAddress::new([0; 32]),
        )
    }

    #[test]
    fn transaction_id_depends_on_content() {
        let tx = Transaction::new(OutputID::new([1; 32]), anchor(2), vec![1, 2, 3]);
        assert_eq!(tx.id(), tx.clone().id());

        let other = Transaction::new(OutputID::new([1; 32]), anchor(2), vec![1, 2]);
        assert_ne!(tx.id(), other.id());
    }
}
