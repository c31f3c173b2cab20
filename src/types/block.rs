/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for chain [`Block`]s and the [`RequestReceipt`]s they carry.

use std::io;

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::{CryptoHasher, Digest},
    data_types::{CryptoHash, RequestID, StateIndex},
};

/// The record produced by executing a request, proving that it was processed and with what result.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct RequestReceipt {
    pub request_id: RequestID,
    /// State index of the block that contains this receipt.
    pub state_index: StateIndex,
    /// Position of the request inside its block.
    pub request_index: u16,
    pub result: Vec<u8>,
    pub error: Option<String>,
}

/// The unit of state transition of a chain. Each block moves the chain state from the state with index
/// `state_index - 1` to the state with `state_index`.
///
/// Receipts are kept in their encoded form, as they are only decoded when somebody waits for them.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Block {
    pub state_index: StateIndex,
    pub previous: Option<CryptoHash>,
    pub encoded_receipts: Vec<u8>,
}

impl Block {
    /// Create a block that carries `receipts`.
    pub fn new(
        state_index: StateIndex,
        previous: Option<CryptoHash>,
        receipts: &Vec<RequestReceipt>,
    ) -> Block {
        Block {
            state_index,
            previous,
            encoded_receipts: receipts.try_to_vec().unwrap(),
        }
    }

    pub fn hash(&self) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(&self.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }

    /// Decode the receipts carried by this block.
    pub fn receipts(&self) -> io::Result<Vec<RequestReceipt>> {
        Vec::<RequestReceipt>::try_from_slice(&self.encoded_receipts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipts_decode_as_encoded() {
        let receipts = vec![RequestReceipt {
            request_id: RequestID::new([4; 32]),
            state_index: StateIndex::new(2),
            request_index: 0,
            result: vec![42],
            error: None,
        }];
        let block = Block::new(StateIndex::new(2), None, &receipts);
        assert_eq!(block.receipts().unwrap(), receipts);
    }

    #[test]
    fn garbage_receipts_fail_to_decode() {
        let block = Block {
            state_index: StateIndex::new(1),
            previous: None,
            encoded_receipts: vec![9, 9, 9],
        };
        assert!(block.receipts().is_err());
    }
}
