/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages exchanged between the chain managers of a committee's members.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    crypto_primitives::{Keypair, VerifyingKey},
    data_types::{ChainID, CommitteeAddress, LogIndex, SignatureBytes},
    signed_messages::SignedMessage,
};

pub const MSG_TYPE_NEXT_LOG_INDEX: u8 = 1;

/// All messages exchanged between chain managers.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ChainMgrMessage {
    NextLogIndex(NextLogIndex),
}

impl ChainMgrMessage {
    pub fn msg_type(&self) -> u8 {
        match self {
            ChainMgrMessage::NextLogIndex(_) => MSG_TYPE_NEXT_LOG_INDEX,
        }
    }
}

impl From<NextLogIndex> for ChainMgrMessage {
    fn from(value: NextLogIndex) -> Self {
        ChainMgrMessage::NextLogIndex(value)
    }
}

/// Signed statement by `sender` that the committee should move on to `log_index`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NextLogIndex {
    pub chain_id: ChainID,
    pub committee: CommitteeAddress,
    pub log_index: LogIndex,
    pub sender: [u8; 32],
    pub signature: SignatureBytes,
}

impl NextLogIndex {
    pub(crate) fn new(
        keypair: &Keypair,
        chain_id: ChainID,
        committee: CommitteeAddress,
        log_index: LogIndex,
    ) -> NextLogIndex {
        let message = (chain_id, committee, log_index).try_to_vec().unwrap();
        NextLogIndex {
            chain_id,
            committee,
            log_index,
            sender: keypair.public().to_bytes(),
            signature: keypair.sign(&message),
        }
    }

    /// Check that this message was signed by `sender` and claims to come from it.
    pub(crate) fn is_from(&self, sender: &VerifyingKey) -> bool {
        self.sender == sender.to_bytes() && self.is_correct(sender)
    }
}

impl SignedMessage for NextLogIndex {
    fn message_bytes(&self) -> Vec<u8> {
        (self.chain_id, self.committee, self.log_index)
            .try_to_vec()
            .unwrap()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}
