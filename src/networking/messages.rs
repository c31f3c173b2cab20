//! Envelopes of the messages exchanged between peers.

use borsh::BorshSerialize;

use crate::types::{crypto_primitives::VerifyingKey, data_types::PeeringID};

/// Identifies the component that a message is addressed to inside a peering group.
pub type ReceiverTag = u8;

/// Tag of the messages exchanged between the [chain managers](crate::chain_manager) of a chain.
pub const RECEIVER_CHAIN_MGR: ReceiverTag = 1;

/// An addressed, encoded message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerMessageData {
    pub peering_id: PeeringID,
    pub receiver: ReceiverTag,
    pub msg_type: u8,
    pub data: Vec<u8>,
}

impl PeerMessageData {
    /// Encode `msg` into a `PeerMessageData` using Borsh.
    pub fn encode<M: BorshSerialize>(
        peering_id: PeeringID,
        receiver: ReceiverTag,
        msg_type: u8,
        msg: &M,
    ) -> PeerMessageData {
        PeerMessageData {
            peering_id,
            receiver,
            msg_type,
            data: msg.try_to_vec().unwrap(),
        }
    }
}

/// A message received from `sender`.
#[derive(Clone, Debug)]
pub struct PeerMessageIn {
    pub sender: VerifyingKey,
    pub data: PeerMessageData,
}
