//! Functions and types for sending messages to the P2P network.

use crate::{
    chain_manager::{messages::ChainMgrMessage, types::OutMessage},
    types::{crypto_primitives::VerifyingKey, data_types::PeeringID},
};

use super::{
    messages::{PeerMessageData, RECEIVER_CHAIN_MGR},
    network::{AttachID, Network},
};

/// Handle for sending the chain manager's messages to the [`Network`], scoped to one peering group.
#[derive(Clone)]
pub(crate) struct SenderHandle<N: Network> {
    network: N,
    peering_id: PeeringID,
}

impl<N: Network> SenderHandle<N> {
    pub(crate) fn new(network: N, peering_id: PeeringID) -> Self {
        Self {
            network,
            peering_id,
        }
    }

    pub(crate) fn send(&mut self, peer: VerifyingKey, msg: &ChainMgrMessage) {
        let data =
            PeerMessageData::encode(self.peering_id, RECEIVER_CHAIN_MGR, msg.msg_type(), msg);
        self.network.send(peer, data)
    }

    /// Send every message in `msgs` to its recipient.
    pub(crate) fn send_all(&mut self, msgs: Vec<OutMessage>) {
        for out in msgs {
            self.send(out.recipient, &out.message)
        }
    }

    pub(crate) fn detach(&mut self, attach_id: AttachID) {
        self.network.detach(attach_id)
    }
}
