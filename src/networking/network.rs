/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! [Trait definition](Network) for pluggable peer-to-peer networking.

use std::fmt::{self, Display, Formatter};

use crate::types::{crypto_primitives::VerifyingKey, data_types::PeeringID};

use super::messages::{PeerMessageData, PeerMessageIn, ReceiverTag};

/// Closure invoked by the network provider for every message delivered to an attached receiver.
///
/// Handlers must not block: the chain node's handlers only forward the message into the node's inbox.
pub type PeerMessageHandler = Box<dyn Fn(PeerMessageIn) + Send>;

/// Handle returned by [`Network::attach`], used to [`detach`](Network::detach) the handler later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttachID(pub u64);

pub trait Network: Clone + Send + 'static {
    /// Start delivering messages addressed to `(peering_id, receiver)` to `handler`.
    ///
    /// An error means the peering domain could not be opened, which prevents the chain from starting.
    fn attach(
        &mut self,
        peering_id: &PeeringID,
        receiver: ReceiverTag,
        handler: PeerMessageHandler,
    ) -> Result<AttachID, NetworkError>;

    /// Stop delivering messages to a previously attached handler.
    fn detach(&mut self, attach_id: AttachID);

    /// Send a message to the specified peer without blocking.
    fn send(&mut self, peer: VerifyingKey, message: PeerMessageData);
}

/// Error returned by a [`Network`] provider that fails to open a peering domain.
#[derive(Debug)]
pub enum NetworkError {
    DomainUnavailable { peering_id: PeeringID, reason: String },
}

impl Display for NetworkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::DomainUnavailable { peering_id, reason } => {
                write!(f, "cannot open peering domain {}: {}", peering_id, reason)
            }
        }
    }
}
