use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use anchor_chain::{
    networking::{
        messages::{PeerMessageData, PeerMessageIn, ReceiverTag},
        network::{AttachID, Network, NetworkError, PeerMessageHandler},
    },
    types::{crypto_primitives::VerifyingKey, data_types::PeeringID},
};

struct Route {
    attach_id: AttachID,
    peering_id: PeeringID,
    receiver: ReceiverTag,
    handler: PeerMessageHandler,
}

/// A mock network stub which delivers messages by calling the handlers attached by the recipient.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    my_verifying_key: VerifyingKey,
    routes: Arc<Mutex<HashMap<VerifyingKey, Vec<Route>>>>,
    next_attach_id: Arc<AtomicU64>,
    available: bool,
}

impl NetworkStub {
    /// Whether a handler of this stub's owner is attached to `peering_id`.
    pub(crate) fn is_attached(&self, peering_id: &PeeringID) -> bool {
        let routes = self.routes.lock().unwrap();
        routes
            .get(&self.my_verifying_key)
            .map(|routes| routes.iter().any(|route| route.peering_id == *peering_id))
            .unwrap_or(false)
    }
}

impl Network for NetworkStub {
    fn attach(
        &mut self,
        peering_id: &PeeringID,
        receiver: ReceiverTag,
        handler: PeerMessageHandler,
    ) -> Result<AttachID, NetworkError> {
        if !self.available {
            return Err(NetworkError::DomainUnavailable {
                peering_id: *peering_id,
                reason: String::from("no route to peers"),
            });
        }
        let attach_id = AttachID(self.next_attach_id.fetch_add(1, Ordering::SeqCst));
        self.routes
            .lock()
            .unwrap()
            .entry(self.my_verifying_key)
            .or_default()
            .push(Route {
                attach_id,
                peering_id: *peering_id,
                receiver,
                handler,
            });
        Ok(attach_id)
    }

    fn detach(&mut self, attach_id: AttachID) {
        if let Some(routes) = self.routes.lock().unwrap().get_mut(&self.my_verifying_key) {
            routes.retain(|route| route.attach_id != attach_id);
        }
    }

    fn send(&mut self, peer: VerifyingKey, message: PeerMessageData) {
        let routes = self.routes.lock().unwrap();
        if let Some(routes) = routes.get(&peer) {
            routes
                .iter()
                .filter(|route| {
                    route.peering_id == message.peering_id && route.receiver == message.receiver
                })
                .for_each(|route| {
                    (route.handler)(PeerMessageIn {
                        sender: self.my_verifying_key,
                        data: message.clone(),
                    })
                });
        }
    }
}

pub(crate) fn mock_network(peers: impl Iterator<Item = VerifyingKey>) -> Vec<NetworkStub> {
    let routes = Arc::new(Mutex::new(HashMap::new()));
    let next_attach_id = Arc::new(AtomicU64::new(0));
    peers
        .map(|my_verifying_key| NetworkStub {
            my_verifying_key,
            routes: routes.clone(),
            next_attach_id: next_attach_id.clone(),
            available: true,
        })
        .collect()
}

/// A network stub that cannot open any peering domain.
pub(crate) fn unavailable_network(my_verifying_key: VerifyingKey) -> NetworkStub {
    NetworkStub {
        my_verifying_key,
        routes: Arc::new(Mutex::new(HashMap::new())),
        next_attach_id: Arc::new(AtomicU64::new(0)),
        available: false,
    }
}
