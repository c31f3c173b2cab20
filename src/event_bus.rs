/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The thread that runs user-registered and logging event handlers.

use crate::events::*;
use crate::logging::Logger;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

pub(crate) struct EventHandlers {
    pub(crate) receive_anchor_handlers: Vec<HandlerPtr<ReceiveAnchorEvent>>,
    pub(crate) publish_tx_handlers: Vec<HandlerPtr<PublishTxEvent>>,
    pub(crate) tx_publish_result_handlers: Vec<HandlerPtr<TxPublishResultEvent>>,
    pub(crate) update_local_view_handlers: Vec<HandlerPtr<UpdateLocalViewEvent>>,
    pub(crate) start_consensus_handlers: Vec<HandlerPtr<StartConsensusEvent>>,
    pub(crate) end_consensus_handlers: Vec<HandlerPtr<EndConsensusEvent>>,
    pub(crate) consensus_recover_handlers: Vec<HandlerPtr<ConsensusRecoverEvent>>,
    pub(crate) update_committee_handlers: Vec<HandlerPtr<UpdateCommitteeEvent>>,
    pub(crate) update_access_nodes_handlers: Vec<HandlerPtr<UpdateAccessNodesEvent>>,
    pub(crate) update_server_nodes_handlers: Vec<HandlerPtr<UpdateServerNodesEvent>>,
    pub(crate) track_state_handlers: Vec<HandlerPtr<TrackStateEvent>>,
    pub(crate) resolve_receipt_handlers: Vec<HandlerPtr<ResolveReceiptEvent>>,
}

/// Put the default logger (if `log_events`) and the user's handler (if any) into a handler list.
fn handlers<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger());
    }
    handlers.extend(user_handler);
    handlers
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        receive_anchor_handler: Option<HandlerPtr<ReceiveAnchorEvent>>,
        publish_tx_handler: Option<HandlerPtr<PublishTxEvent>>,
        tx_publish_result_handler: Option<HandlerPtr<TxPublishResultEvent>>,
        update_local_view_handler: Option<HandlerPtr<UpdateLocalViewEvent>>,
        start_consensus_handler: Option<HandlerPtr<StartConsensusEvent>>,
        end_consensus_handler: Option<HandlerPtr<EndConsensusEvent>>,
        consensus_recover_handler: Option<HandlerPtr<ConsensusRecoverEvent>>,
        update_committee_handler: Option<HandlerPtr<UpdateCommitteeEvent>>,
        update_access_nodes_handler: Option<HandlerPtr<UpdateAccessNodesEvent>>,
        update_server_nodes_handler: Option<HandlerPtr<UpdateServerNodesEvent>>,
        track_state_handler: Option<HandlerPtr<TrackStateEvent>>,
        resolve_receipt_handler: Option<HandlerPtr<ResolveReceiptEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            receive_anchor_handlers: handlers(log_events, receive_anchor_handler),
            publish_tx_handlers: handlers(log_events, publish_tx_handler),
            tx_publish_result_handlers: handlers(log_events, tx_publish_result_handler),
            update_local_view_handlers: handlers(log_events, update_local_view_handler),
            start_consensus_handlers: handlers(log_events, start_consensus_handler),
            end_consensus_handlers: handlers(log_events, end_consensus_handler),
            consensus_recover_handlers: handlers(log_events, consensus_recover_handler),
            update_committee_handlers: handlers(log_events, update_committee_handler),
            update_access_nodes_handlers: handlers(log_events, update_access_nodes_handler),
            update_server_nodes_handlers: handlers(log_events, update_server_nodes_handler),
            track_state_handlers: handlers(log_events, track_state_handler),
            resolve_receipt_handlers: handlers(log_events, resolve_receipt_handler),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.receive_anchor_handlers.is_empty()
            && self.publish_tx_handlers.is_empty()
            && self.tx_publish_result_handlers.is_empty()
            && self.update_local_view_handlers.is_empty()
            && self.start_consensus_handlers.is_empty()
            && self.end_consensus_handlers.is_empty()
            && self.consensus_recover_handlers.is_empty()
            && self.update_committee_handlers.is_empty()
            && self.update_access_nodes_handlers.is_empty()
            && self.update_server_nodes_handlers.is_empty()
            && self.track_state_handlers.is_empty()
            && self.resolve_receipt_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::ReceiveAnchor(receive_anchor_event) =>
                self.receive_anchor_handlers.iter().for_each(|handler| handler(&receive_anchor_event)),

            Event::PublishTx(publish_tx_event) =>
                self.publish_tx_handlers.iter().for_each(|handler| handler(&publish_tx_event)),

            Event::TxPublishResult(tx_publish_result_event) =>
                self.tx_publish_result_handlers.iter().for_each(|handler| handler(&tx_publish_result_event)),

            Event::UpdateLocalView(update_local_view_event) =>
                self.update_local_view_handlers.iter().for_each(|handler| handler(&update_local_view_event)),

            Event::StartConsensus(start_consensus_event) =>
                self.start_consensus_handlers.iter().for_each(|handler| handler(&start_consensus_event)),

            Event::EndConsensus(end_consensus_event) =>
                self.end_consensus_handlers.iter().for_each(|handler| handler(&end_consensus_event)),

            Event::ConsensusRecover(consensus_recover_event) =>
                self.consensus_recover_handlers.iter().for_each(|handler| handler(&consensus_recover_event)),

            Event::UpdateCommittee(update_committee_event) =>
                self.update_committee_handlers.iter().for_each(|handler| handler(&update_committee_event)),

            Event::UpdateAccessNodes(update_access_nodes_event) =>
                self.update_access_nodes_handlers.iter().for_each(|handler| handler(&update_access_nodes_event)),

            Event::UpdateServerNodes(update_server_nodes_event) =>
                self.update_server_nodes_handlers.iter().for_each(|handler| handler(&update_server_nodes_event)),

            Event::TrackState(track_state_event) =>
                self.track_state_handlers.iter().for_each(|handler| handler(&track_state_event)),

            Event::ResolveReceipt(resolve_receipt_event) =>
                self.resolve_receipt_handlers.iter().for_each(|handler| handler(&resolve_receipt_event)),
        }
    }
}

pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("event_bus thread disconnected from main thread")
            }
        }

        match event_subscriber.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            // The reactor (event publisher) exited; wait for the shutdown signal.
            Err(RecvTimeoutError::Disconnected) => thread::sleep(Duration::from_millis(50)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::data_types::TransactionID;
    use std::sync::{mpsc, Arc, Mutex};
    use std::time::SystemTime;

    #[test]
    fn user_handlers_are_fired_on_the_bus_thread() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let handler: HandlerPtr<TxPublishResultEvent> = Box::new(move |event: &TxPublishResultEvent| {
            recorder.lock().unwrap().push((event.tx_id, event.confirmed))
        });
        let event_handlers = EventHandlers::new(
            false, None, None, Some(handler), None, None, None, None, None, None, None, None, None,
        );
        assert!(!event_handlers.is_empty());
        assert!(EventHandlers::new(
            false, None, None, None, None, None, None, None, None, None, None, None, None,
        )
        .is_empty());

        let (publisher, subscriber) = mpsc::channel();
        let (shutdown, shutdown_receiver) = mpsc::channel();
        let bus = start_event_bus(event_handlers, subscriber, shutdown_receiver);

        let tx_id = TransactionID::new([3; 32]);
        Event::publish(
            &Some(publisher),
            Event::TxPublishResult(TxPublishResultEvent {
                timestamp: SystemTime::now(),
                tx_id,
                confirmed: true,
            }),
        );
        while seen.lock().unwrap().is_empty() {
            thread::sleep(Duration::from_millis(5));
        }
        shutdown.send(()).unwrap();
        bus.join().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(tx_id, true)]);
    }
}
