/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Implementation of the [`StateTracker`].

use std::{
    fmt::{self, Display, Formatter},
    sync::mpsc::{Receiver, TryRecvError},
};

use crate::{
    cancellation::CancellationToken,
    pluggables::{StateDiff, StateManager},
    types::{anchor::AnchorOutput, block::Block, state::StateHandle},
};

use super::await_receipt::{AwaitReceipt, AwaitReceiptQuery};

/// Which state a [`StateTracker`] follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateTrackerKind {
    /// The state at the latest anchor output a consensus round was built on.
    Active,
    /// The state at the latest anchor output confirmed by the base ledger.
    Confirmed,
}

impl Display for StateTrackerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StateTrackerKind::Active => write!(f, "ACT"),
            StateTrackerKind::Confirmed => write!(f, "CNF"),
        }
    }
}

/// One completed state transition.
pub struct StateTrackerStep {
    pub state: StateHandle,
    pub from: Option<AnchorOutput>,
    pub till: AnchorOutput,
    pub added: Vec<Block>,
    pub removed: Vec<Block>,
}

pub type StepHandler = Box<dyn FnMut(&StateTrackerStep) + Send>;

pub struct StateTracker<S: StateManager> {
    kind: StateTrackerKind,
    state_mgr: S,
    cancel: CancellationToken,
    on_step: StepHandler,

    have_anchor: Option<AnchorOutput>,
    have_state: Option<StateHandle>,

    next_anchor: Option<AnchorOutput>,
    pending: Option<(CancellationToken, Receiver<StateDiff>)>,

    await_receipt: AwaitReceipt,
}

impl<S: StateManager> StateTracker<S> {
    /// Create a tracker whose fetches are derived from `cancel`.
    pub fn new(
        kind: StateTrackerKind,
        state_mgr: S,
        cancel: CancellationToken,
        await_receipt_cleanup_every: usize,
        on_step: StepHandler,
    ) -> StateTracker<S> {
        StateTracker {
            kind,
            state_mgr,
            cancel,
            on_step,
            have_anchor: None,
            have_state: None,
            next_anchor: None,
            pending: None,
            await_receipt: AwaitReceipt::new(await_receipt_cleanup_every),
        }
    }

    /// Start tracking `anchor`.
    ///
    /// A no-op if `anchor` is being fetched already. If the state at `anchor` is known, any fetch in
    /// flight is cancelled. Otherwise any fetch in flight is cancelled and a fetch for `anchor` is
    /// started.
    pub fn track_anchor(&mut self, anchor: &AnchorOutput) {
        if self.next_anchor.as_ref() == Some(anchor) {
            return;
        }
        self.cancel_pending();
        if self.have_anchor.as_ref() == Some(anchor) {
            return;
        }

        log::debug!(
            "{} tracker: fetching state diff {:?} -> {}@{}",
            self.kind,
            self.have_anchor.as_ref().map(|ao| ao.output_id),
            anchor.output_id,
            anchor.state_index
        );
        let cancel = self.cancel.child();
        let response =
            self.state_mgr
                .fetch_state_diff(cancel.clone(), self.have_anchor.clone(), anchor.clone());
        self.next_anchor = Some(anchor.clone());
        self.pending = Some((cancel, response));
    }

    /// Check, without blocking, whether the fetch in flight completed.
    ///
    /// A fetch whose sender was dropped without a response was aborted, and is forgotten.
    pub fn try_recv_response(&mut self) -> Option<StateDiff> {
        let (_, response) = self.pending.as_ref()?;
        match response.try_recv() {
            Ok(diff) => Some(diff),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log::debug!(
                    "{} tracker: state diff fetch for {:?} aborted",
                    self.kind,
                    self.next_anchor.as_ref().map(|ao| ao.output_id)
                );
                self.cancel_pending();
                None
            }
        }
    }

    /// Apply the response of the fetch in flight.
    ///
    /// Returns the number of receipt queries the new state resolved.
    pub fn handle_response(&mut self, diff: StateDiff) -> usize {
        if let Some((cancel, _)) = self.pending.take() {
            cancel.cancel();
        }
        let Some(till) = self.next_anchor.take() else {
            return 0;
        };

        let step = StateTrackerStep {
            state: diff.state,
            from: self.have_anchor.take(),
            till,
            added: diff.added,
            removed: diff.removed,
        };
        (self.on_step)(&step);

        self.have_anchor = Some(step.till);
        self.have_state = Some(step.state.clone());
        self.await_receipt.consider_state(step.state, &step.added)
    }

    /// Register `query` with this tracker's [`AwaitReceipt`] registry.
    ///
    /// Returns whether the query was resolved immediately.
    pub fn await_request_receipt(&mut self, query: AwaitReceiptQuery) -> bool {
        self.await_receipt.await_receipt(query)
    }

    pub fn kind(&self) -> StateTrackerKind {
        self.kind
    }

    pub fn have_anchor(&self) -> Option<&AnchorOutput> {
        self.have_anchor.as_ref()
    }

    pub fn have_state(&self) -> Option<&StateHandle> {
        self.have_state.as_ref()
    }

    pub fn is_fetching(&self) -> bool {
        self.pending.is_some()
    }

    pub fn status_string(&self) -> String {
        format!(
            "{} {{ have: {}, next: {}, awaiting: {} }}",
            self.kind,
            anchor_status(self.have_anchor.as_ref()),
            anchor_status(self.next_anchor.as_ref()),
            self.await_receipt.len()
        )
    }

    fn cancel_pending(&mut self) {
        if let Some((cancel, _)) = self.pending.take() {
            cancel.cancel();
        }
        self.next_anchor = None;
    }
}

fn anchor_status(anchor: Option<&AnchorOutput>) -> String {
    match anchor {
        Some(ao) => format!("{}@{}", ao.output_id, ao.state_index),
        None => String::from("none"),
    }
}
