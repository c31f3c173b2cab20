/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tracking how a chain's state evolves as anchor outputs come and go.
//!
//! A [`StateTracker`] bridges "there is a new anchor output" to "the state at that anchor is known". When
//! told to [track](StateTracker::track_anchor) an anchor, it asks the
//! [state manager](crate::pluggables::StateManager) for the diff between the last anchor whose state it
//! knows and the new one. When the diff arrives it:
//! 1. Invokes its step handler with the new state, the previous and the new anchor, and the added and
//!    removed blocks.
//! 2. Remembers the new anchor and state.
//! 3. Lets its [`AwaitReceipt`](await_receipt::AwaitReceipt) registry resolve pending receipt queries.
//!
//! At most one diff fetch is outstanding at any time. Tracking a different anchor while a fetch is in
//! flight cancels that fetch, so that diffs are never applied out of order.
//!
//! A chain node runs two trackers: one following the [active](StateTrackerKind::Active) state (the base
//! anchors consensus builds on), one following the [confirmed](StateTrackerKind::Confirmed) state.

pub mod await_receipt;

mod implementation;
pub use implementation::*;
