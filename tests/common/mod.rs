#![allow(dead_code)]

pub(crate) mod logging;

pub(crate) mod mock_consensus;

pub(crate) mod mock_ledger;

pub(crate) mod mock_mempool;

pub(crate) mod mock_network;

pub(crate) mod mock_state;

use std::{
    thread,
    time::{Duration, Instant},
};

/// Poll `condition` until it holds, panicking with `what` if it does not within 10 seconds.
pub(crate) fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        if Instant::now() > deadline {
            panic!("timed out waiting until {}", what);
        }
        thread::sleep(Duration::from_millis(10));
    }
}
