/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The node's private, tentative chain of anchor outputs.
//!
//! A [`LocalView`] decides, without consulting any external store, which anchor output the next
//! consensus round should be built on. It is a cache of intent: the base ledger remains the source of
//! truth, so every unexpected input degrades into a no-op or a reset, never an error.
//!
//! ## Entries
//!
//! The view is an ordered sequence of entries, oldest first:
//! 1. The head is the latest anchor output the base ledger confirmed.
//! 2. Every following entry was produced by a transaction of this node that consumes the entry before it,
//!    and whose confirmation has not been observed yet.
//!
//! An entry is marked `rejected` when the base ledger rejects the transaction that produced it. Every
//! entry after a rejected one is built on it, and is therefore marked rejected too.
//!
//! ## Base anchor
//!
//! [`base_anchor`](LocalView::base_anchor) returns the tail of the sequence, provided that no entry in
//! the sequence is rejected. A single rejection anywhere blocks proposals until the base ledger confirms
//! an output, which either lands on a known entry (the rejected suffix is dropped) or on an unknown one
//! (the sequence is reset). A holder of the view that still knows the latest confirmed output can check
//! [`all_pending_rejected`](LocalView::all_pending_rejected) and re-apply that output, since the base
//! ledger does not announce an output again just because a transaction consuming it was rejected.

use crate::types::{anchor::AnchorOutput, data_types::OutputID};

struct LocalViewEntry {
    output: AnchorOutput,
    rejected: bool,
}

/// See the [module-level documentation](self).
pub struct LocalView {
    entries: Vec<LocalViewEntry>,
}

impl LocalView {
    pub fn new() -> LocalView {
        LocalView {
            entries: Vec::new(),
        }
    }

    /// Handle the base ledger confirming `confirmed`.
    ///
    /// If `confirmed` is known, every entry before it is dropped and it becomes the head. Otherwise the
    /// view is reset to contain only `confirmed`.
    pub fn anchor_received(&mut self, confirmed: &AnchorOutput) {
        match self.position(&confirmed.output_id) {
            Some(pos) => {
                self.entries.drain(..pos);
                let head = &mut self.entries[0];
                head.output = confirmed.clone();
                head.rejected = false;
                if let Some(first_rejected) = self.entries.iter().position(|e| e.rejected) {
                    log::debug!(
                        "LocalView: dropping {} rejected entries after {}",
                        self.entries.len() - first_rejected,
                        confirmed.output_id
                    );
                    self.entries.truncate(first_rejected);
                }
            }
            None => {
                if !self.entries.is_empty() {
                    log::debug!(
                        "LocalView: unknown anchor {} confirmed, resetting {} entries",
                        confirmed.output_id,
                        self.entries.len()
                    );
                }
                self.entries.clear();
                self.entries.push(LocalViewEntry {
                    output: confirmed.clone(),
                    rejected: false,
                });
            }
        }
    }

    /// Handle the base ledger rejecting the transaction that produces `rejected`.
    ///
    /// Unknown outputs are ignored. If every entry ends up rejected, the view is cleared.
    pub fn anchor_rejected(&mut self, rejected: &OutputID) {
        let Some(pos) = self.position(rejected) else {
            log::debug!("LocalView: ignoring rejection of unknown anchor {}", rejected);
            return;
        };
        for entry in &mut self.entries[pos..] {
            entry.rejected = true;
        }
        if self.entries.iter().all(|e| e.rejected) {
            self.entries.clear();
        }
    }

    /// Handle this node producing a transaction that consumes `consumed` and produces `published`.
    ///
    /// Only applies if `consumed` is the current tail and `published` is not in the view yet. Anything
    /// else is a stale or duplicate callback and is ignored.
    pub fn anchor_published(&mut self, consumed: &OutputID, published: &AnchorOutput) {
        if self.position(&published.output_id).is_some() {
            log::debug!("LocalView: ignoring duplicate publication of {}", published.output_id);
            return;
        }
        let rejected = match self.entries.last() {
            Some(tail) if tail.output.output_id == *consumed => tail.rejected,
            _ => {
                log::debug!(
                    "LocalView: ignoring publication of {} built on non-tail {}",
                    published.output_id,
                    consumed
                );
                return;
            }
        };
        self.entries.push(LocalViewEntry {
            output: published.clone(),
            rejected,
        })
    }

    /// Get the anchor output the next consensus round should be built on.
    ///
    /// Returns `None` if no anchor output was confirmed yet, or if any entry is rejected.
    pub fn base_anchor(&self) -> Option<&AnchorOutput> {
        if self.entries.iter().any(|e| e.rejected) {
            return None;
        }
        self.entries.last().map(|e| &e.output)
    }

    /// Get the output ID of the [`base_anchor`](Self::base_anchor).
    pub fn base_anchor_id(&self) -> Option<OutputID> {
        self.base_anchor().map(|ao| ao.output_id)
    }

    /// Whether the head is intact and every entry after it was rejected, i.e. nothing this node
    /// published is still pending.
    pub fn all_pending_rejected(&self) -> bool {
        match self.entries.split_first() {
            Some((head, pending)) => {
                !head.rejected && !pending.is_empty() && pending.iter().all(|e| e.rejected)
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn status_string(&self) -> String {
        let rejected = self.entries.iter().filter(|e| e.rejected).count();
        match self.base_anchor() {
            Some(base) => format!(
                "LocalView {{ entries: {}, rejected: {}, base: {}@{} }}",
                self.entries.len(),
                rejected,
                base.output_id,
                base.state_index
            ),
            None => format!(
                "LocalView {{ entries: {}, rejected: {}, base: none }}",
                self.entries.len(),
                rejected
            ),
        }
    }

    fn position(&self, output_id: &OutputID) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.output.output_id == *output_id)
    }
}

impl Default for LocalView {
    fn default() -> Self {
        Self::new()
    }
}
