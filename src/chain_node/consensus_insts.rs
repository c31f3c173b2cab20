/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The table of consensus instances a chain node runs, keyed by committee address and log index.
//!
//! Instances are created ahead of need: when the instance at log index `li` is needed, the instances at
//! `li + 1, ..., li + depth - 1` are created as well, so that they can start exchanging messages with
//! peers that are ahead.
//!
//! After every creation, the instances of the same committee that trail the needed log index by `depth`
//! or more, and that were not given input, are cancelled and dropped. An instance that was given input
//! is only finished by its own output or recovery. A finished instance stays in the table as a
//! tombstone, so that its key is never given input again, until it falls behind the needed log index
//! like any other instance.

use std::collections::{BTreeMap, HashMap};

use crate::{
    cancellation::CancellationToken,
    chain_manager::types::NeedConsensus,
    types::{
        committee::Committee,
        data_types::{CommitteeAddress, LogIndex},
    },
};

pub(crate) struct ConsensusInst<I> {
    pub(crate) cancel: CancellationToken,
    pub(crate) instance: I,
    /// The request the instance was given as input, if any.
    pub(crate) request: Option<NeedConsensus>,
    /// Set once the instance produced an output or gave up.
    pub(crate) finished: bool,
}

pub(crate) struct ConsensusInsts<I> {
    depth: u32,
    insts: HashMap<CommitteeAddress, BTreeMap<LogIndex, ConsensusInst<I>>>,
}

impl<I> ConsensusInsts<I> {
    pub(crate) fn new(depth: usize) -> ConsensusInsts<I> {
        ConsensusInsts {
            depth: depth.max(1) as u32,
            insts: HashMap::new(),
        }
    }

    /// Make sure the instances `log_index, ..., log_index + depth - 1` of `committee` exist, creating the
    /// missing ones with `create`, and return the instance at `log_index`.
    pub(crate) fn ensure<F>(
        &mut self,
        committee: &Committee,
        log_index: LogIndex,
        mut create: F,
    ) -> &mut ConsensusInst<I>
    where
        F: FnMut(&Committee, LogIndex) -> (CancellationToken, I),
    {
        let mut created = false;
        {
            let insts = self.insts.entry(committee.address).or_insert_with(BTreeMap::new);
            for offset in 0..self.depth {
                let li = log_index + offset;
                if !insts.contains_key(&li) {
                    let (cancel, instance) = create(committee, li);
                    insts.insert(
                        li,
                        ConsensusInst {
                            cancel,
                            instance,
                            request: None,
                            finished: false,
                        },
                    );
                    created = true;
                }
            }
        }
        if created {
            self.collect_garbage(&committee.address, log_index);
        }

        self.insts
            .get_mut(&committee.address)
            .and_then(|insts| insts.get_mut(&log_index))
            .expect("instance at the needed log index exists after creation")
    }

    /// Cancel and drop the instances of `committee` that were not given input, or that finished, and whose
    /// log index is at least `depth` below `log_index`. Returns how many were dropped.
    pub(crate) fn collect_garbage(&mut self, committee: &CommitteeAddress, log_index: LogIndex) -> usize {
        let depth = self.depth;
        let Some(insts) = self.insts.get_mut(committee) else {
            return 0;
        };
        let before = insts.len();
        insts.retain(|li, inst| {
            let superseded = li.int() + depth <= log_index.int();
            if superseded && (inst.request.is_none() || inst.finished) {
                inst.cancel.cancel();
                false
            } else {
                true
            }
        });
        let dropped = before - insts.len();
        if dropped > 0 {
            log::debug!(
                "Dropped {} superseded consensus instances of committee {} below log index {}",
                dropped,
                committee,
                log_index
            );
        }
        dropped
    }

    /// Cancel the instance `(committee, log_index)` and leave a tombstone in its place. Returns `false`
    /// if there is no such instance or it already finished, in which case its output is stale.
    pub(crate) fn finish(&mut self, committee: &CommitteeAddress, log_index: LogIndex) -> bool {
        match self
            .insts
            .get_mut(committee)
            .and_then(|insts| insts.get_mut(&log_index))
        {
            Some(inst) if !inst.finished => {
                inst.finished = true;
                inst.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel and drop every instance that was not given input.
    pub(crate) fn cancel_uninput(&mut self) {
        for insts in self.insts.values_mut() {
            insts.retain(|_, inst| {
                if inst.request.is_none() {
                    inst.cancel.cancel();
                    false
                } else {
                    true
                }
            });
        }
        self.insts.retain(|_, insts| !insts.is_empty());
    }

    /// Instances that have not finished.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ConsensusInst<I>> {
        self.insts
            .values_mut()
            .flat_map(|insts| insts.values_mut())
            .filter(|inst| !inst.finished)
    }

    pub(crate) fn len(&self) -> usize {
        self.insts.values().map(BTreeMap::len).sum()
    }

    #[cfg(test)]
    fn get(&self, committee: &CommitteeAddress, log_index: LogIndex) -> Option<&ConsensusInst<I>> {
        self.insts.get(committee).and_then(|insts| insts.get(&log_index))
    }

    /// Get the log indices of the instances of `committee`, tombstones included, in ascending order.
    #[cfg(test)]
    fn log_indices(&self, committee: &CommitteeAddress) -> Vec<LogIndex> {
        self.insts
            .get(committee)
            .map(|insts| insts.keys().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn status_string(&self) -> String {
        let committees: Vec<String> = self
            .insts
            .iter()
            .map(|(committee, insts)| {
                let lis: Vec<String> = insts
                    .iter()
                    .map(|(li, inst)| match (inst.finished, inst.request.is_some()) {
                        (true, _) => format!("{}.", li),
                        (false, true) => format!("{}*", li),
                        (false, false) => li.to_string(),
                    })
                    .collect();
                format!("{}: [{}]", committee, lis.join(" "))
            })
            .collect();
        format!("Consensus {{ {} instances, {} }}", self.len(), committees.join(", "))
    }
}
