use std::{
    sync::{Arc, Mutex},
    time::SystemTime,
};

use anchor_chain::{
    cancellation::CancellationToken,
    pluggables::{
        CommitteeRegistry, ConsensusInstance, ConsensusOutput, ConsensusOutputCallback,
        ConsensusParams, ConsensusProvider, ConsensusRecoverCallback,
    },
    types::{
        anchor::AnchorOutput,
        committee::Committee,
        crypto_primitives::{CryptoHasher, Digest},
        data_types::{CommitteeAddress, CryptoHash, LogIndex, OutputID, StateIndex},
        transaction::Transaction,
    },
};

/// What the test knows about one consensus instance created by the chain node.
pub(crate) struct InstanceRecord {
    pub(crate) committee: CommitteeAddress,
    pub(crate) log_index: LogIndex,
    pub(crate) cancel: CancellationToken,
    pub(crate) base_anchor: Option<AnchorOutput>,
    pub(crate) times: Vec<SystemTime>,
    /// The rotation target the instance was created with, followed by every later suggestion.
    pub(crate) rotations: Vec<Option<CommitteeAddress>>,
    on_output: Option<ConsensusOutputCallback>,
    on_recover: Option<ConsensusRecoverCallback>,
}

/// A consensus provider whose instances either decide right away (while their base anchor is below
/// `decide_below`), or wait for the test to decide, skip or recover them.
#[derive(Clone)]
pub(crate) struct MockConsensus {
    records: Arc<Mutex<Vec<InstanceRecord>>>,
    decide_below: Option<StateIndex>,
}

impl MockConsensus {
    pub(crate) fn manual() -> MockConsensus {
        MockConsensus {
            records: Arc::new(Mutex::new(Vec::new())),
            decide_below: None,
        }
    }

    pub(crate) fn deciding_below(state_index: StateIndex) -> MockConsensus {
        MockConsensus {
            records: Arc::new(Mutex::new(Vec::new())),
            decide_below: Some(state_index),
        }
    }

    /// Read the newest instance created at `log_index`.
    pub(crate) fn with_instance<T>(
        &self,
        log_index: LogIndex,
        read: impl FnOnce(&InstanceRecord) -> T,
    ) -> Option<T> {
        let records = self.records.lock().unwrap();
        records
            .iter()
            .rev()
            .find(|record| record.log_index == log_index)
            .map(read)
    }

    pub(crate) fn has_input(&self, log_index: LogIndex) -> bool {
        self.with_instance(log_index, |record| record.base_anchor.is_some())
            .unwrap_or(false)
    }

    pub(crate) fn is_cancelled(&self, log_index: LogIndex) -> bool {
        self.with_instance(log_index, |record| record.cancel.is_cancelled())
            .unwrap_or(false)
    }

    /// The base anchors of every instance created at `log_index` that was given input, oldest first.
    pub(crate) fn inputs_at(&self, log_index: LogIndex) -> Vec<OutputID> {
        let records = self.records.lock().unwrap();
        records
            .iter()
            .filter(|record| record.log_index == log_index)
            .filter_map(|record| record.base_anchor.as_ref().map(AnchorOutput::id))
            .collect()
    }

    /// Whether an instance at `log_index` or above was given `base` as input.
    pub(crate) fn has_input_on(&self, from: LogIndex, base: &OutputID) -> bool {
        let records = self.records.lock().unwrap();
        records.iter().any(|record| {
            record.log_index >= from
                && record.base_anchor.as_ref().map(AnchorOutput::id) == Some(*base)
        })
    }

    /// Log indices of all instances that were created and not cancelled yet.
    pub(crate) fn live_log_indices(&self) -> Vec<LogIndex> {
        let records = self.records.lock().unwrap();
        let mut live: Vec<LogIndex> = records
            .iter()
            .filter(|record| !record.cancel.is_cancelled())
            .map(|record| record.log_index)
            .collect();
        live.sort();
        live
    }

    /// Make the instance at `log_index` decide the transaction built by [`next_transaction`].
    pub(crate) fn decide(&self, log_index: LogIndex) -> Option<Transaction> {
        let (callback, base_anchor) = self.take_callbacks(log_index, true)?;
        let transaction = next_transaction(&base_anchor, log_index);
        (callback.0.expect("output callback"))(ConsensusOutput::Done {
            transaction: transaction.clone(),
        });
        Some(transaction)
    }

    pub(crate) fn skip(&self, log_index: LogIndex) -> bool {
        match self.take_callbacks(log_index, true) {
            Some((callback, _)) => {
                (callback.0.expect("output callback"))(ConsensusOutput::Skipped);
                true
            }
            None => false,
        }
    }

    pub(crate) fn recover(&self, log_index: LogIndex) -> bool {
        match self.take_callbacks(log_index, false) {
            Some((callback, _)) => {
                (callback.1.expect("recover callback"))();
                true
            }
            None => false,
        }
    }

    #[allow(clippy::type_complexity)]
    fn take_callbacks(
        &self,
        log_index: LogIndex,
        output: bool,
    ) -> Option<(
        (Option<ConsensusOutputCallback>, Option<ConsensusRecoverCallback>),
        AnchorOutput,
    )> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .rev()
            .find(|record| record.log_index == log_index && record.base_anchor.is_some())?;
        let base_anchor = record.base_anchor.clone()?;
        let callbacks = if output {
            (Some(record.on_output.take()?), None)
        } else {
            (None, Some(record.on_recover.take()?))
        };
        Some((callbacks, base_anchor))
    }
}

impl ConsensusProvider for MockConsensus {
    type Instance = MockInstance;

    fn new_instance(&mut self, params: ConsensusParams) -> MockInstance {
        let mut records = self.records.lock().unwrap();
        records.push(InstanceRecord {
            committee: params.committee.address,
            log_index: params.log_index,
            cancel: params.cancel,
            base_anchor: None,
            times: Vec::new(),
            rotations: vec![params.rotate_to],
            on_output: None,
            on_recover: None,
        });
        MockInstance {
            records: self.records.clone(),
            position: records.len() - 1,
            decide_below: self.decide_below,
        }
    }
}

pub(crate) struct MockInstance {
    records: Arc<Mutex<Vec<InstanceRecord>>>,
    position: usize,
    decide_below: Option<StateIndex>,
}

impl ConsensusInstance for MockInstance {
    fn input(
        &mut self,
        base_anchor: AnchorOutput,
        on_output: ConsensusOutputCallback,
        on_recover: ConsensusRecoverCallback,
    ) {
        let mut records = self.records.lock().unwrap();
        let record = &mut records[self.position];
        record.base_anchor = Some(base_anchor.clone());
        match self.decide_below {
            Some(limit) if base_anchor.state_index < limit => {
                let transaction = next_transaction(&base_anchor, record.log_index);
                drop(records);
                on_output(ConsensusOutput::Done { transaction });
            }
            _ => {
                record.on_output = Some(on_output);
                record.on_recover = Some(on_recover);
            }
        }
    }

    fn time(&mut self, now: SystemTime) {
        self.records.lock().unwrap()[self.position].times.push(now);
    }

    fn rotate_to(&mut self, address: Option<CommitteeAddress>) {
        self.records.lock().unwrap()[self.position].rotations.push(address);
    }
}

/// The anchor produced by the transaction decided at `log_index` on top of `base`.
pub(crate) fn next_anchor(base: &AnchorOutput, log_index: LogIndex) -> AnchorOutput {
    let mut hasher = CryptoHasher::new();
    hasher.update(base.output_id.bytes());
    hasher.update(log_index.int().to_le_bytes());
    let output_id = OutputID::new(hasher.finalize().into());
    AnchorOutput::new(
        output_id,
        base.state_index + 1,
        CryptoHash::new([base.state_index.int() as u8 + 1; 32]),
        base.state_controller,
    )
}

pub(crate) fn next_transaction(base: &AnchorOutput, log_index: LogIndex) -> Transaction {
    Transaction::new(
        base.output_id,
        next_anchor(base, log_index),
        log_index.int().to_le_bytes().to_vec(),
    )
}

/// A committee registry that knows a fixed set of committees.
pub(crate) struct StaticRegistry(pub(crate) Vec<Committee>);

impl CommitteeRegistry for StaticRegistry {
    fn committee(&self, address: &CommitteeAddress) -> Option<Committee> {
        self.0
            .iter()
            .find(|committee| committee.address == *address)
            .cloned()
    }
}
