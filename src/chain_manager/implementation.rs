/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`DefaultChainManager`].
//!
//! The default chain manager keeps one log per committee. A committee's log consists of the log index
//! the committee is working on, and the base anchor the node asked consensus to build on at that log
//! index. The log index moves forward when:
//! 1. The base anchor changes after it was already used at the current log index (normally because the
//!    round at the current log index decided a transaction).
//! 2. The round at the current log index is skipped or times out. The node then tells its peers it
//!    wants to move on with a signed [`NextLogIndex`] message, and keeps redelivering it on every tick.
//! 3. `f + 1` members of the committee said they want to move on to a higher log index, so that at least
//!    one correct member did.

use std::collections::{BTreeMap, HashMap};

use crate::{
    pluggables::CommitteeRegistry,
    types::{
        anchor::AnchorOutput,
        committee::Committee,
        crypto_primitives::{Keypair, SigningKey, VerifyingKey},
        data_types::{ChainID, CommitteeAddress, LogIndex, OutputID, TransactionID},
        transaction::Transaction,
    },
};

use super::{
    messages::{ChainMgrMessage, NextLogIndex},
    types::{ChainMgrInput, ChainMgrOutput, NeedConsensus, NeedPublishTx, OutMessage},
    ChainManager,
};

pub struct DefaultChainManager<R: CommitteeRegistry> {
    chain_id: ChainID,
    keypair: Keypair,
    registry: R,

    latest_confirmed: Option<AnchorOutput>,
    active_committee: Option<Committee>,
    base: Option<AnchorOutput>,
    logs: HashMap<CommitteeAddress, CommitteeLog>,

    need_consensus: Option<NeedConsensus>,
    need_publish_tx: BTreeMap<TransactionID, NeedPublishTx>,
}

struct CommitteeLog {
    log_index: LogIndex,
    issued_base: Option<OutputID>,
    proposals: HashMap<VerifyingKey, LogIndex>,
    proposed: Option<LogIndex>,
}

impl CommitteeLog {
    fn new() -> CommitteeLog {
        CommitteeLog {
            log_index: LogIndex::init(),
            issued_base: None,
            proposals: HashMap::new(),
            proposed: None,
        }
    }

    fn move_to(&mut self, log_index: LogIndex) {
        self.log_index = log_index;
        self.issued_base = None;
        self.proposed = Some(log_index);
    }
}

impl<R: CommitteeRegistry> DefaultChainManager<R> {
    pub fn new(me: SigningKey, chain_id: ChainID, registry: R) -> DefaultChainManager<R> {
        DefaultChainManager {
            chain_id,
            keypair: Keypair::new(me),
            registry,
            latest_confirmed: None,
            active_committee: None,
            base: None,
            logs: HashMap::new(),
            need_consensus: None,
            need_publish_tx: BTreeMap::new(),
        }
    }

    fn on_anchor_confirmed(&mut self, anchor: AnchorOutput) {
        let me = self.keypair.public();
        self.active_committee = self
            .registry
            .committee(&anchor.state_controller)
            .filter(|committee| committee.contains(&me));
        if self.active_committee.is_none() {
            log::debug!(
                "Chain manager: not a member of committee {} controlling {}",
                anchor.state_controller,
                anchor.output_id
            );
        }

        // Transactions producing states up to the confirmed one are either confirmed or lost.
        self.need_publish_tx
            .retain(|_, need| need.next_anchor.state_index > anchor.state_index);
        self.latest_confirmed = Some(anchor);
    }

    fn on_consensus_done(
        &mut self,
        committee: CommitteeAddress,
        log_index: LogIndex,
        base_anchor: OutputID,
        transaction: Transaction,
    ) {
        let matches = match &self.need_consensus {
            Some(nc) => {
                nc.committee.address == committee
                    && nc.log_index == log_index
                    && nc.base_anchor.output_id == base_anchor
            }
            None => false,
        };
        if !matches {
            log::debug!(
                "Chain manager: ignoring output of outdated consensus ({}, {})",
                committee,
                log_index
            );
            return;
        }

        let tx_id = transaction.id();
        let next_anchor = transaction.produced.clone();
        self.need_publish_tx.insert(
            tx_id,
            NeedPublishTx {
                committee,
                log_index,
                tx_id,
                tx: transaction,
                base_anchor,
                next_anchor,
            },
        );
    }

    /// Move past `log_index` of `committee` because the round there produced nothing.
    fn give_up_log_index(
        &mut self,
        committee: CommitteeAddress,
        log_index: LogIndex,
    ) -> Vec<OutMessage> {
        let Some(active) = self.active_committee.clone() else {
            return Vec::new();
        };
        if active.address != committee {
            return Vec::new();
        }
        let log = self.logs.entry(committee).or_insert_with(CommitteeLog::new);
        if log.log_index != log_index {
            return Vec::new();
        }
        let next = log_index.next();
        log.move_to(next);
        log::info!(
            "Chain manager: committee {} moves from log index {} to {}",
            committee,
            log_index,
            next
        );
        self.next_log_index_msgs(&active, next)
    }

    fn on_next_log_index(&mut self, sender: VerifyingKey, msg: NextLogIndex) -> Vec<OutMessage> {
        if msg.chain_id != self.chain_id {
            log::debug!("Chain manager: dropping NextLogIndex for chain {}", msg.chain_id);
            return Vec::new();
        }
        let Some(committee) = self.registry.committee(&msg.committee) else {
            log::debug!("Chain manager: dropping NextLogIndex for unknown committee {}", msg.committee);
            return Vec::new();
        };
        if !committee.contains(&sender) || !msg.is_from(&sender) {
            log::warn!("Chain manager: dropping NextLogIndex with invalid sender or signature");
            return Vec::new();
        }

        let log = self
            .logs
            .entry(msg.committee)
            .or_insert_with(CommitteeLog::new);
        let proposal = log.proposals.entry(sender).or_insert(msg.log_index);
        if *proposal < msg.log_index {
            *proposal = msg.log_index;
        }

        // The (f+1)-th highest proposal is supported by at least one correct member.
        let mut proposals: Vec<LogIndex> = committee
            .members
            .iter()
            .filter_map(|member| log.proposals.get(member).copied())
            .collect();
        proposals.sort_unstable_by(|a, b| b.cmp(a));
        let supported = match proposals.get(committee.max_faulty()) {
            Some(supported) if *supported > log.log_index => *supported,
            _ => return Vec::new(),
        };
        log::info!(
            "Chain manager: committee {} moves from log index {} to {} with its peers",
            committee.address,
            log.log_index,
            supported
        );
        log.move_to(supported);

        if committee.contains(&self.keypair.public()) {
            self.next_log_index_msgs(&committee, supported)
        } else {
            Vec::new()
        }
    }

    fn on_tick(&self) -> Vec<OutMessage> {
        let Some(committee) = &self.active_committee else {
            return Vec::new();
        };
        match self.logs.get(&committee.address) {
            Some(log) if log.proposed == Some(log.log_index) => {
                self.next_log_index_msgs(committee, log.log_index)
            }
            _ => Vec::new(),
        }
    }

    fn next_log_index_msgs(&self, committee: &Committee, log_index: LogIndex) -> Vec<OutMessage> {
        let me = self.keypair.public();
        let message: ChainMgrMessage =
            NextLogIndex::new(&self.keypair, self.chain_id, committee.address, log_index).into();
        committee
            .members
            .iter()
            .filter(|member| **member != me)
            .map(|member| OutMessage {
                recipient: *member,
                message: message.clone(),
            })
            .collect()
    }

    /// Recompute which consensus round should be running.
    fn refresh_need_consensus(&mut self) {
        let Some(committee) = self.active_committee.clone() else {
            self.need_consensus = None;
            return;
        };
        let base = match &self.base {
            Some(base) if base.state_controller == committee.address => base.clone(),
            _ => {
                self.need_consensus = None;
                return;
            }
        };

        let log = self
            .logs
            .entry(committee.address)
            .or_insert_with(CommitteeLog::new);
        match log.issued_base {
            Some(issued) if issued == base.output_id => (),
            Some(_) => {
                // The current log index was already used for another base anchor.
                log.log_index = log.log_index.next();
                log.issued_base = Some(base.output_id);
            }
            None => log.issued_base = Some(base.output_id),
        }

        self.need_consensus = Some(NeedConsensus {
            committee,
            log_index: log.log_index,
            base_anchor: base,
        });
    }
}

impl<R: CommitteeRegistry> ChainManager for DefaultChainManager<R> {
    fn input(&mut self, input: ChainMgrInput) -> Vec<OutMessage> {
        let msgs = match input {
            ChainMgrInput::AnchorConfirmed { anchor } => {
                self.on_anchor_confirmed(anchor);
                Vec::new()
            }
            ChainMgrInput::LocalViewUpdated { base } => {
                self.base = base;
                Vec::new()
            }
            ChainMgrInput::ConsensusOutputDone {
                committee,
                log_index,
                base_anchor,
                transaction,
            } => {
                self.on_consensus_done(committee, log_index, base_anchor, transaction);
                Vec::new()
            }
            ChainMgrInput::ConsensusOutputSkipped {
                committee,
                log_index,
            }
            | ChainMgrInput::ConsensusTimeout {
                committee,
                log_index,
            } => self.give_up_log_index(committee, log_index),
            ChainMgrInput::TxPublishResult {
                tx_id,
                next_anchor,
                confirmed,
            } => {
                self.need_publish_tx.remove(&tx_id);
                if !confirmed {
                    log::warn!(
                        "Chain manager: transaction producing {}@{} was rejected",
                        next_anchor.output_id,
                        next_anchor.state_index
                    );
                }
                Vec::new()
            }
            ChainMgrInput::Tick { .. } => return self.on_tick(),
        };
        self.refresh_need_consensus();
        msgs
    }

    fn message(&mut self, sender: VerifyingKey, message: ChainMgrMessage) -> Vec<OutMessage> {
        let msgs = match message {
            ChainMgrMessage::NextLogIndex(msg) => self.on_next_log_index(sender, msg),
        };
        self.refresh_need_consensus();
        msgs
    }

    fn output(&self) -> Option<ChainMgrOutput> {
        self.latest_confirmed.as_ref()?;
        Some(ChainMgrOutput {
            need_consensus: self.need_consensus.clone(),
            need_publish_tx: self.need_publish_tx.clone(),
        })
    }

    fn status_string(&self) -> String {
        match &self.need_consensus {
            Some(nc) => format!(
                "ChainMgr {{ committee: {}, log index: {}, base: {}, publishing: {} }}",
                nc.committee.address,
                nc.log_index,
                nc.base_anchor.output_id,
                self.need_publish_tx.len()
            ),
            None => format!(
                "ChainMgr {{ idle, confirmed: {:?}, publishing: {} }}",
                self.latest_confirmed.as_ref().map(|ao| ao.output_id),
                self.need_publish_tx.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::data_types::{CryptoHash, StateIndex};
    use rand_core::OsRng;

    struct StaticRegistry(Vec<Committee>);

    impl CommitteeRegistry for StaticRegistry {
        fn committee(&self, address: &CommitteeAddress) -> Option<Committee> {
            self.0.iter().find(|c| c.address == *address).cloned()
        }
    }

    const CHAIN: ChainID = ChainID::new([7; 32]);
    const COMMITTEE: CommitteeAddress = CommitteeAddress::new([1; 32]);
    const OTHER_COMMITTEE: CommitteeAddress = CommitteeAddress::new([2; 32]);

    fn setup() -> (DefaultChainManager<StaticRegistry>, Vec<Keypair>, Committee) {
        let mut csprg = OsRng {};
        let keypairs: Vec<Keypair> = (0..4)
            .map(|_| Keypair::new(SigningKey::generate(&mut csprg)))
            .collect();
        let committee = Committee::new(COMMITTEE, keypairs.iter().map(|k| k.public()).collect());
        let outsiders = Committee::new(
            OTHER_COMMITTEE,
            vec![SigningKey::generate(&mut csprg).verifying_key()],
        );
        let chain_mgr = DefaultChainManager::new(
            keypairs[0].signing_key().clone(),
            CHAIN,
            StaticRegistry(vec![committee.clone(), outsiders]),
        );
        (chain_mgr, keypairs, committee)
    }

    fn anchor(id: u8, state_index: u32, controller: CommitteeAddress) -> AnchorOutput {
        AnchorOutput::new(
            OutputID::new([id; 32]),
            StateIndex::new(state_index),
            CryptoHash::new([id; 32]),
            controller,
        )
    }

    fn need_consensus(chain_mgr: &DefaultChainManager<StaticRegistry>) -> Option<(LogIndex, OutputID)> {
        chain_mgr
            .output()
            .and_then(|out| out.need_consensus)
            .map(|nc| (nc.log_index, nc.base_anchor.output_id))
    }

    #[test]
    fn no_output_before_first_confirmation() {
        let (mut chain_mgr, _, _) = setup();
        assert!(chain_mgr.output().is_none());
        chain_mgr.input(ChainMgrInput::LocalViewUpdated {
            base: Some(anchor(1, 1, COMMITTEE)),
        });
        assert!(chain_mgr.output().is_none());
    }

    #[test]
    fn consensus_pipeline_advances_log_index() {
        let (mut chain_mgr, _, _) = setup();
        let a = anchor(1, 1, COMMITTEE);
        let b = anchor(2, 2, COMMITTEE);

        chain_mgr.input(ChainMgrInput::AnchorConfirmed { anchor: a.clone() });
        assert_eq!(need_consensus(&chain_mgr), None);
        chain_mgr.input(ChainMgrInput::LocalViewUpdated { base: Some(a.clone()) });
        assert_eq!(need_consensus(&chain_mgr), Some((LogIndex::new(1), a.output_id)));

        let tx = Transaction::new(a.output_id, b.clone(), vec![]);
        chain_mgr.input(ChainMgrInput::ConsensusOutputDone {
            committee: COMMITTEE,
            log_index: LogIndex::new(1),
            base_anchor: a.output_id,
            transaction: tx.clone(),
        });
        let out = chain_mgr.output().unwrap();
        assert_eq!(out.need_publish_tx.len(), 1);
        assert_eq!(out.need_publish_tx[&tx.id()].next_anchor, b);

        chain_mgr.input(ChainMgrInput::LocalViewUpdated { base: Some(b.clone()) });
        assert_eq!(need_consensus(&chain_mgr), Some((LogIndex::new(2), b.output_id)));

        // Confirmation of the produced anchor makes the publication moot.
        chain_mgr.input(ChainMgrInput::AnchorConfirmed { anchor: b.clone() });
        assert!(chain_mgr.output().unwrap().need_publish_tx.is_empty());
        assert_eq!(need_consensus(&chain_mgr), Some((LogIndex::new(2), b.output_id)));
    }

    #[test]
    fn stale_consensus_output_is_ignored() {
        let (mut chain_mgr, _, _) = setup();
        let a = anchor(1, 1, COMMITTEE);
        chain_mgr.input(ChainMgrInput::AnchorConfirmed { anchor: a.clone() });
        chain_mgr.input(ChainMgrInput::LocalViewUpdated { base: Some(a.clone()) });

        chain_mgr.input(ChainMgrInput::ConsensusOutputDone {
            committee: COMMITTEE,
            log_index: LogIndex::new(9),
            base_anchor: a.output_id,
            transaction: Transaction::new(a.output_id, anchor(2, 2, COMMITTEE), vec![]),
        });
        assert!(chain_mgr.output().unwrap().need_publish_tx.is_empty());
    }

    #[test]
    fn timeout_moves_on_and_tells_peers() {
        let (mut chain_mgr, keypairs, _) = setup();
        let a = anchor(1, 1, COMMITTEE);
        chain_mgr.input(ChainMgrInput::AnchorConfirmed { anchor: a.clone() });
        chain_mgr.input(ChainMgrInput::LocalViewUpdated { base: Some(a.clone()) });

        let msgs = chain_mgr.input(ChainMgrInput::ConsensusTimeout {
            committee: COMMITTEE,
            log_index: LogIndex::new(1),
        });
        assert_eq!(need_consensus(&chain_mgr), Some((LogIndex::new(2), a.output_id)));
        assert_eq!(msgs.len(), 3);
        assert!(msgs.iter().all(|m| m.recipient != keypairs[0].public()));
        let ChainMgrMessage::NextLogIndex(nli) = &msgs[0].message;
        assert_eq!(nli.log_index, LogIndex::new(2));
        assert!(nli.is_from(&keypairs[0].public()));

        // Redelivered on ticks until the log index moves on.
        let msgs = chain_mgr.input(ChainMgrInput::Tick {
            now: std::time::SystemTime::now(),
        });
        assert_eq!(msgs.len(), 3);

        // A timeout for an old log index changes nothing.
        let msgs = chain_mgr.input(ChainMgrInput::ConsensusTimeout {
            committee: COMMITTEE,
            log_index: LogIndex::new(1),
        });
        assert!(msgs.is_empty());
        assert_eq!(need_consensus(&chain_mgr), Some((LogIndex::new(2), a.output_id)));
    }

    #[test]
    fn log_index_adopted_with_f_plus_one_support() {
        let (mut chain_mgr, keypairs, committee) = setup();
        let a = anchor(1, 1, COMMITTEE);
        chain_mgr.input(ChainMgrInput::AnchorConfirmed { anchor: a.clone() });
        chain_mgr.input(ChainMgrInput::LocalViewUpdated { base: Some(a.clone()) });
        assert_eq!(committee.max_faulty(), 1);

        let proposal = |from: &Keypair, li: u32| {
            ChainMgrMessage::from(NextLogIndex::new(from, CHAIN, COMMITTEE, LogIndex::new(li)))
        };

        let msgs = chain_mgr.message(keypairs[1].public(), proposal(&keypairs[1], 5));
        assert!(msgs.is_empty());
        assert_eq!(need_consensus(&chain_mgr), Some((LogIndex::new(1), a.output_id)));

        let msgs = chain_mgr.message(keypairs[2].public(), proposal(&keypairs[2], 6));
        assert_eq!(msgs.len(), 3);
        assert_eq!(need_consensus(&chain_mgr), Some((LogIndex::new(5), a.output_id)));
    }

    #[test]
    fn invalid_messages_are_dropped() {
        let (mut chain_mgr, keypairs, _) = setup();
        let a = anchor(1, 1, COMMITTEE);
        chain_mgr.input(ChainMgrInput::AnchorConfirmed { anchor: a.clone() });
        chain_mgr.input(ChainMgrInput::LocalViewUpdated { base: Some(a.clone()) });

        // Signed by one member, relayed as if from another.
        let forged: ChainMgrMessage =
            NextLogIndex::new(&keypairs[1], CHAIN, COMMITTEE, LogIndex::new(5)).into();
        chain_mgr.message(keypairs[2].public(), forged.clone());
        chain_mgr.message(keypairs[3].public(), forged);
        assert_eq!(need_consensus(&chain_mgr), Some((LogIndex::new(1), a.output_id)));

        // Another chain.
        let other_chain: ChainMgrMessage = NextLogIndex::new(
            &keypairs[1],
            ChainID::new([0; 32]),
            COMMITTEE,
            LogIndex::new(5),
        )
        .into();
        chain_mgr.message(keypairs[1].public(), other_chain);
        assert_eq!(need_consensus(&chain_mgr), Some((LogIndex::new(1), a.output_id)));
    }

    #[test]
    fn no_consensus_when_not_a_member() {
        let (mut chain_mgr, _, _) = setup();
        let a = anchor(1, 1, OTHER_COMMITTEE);
        chain_mgr.input(ChainMgrInput::AnchorConfirmed { anchor: a.clone() });
        chain_mgr.input(ChainMgrInput::LocalViewUpdated { base: Some(a) });
        let out = chain_mgr.output().unwrap();
        assert!(out.need_consensus.is_none());
    }

    #[test]
    fn rejected_base_stops_consensus() {
        let (mut chain_mgr, _, _) = setup();
        let a = anchor(1, 1, COMMITTEE);
        chain_mgr.input(ChainMgrInput::AnchorConfirmed { anchor: a.clone() });
        chain_mgr.input(ChainMgrInput::LocalViewUpdated { base: Some(a.clone()) });
        chain_mgr.input(ChainMgrInput::LocalViewUpdated { base: None });
        assert_eq!(need_consensus(&chain_mgr), None);

        // Resuming on the same base keeps the log index.
        chain_mgr.input(ChainMgrInput::LocalViewUpdated { base: Some(a.clone()) });
        assert_eq!(need_consensus(&chain_mgr), Some((LogIndex::new(1), a.output_id)));
    }
}
