/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the [`Committee`] type.

use super::{crypto_primitives::VerifyingKey, data_types::CommitteeAddress};

/// The set of peers jointly authorized to produce the next anchor output of a chain.
///
/// Members are identified by their Ed25519 public keys. A committee of `n` members tolerates
/// [`max_faulty`](Self::max_faulty) `= (n - 1) / 3` Byzantine members.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Committee {
    pub address: CommitteeAddress,
    pub members: Vec<VerifyingKey>,
}

impl Committee {
    pub fn new(address: CommitteeAddress, members: Vec<VerifyingKey>) -> Self {
        Self { address, members }
    }

    pub fn contains(&self, member: &VerifyingKey) -> bool {
        self.members.contains(member)
    }

    /// Get the position of `member` in the committee, if it is a member.
    pub fn position(&self, member: &VerifyingKey) -> Option<usize> {
        self.members.iter().position(|m| m == member)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn max_faulty(&self) -> usize {
        self.members.len().saturating_sub(1) / 3
    }
}
