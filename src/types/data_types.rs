/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes or integers, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::Add,
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Defines a 32-byte identifier newtype with `new`, `bytes`, and `Debug`/`Display` implementations.
macro_rules! bytes32_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
        pub struct $name([u8; 32]);

        impl $name {
            #[doc = concat!("Create a new `", stringify!($name), "` wrapping `bytes`.")]
            pub const fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            #[doc = concat!("Get the inner `[u8; 32]` value of this `", stringify!($name), "`.")]
            pub const fn bytes(&self) -> [u8; 32] {
                self.0
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}(", stringify!($name))?;
                for byte in &self.0[0..4] {
                    write!(f, "{:02x}", byte)?;
                }
                write!(f, "..)")
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                for byte in &self.0[0..8] {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    };
}

bytes32_newtype!(
    /// Identifies a chain. Every anchor output, request, and peer message of a chain is scoped by its
    /// `ChainID`.
    ChainID
);

bytes32_newtype!(
    /// 32-byte cryptographic hash. Within this crate, always a SHA256 hash.
    CryptoHash
);

bytes32_newtype!(
    /// Identity of an unspent output on the base ledger.
    ///
    /// All orchestration logic compares [anchor outputs](super::anchor::AnchorOutput) by their `OutputID`,
    /// never by their content.
    OutputID
);

bytes32_newtype!(
    /// Identity of a base-ledger [transaction](super::transaction::Transaction).
    TransactionID
);

bytes32_newtype!(
    /// Identity of a client request.
    RequestID
);

bytes32_newtype!(
    /// Address of a [committee](super::committee::Committee). The state controller of an anchor output.
    CommitteeAddress
);

bytes32_newtype!(
    /// Identifies a group of peers that exchange messages about one chain.
    PeeringID
);

/// Index of a chain state. Increases by 1 with every anchor output published on the base ledger.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct StateIndex(u32);

impl StateIndex {
    /// Create a new `StateIndex` wrapping `int`.
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    /// Get the inner `u32` value of this `StateIndex`.
    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for StateIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u32> for StateIndex {
    type Output = StateIndex;

    fn add(self, rhs: u32) -> Self::Output {
        StateIndex(self.0 + rhs)
    }
}

/// Per-committee round counter distinguishing consecutive consensus attempts.
///
/// The zero value is reserved for "no log index yet"; the first usable log index is `LogIndex::new(1)`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct LogIndex(u32);

impl LogIndex {
    /// Create a new `LogIndex` wrapping `int`.
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    /// Get the first usable `LogIndex`.
    pub const fn init() -> Self {
        Self(1)
    }

    /// Get the inner `u32` value of this `LogIndex`.
    pub const fn int(&self) -> u32 {
        self.0
    }

    /// Get the log index that immediately follows this one.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for LogIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u32> for LogIndex {
    type Output = LogIndex;

    fn add(self, rhs: u32) -> Self::Output {
        LogIndex(self.0 + rhs)
    }
}

/// Ed25519 digital signature.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    /// Create a new `SignatureBytes` wrapping `bytes`.
    pub(crate) fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 64]` value of this `SignatureBytes`.
    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureBytes({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}
