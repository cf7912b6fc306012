//! Transparent (Bitcoin-inherited) transaction building blocks.
#![allow(clippy::unit_arg)]

mod address;
mod script;
mod serialize;

pub use address::Hash160;
pub use script::Script;

use std::convert::TryInto;

use serde::{Deserialize, Serialize};

use crate::{compactint::CompactInt, BathronSerialize};
use bathron_serde_derive::BathronSerialize;

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

use crate::{
    amount::{Amount, NonNegative},
    block, transaction,
};

/// Arbitrary data inserted by the block producer into a coinbase transaction.
///
/// The first four bytes encode the block height (little-endian), so every
/// coinbase is unique and the height is recoverable from the block itself.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CoinbaseData(pub(super) Vec<u8>);

impl CoinbaseData {
    /// Build coinbase data committing to `height`, with optional free bytes.
    ///
    /// Invariant: the total must stay under 100 bytes; 95 bytes of extra data
    /// are safe for any representable height.
    pub fn new(height: block::Height, extra: &[u8]) -> CoinbaseData {
        let mut data = Vec::with_capacity(4 + extra.len());
        data.extend_from_slice(&height.0.to_le_bytes());
        data.extend_from_slice(extra);
        CoinbaseData(data)
    }

    /// The block height committed to by this coinbase, if well-formed.
    pub fn height(&self) -> Option<block::Height> {
        let bytes: [u8; 4] = self.0.get(0..4)?.try_into().ok()?;
        Some(block::Height(u32::from_le_bytes(bytes)))
    }

    pub fn serialized_size(&self) -> usize {
        CompactInt::size(self.0.len()) + self.0.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for CoinbaseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CoinbaseData")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

/// OutPoint
///
/// A particular transaction output reference.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash, BathronSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct OutPoint {
    /// References the transaction that contains the output being spent.
    pub hash: transaction::Hash,

    /// Identifies which output from that transaction is referenced; the
    /// first output is 0, etc.
    pub index: u32,
}

impl OutPoint {
    #[inline]
    pub const fn len() -> usize {
        36
    }

    /// The raw 36 key bytes used by the settlement and receipt indices.
    pub fn to_key_bytes(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[0..32].copy_from_slice(&(self.hash).0);
        out[32..36].copy_from_slice(&self.index.to_le_bytes());
        out
    }
}

/// A transparent input to a transaction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Input {
    /// A reference to an output of a previous transaction.
    PrevOut {
        /// The previous output transaction reference.
        outpoint: OutPoint,
        /// The script that authorizes spending `outpoint`.
        unlock_script: Script,
        /// The sequence number for the input.
        sequence: u32,
    },
    /// New coins created by the block reward.
    Coinbase {
        /// Producer data; commits to the block height in its first 4 bytes.
        data: CoinbaseData,
        /// The sequence number for the input.
        sequence: u32,
    },
}

impl Input {
    /// The outpoint this input spends, unless it is a coinbase.
    pub fn outpoint(&self) -> Option<OutPoint> {
        match self {
            Input::PrevOut { outpoint, .. } => Some(*outpoint),
            Input::Coinbase { .. } => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Input::PrevOut { unlock_script, .. } => {
                OutPoint::len() + unlock_script.serialized_size() + 4
            }
            Input::Coinbase { data, .. } => OutPoint::len() + data.serialized_size() + 4,
        }
    }
}

/// A transparent output from a transaction.
///
/// The most fundamental building block of a transaction is a transaction
/// output -- the coins you own are in fact a subset of unspent transaction
/// outputs of the global UTXO set.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash, BathronSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Output {
    /// Transaction value.
    pub value: Amount<NonNegative>,

    /// The lock script defines the conditions under which this output can be
    /// spent.
    pub lock_script: Script,
}

impl Output {
    /// Returns the serialized length (in bytes) of this Output.
    pub fn len(&self) -> usize {
        8 + self.lock_script.serialized_size()
    }
}
