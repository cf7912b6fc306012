//! Transactions and transaction-related structures.

use serde::{Deserialize, Serialize};

use crate::cached::Cached;

mod hash;
mod lock_time;
mod serialize;
mod txtype;

#[cfg(test)]
mod tests;

pub use hash::Hash;
pub use lock_time::LockTime;
pub use txtype::TxType;

use crate::transparent;

/// A BATHRON transaction.
///
/// Structurally a Bitcoin transaction with two additions: a 16-bit type tag
/// distinguishing settlement, burn, mint, and header-publication
/// transactions from normal transfers, and an `extra_payload` blob carried
/// by the types that need one. Both are part of the txid preimage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// The transaction version.
    pub version: i32,
    /// The 16-bit transaction type tag.
    pub tx_type: TxType,
    /// The transaction inputs.
    pub inputs: Vec<transparent::Input>,
    /// The transaction outputs.
    pub outputs: Vec<transparent::Output>,
    /// The transaction locktime.
    pub locktime: LockTime,
    /// Type-specific payload; empty for types that carry none.
    pub extra_payload: Vec<u8>,
    hash: Cached<Hash>,
}

impl Transaction {
    pub fn new(
        version: i32,
        tx_type: TxType,
        inputs: Vec<transparent::Input>,
        outputs: Vec<transparent::Output>,
        locktime: LockTime,
        extra_payload: Vec<u8>,
    ) -> Transaction {
        Transaction {
            version,
            tx_type,
            inputs,
            outputs,
            locktime,
            extra_payload,
            hash: Cached::new(),
        }
    }

    /// Get the hash of this transaction.
    pub fn hash(&self) -> Hash {
        // If we have a cached version, just return that
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        // Otherwise, serialize the tx to calculate and return the hash
        Hash::from(self)
    }

    pub fn contains_coinbase_input(&self) -> bool {
        self.inputs
            .iter()
            .any(|input| matches!(input, transparent::Input::Coinbase { .. }))
    }

    /// Returns `true` if this transaction is a coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && matches!(
                self.inputs.get(0),
                Some(transparent::Input::Coinbase { .. })
            )
    }

    /// Returns `true` for the three settlement-bearing types.
    pub fn is_settlement(&self) -> bool {
        self.tx_type.is_settlement()
    }

    /// The outpoint of this transaction's `index`th output.
    pub fn outpoint(&self, index: u32) -> transparent::OutPoint {
        transparent::OutPoint {
            hash: self.hash(),
            index,
        }
    }
}
