//! Blocks and block-related structures (heights, headers, etc.)
#![allow(clippy::unit_arg)]

mod hash;
mod header;
mod height;
mod serialize;

pub mod merkle;


use std::{fmt, sync::Arc};

pub use hash::Hash;
pub use header::Header;
pub use height::Height;
pub use serialize::MAX_BLOCK_BYTES;

use serde::{Deserialize, Serialize};

use crate::{masternode::ProTxHash, transaction::Transaction, transparent};

/// A BATHRON block: a header, the producing masternode's identity and
/// signature, and a list of transactions.
///
/// The producer signs the final block hash (the header hash, computed after
/// any coinbase nonce mutation); the signature itself is therefore outside
/// the hash preimage.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// The block header, containing block metadata.
    pub header: Header,
    /// The pro-tx-hash of the producing masternode.
    ///
    /// All zeroes on the genesis block, which has no producer.
    pub producer: ProTxHash,
    /// The producer's ECDSA signature over the block hash (DER bytes).
    pub signature: Vec<u8>,
    /// The block transactions.
    pub transactions: Vec<Arc<Transaction>>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fmter = f.debug_struct("Block");
        if let Some(height) = self.coinbase_height() {
            fmter.field("height", &height);
        }
        fmter.field("hash", &self.hash()).finish()
    }
}

impl Block {
    /// Return the block height committed to by the coinbase transaction, if
    /// any.
    pub fn coinbase_height(&self) -> Option<Height> {
        self.transactions
            .get(0)
            .and_then(|tx| tx.inputs.get(0))
            .and_then(|input| match input {
                transparent::Input::Coinbase { ref data, .. } => data.height(),
                _ => None,
            })
    }

    /// Compute the hash of this block.
    pub fn hash(&self) -> Hash {
        Hash::from(self)
    }
}

impl<'a> From<&'a Block> for Hash {
    fn from(block: &'a Block) -> Hash {
        (&block.header).into()
    }
}
