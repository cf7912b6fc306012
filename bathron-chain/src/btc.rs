//! A strict, from-scratch parser for Bitcoin wire data.
//!
//! Burn verification replays raw Bitcoin transactions and headers inside
//! BATHRON consensus, so this parser is consensus-critical: it must accept
//! exactly the bytes Bitcoin produced and nothing else. No round-trip
//! leniency, no trailing garbage, hard DoS ceilings.
//!
//! The txid subtlety: `txid = sha256d(non-witness serialization)` while
//! `wtxid = sha256d(full serialization)`. Bitcoin headers commit to the
//! former. Hashing raw wire bytes of a SegWit transaction silently yields
//! the wrong identifier, so [`Transaction`] always materializes the
//! non-witness form before hashing.

pub mod merkle;

mod header;
mod transaction;

pub use header::{Header, HeadersPayload};
pub use transaction::{Input, Output, Transaction, Witness};

use std::fmt;

use displaydoc::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serialization::{BathronDeserialize, BathronSerialize, SerializationError};

/// A Bitcoin transaction id: sha256d of the non-witness serialization.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Txid(pub [u8; 32]);

/// A Bitcoin block hash.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct BlockHash(pub [u8; 32]);

macro_rules! impl_btc_hash_traits {
    ($name:ident, $label:expr) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                let mut reversed_bytes = self.0;
                reversed_bytes.reverse();
                f.write_str(&hex::encode(&reversed_bytes))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                let mut reversed_bytes = self.0;
                reversed_bytes.reverse();
                f.debug_tuple($label)
                    .field(&hex::encode(&reversed_bytes))
                    .finish()
            }
        }

        impl std::str::FromStr for $name {
            type Err = SerializationError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut bytes = [0; 32];
                if hex::decode_to_slice(s, &mut bytes[..]).is_err() {
                    Err(SerializationError::Parse("hex decoding error"))
                } else {
                    bytes.reverse();
                    Ok($name(bytes))
                }
            }
        }

        impl BathronSerialize for $name {
            fn bathron_serialize<W: std::io::Write>(
                &self,
                mut writer: W,
            ) -> Result<(), std::io::Error> {
                writer.write_all(&self.0)
            }
        }

        impl BathronDeserialize for $name {
            fn bathron_deserialize<R: std::io::Read>(
                mut reader: R,
            ) -> Result<Self, SerializationError> {
                Ok($name(<[u8; 32]>::bathron_deserialize(&mut reader)?))
            }
        }
    };
}

impl_btc_hash_traits!(Txid, "btc::Txid");
impl_btc_hash_traits!(BlockHash, "btc::BlockHash");

/// Why a blob of bytes is not a Bitcoin transaction or header.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// bytes exceed the sanity size ceiling
    OversizedSanity,
    /// bytes exceed the consensus size ceiling
    OversizedConsensus,
    /// truncated input
    Truncated,
    /// trailing bytes after the parsed structure
    TrailingBytes,
    /// SegWit flag byte is not 0x01
    BadSegwitFlag,
    /// SegWit serialization with no witness data
    EmptyWitness,
    /// no inputs
    NoInputs,
    /// no outputs
    NoOutputs,
    /// too many inputs
    TooManyInputs,
    /// too many outputs
    TooManyOutputs,
    /// output value above the monetary cap
    ValueOutOfRange,
    /// length prefix larger than remaining bytes
    BadLength,
    /// header is not exactly 80 bytes
    BadHeaderLength,
}
