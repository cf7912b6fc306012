//! Consensus-critical data types and serialization for BATHRON.
//!
//! This crate holds everything two nodes must agree on byte-for-byte: hashes,
//! amounts, scripts, transactions, blocks, difficulty, network parameters,
//! the strict Bitcoin-format parser used by burn verification, and the
//! settlement/burn entities that the consensus and state crates operate on.

pub mod amount;
pub mod block;
pub mod btc;
pub mod burn;
pub mod cached;
pub mod compactint;
pub mod masternode;
pub mod parameters;
pub mod serialization;
pub mod settlement;
pub mod transaction;
pub mod transparent;
pub mod work;

pub use cached::Cached;
pub use compactint::CompactInt;
pub use serialization::{
    BathronDeserialize, BathronDeserializeInto, BathronSerialize, SerializationError,
};
