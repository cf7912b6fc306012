//! Persistence for the BATHRON settlement and burn state.
//!
//! Everything here mirrors the in-memory books maintained by the consensus
//! crate: one atomic write batch per block per tree, raw-byte keys (never
//! framework-framed: an accidental length prefix would silently change
//! every key), and a per-block undo journal so disconnection never needs to
//! recompute anything.
//!
//! DB failures are fatal by policy: a node that cannot persist cannot
//! safely continue validating.

mod burn_db;
mod config;
mod settlement_db;

pub use burn_db::BurnClaimDb;
pub use config::Config;
pub use settlement_db::SettlementDb;

use displaydoc::Display;
use thiserror::Error;

/// A persistence error. All variants are fatal to the node.
#[derive(Error, Display, Debug)]
pub enum StateError {
    /// database error: {0}
    Db(#[from] sled::Error),
    /// stored data failed to deserialize: {0}
    Corrupt(String),
    /// stored state disagrees with recomputed state: {0}
    Inconsistent(String),
}
