//! Proof-of-work quantities.
//!
//! Under masternode finality, work matters only as the final tie-break of
//! fork choice; the types here keep the Bitcoin-inherited encodings exact.

pub mod difficulty;
