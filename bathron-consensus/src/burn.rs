//! The BTC burn-to-mint pipeline.
//!
//! [`check`] validates `TX_BURN_CLAIM` against the embedded Bitcoin
//! transaction, the SPV header view, and the anti-replay rules; [`book`]
//! owns the claim records and the M0BTC supply counter through their
//! PENDING->FINAL lifecycle.

pub mod book;
pub mod check;

pub use book::{BurnBook, ClaimUndo};
pub use check::{check_burn_claim, extract_burn, is_btc_txid_blocked, is_orphaned, ParsedBurn};
