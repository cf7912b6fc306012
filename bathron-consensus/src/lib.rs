//! Consensus validation for BATHRON.
//!
//! Five cooperating components, driven by block connect/disconnect events:
//!
//! - [`settlement`]: the M0/M1 bearer settlement core: transaction
//!   classification, validation, and exactly-invertible state mutation;
//! - [`burn`]: the BTC burn-to-mint pipeline: SPV claim verification and
//!   the PENDING->FINAL lifecycle;
//! - [`mint`]: deterministic construction and byte-exact validation of
//!   `TX_MINT_M0BTC`;
//! - [`dmm`]: the deterministic masternode miner: slot timing and producer
//!   election;
//! - [`finality`]: quorum signature aggregation and the finality-first fork
//!   choice.
//!
//! [`block`] glues them together under the chain-state lock; [`external`]
//! names the out-of-scope collaborators (the SPV header source and the
//! masternode registry) at their interfaces.

pub mod block;
pub mod burn;
pub mod dmm;
pub mod error;
pub mod external;
pub mod finality;
pub mod headers;
pub mod killswitch;
pub mod mint;
pub mod settlement;

pub use error::{BlockError, BurnClaimError, MintError, TransactionError};
pub use killswitch::EmergencySwitch;
