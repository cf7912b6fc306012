//! The M0/M1 settlement core.
//!
//! Three tightly coupled pieces:
//!
//! - [`view`]: the pure transaction classifier, producing a
//!   [`view::SettlementTxView`] from a transaction plus a resolved view of
//!   its inputs;
//! - [`check`]: the per-type validators and the OP_TRUE containment rule;
//! - [`book`]: the vault/receipt indices and supply state, mutated only by
//!   block connection and exactly reversed by the captured undo records.

pub mod book;
pub mod check;
pub mod view;

pub use book::{SettlementBook, SettlementUndo};
pub use view::{parse_settlement_tx, InputView, ResolvedInput, SettlementIndex, SettlementTxView};
