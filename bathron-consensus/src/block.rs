//! Block validation and the connect/disconnect driver.

pub mod check;
pub mod connect;

pub use connect::{
    connect_block, disconnect_block, BlockUndo, ConnectContext, UtxoView,
};
