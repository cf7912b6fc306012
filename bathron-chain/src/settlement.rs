//! Settlement entities: vaults, M1 receipts, and the global supply state.
//!
//! An `M1Receipt` deliberately holds no pointer back to its originating
//! vault: M1 is a bearer asset. Any valid receipt plus any sufficient vault
//! can unlock; soundness comes from the A6 invariant plus strict
//! conservation, not from provenance tracking.

use serde::{Deserialize, Serialize};

use bathron_serde_derive::{BathronDeserialize, BathronSerialize};

use crate::{
    amount::{Amount, NonNegative},
    block::Height,
    serialization::{BathronDeserialize, BathronSerialize, SerializationError},
    transparent::OutPoint,
};

/// A live vault: M0 parked under the OP_TRUE script.
///
/// Created by `TX_LOCK` output 0, erased by `TX_UNLOCK`, and possibly
/// recreated at a new outpoint as vault change in a partial unlock.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, BathronSerialize, BathronDeserialize,
)]
pub struct VaultEntry {
    pub outpoint: OutPoint,
    pub amount: Amount<NonNegative>,
    pub lock_height: Height,
}

/// A live M1 receipt.
///
/// Created by `TX_LOCK` output 1, by `TX_TRANSFER_M1` outputs, or as M1
/// change in a partial unlock; consumed by `TX_UNLOCK` or `TX_TRANSFER_M1`.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, BathronSerialize, BathronDeserialize,
)]
pub struct M1Receipt {
    pub outpoint: OutPoint,
    pub amount: Amount<NonNegative>,
    pub create_height: Height,
}

/// The global, height-versioned settlement supply state.
///
/// The A6 consensus invariant requires `m0_vaulted == m1_supply` at the end
/// of every block.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, BathronSerialize, BathronDeserialize,
)]
pub struct SettlementState {
    /// Total M0 currently held in vaults.
    pub m0_vaulted: Amount<NonNegative>,
    /// Total live M1 receipts.
    pub m1_supply: Amount<NonNegative>,
    /// Total M0 ever minted from finalized burns (the informative A5 sum).
    pub m0_total_supply: Amount<NonNegative>,
    /// The height this state is valid at.
    pub height: Height,
}

impl Default for SettlementState {
    fn default() -> Self {
        SettlementState::empty()
    }
}

impl SettlementState {
    /// The empty pre-genesis state.
    pub fn empty() -> SettlementState {
        SettlementState {
            m0_vaulted: Amount::zero(),
            m1_supply: Amount::zero(),
            m0_total_supply: Amount::zero(),
            height: Height(0),
        }
    }

    /// True iff the A6 invariant holds.
    pub fn a6_holds(&self) -> bool {
        self.m0_vaulted == self.m1_supply
    }
}
