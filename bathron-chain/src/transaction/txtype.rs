use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::serialization::{BathronDeserialize, BathronSerialize, SerializationError};

/// The 16-bit transaction type tag.
///
/// Everything that is not a plain transfer is routed by this tag: the
/// settlement triplet, burn claims, mints, and BTC header publication.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub enum TxType {
    /// Standard transfer of M0.
    Normal,
    /// Create a vault + receipt from M0.
    Lock,
    /// Redeem an M1 receipt + vault back to M0.
    Unlock,
    /// Transfer an M1 receipt.
    TransferM1,
    /// Register a Bitcoin burn (enters PENDING).
    BurnClaim,
    /// Finalize PENDING burns into spendable M0.
    MintM0Btc,
    /// Publish BTC block headers on-chain.
    BtcHeaders,
}

impl TxType {
    pub fn as_u16(self) -> u16 {
        match self {
            TxType::Normal => 0,
            TxType::Lock => 1,
            TxType::Unlock => 2,
            TxType::TransferM1 => 3,
            TxType::BurnClaim => 4,
            TxType::MintM0Btc => 5,
            TxType::BtcHeaders => 6,
        }
    }

    /// The three types that may create or consume vaults and receipts.
    pub fn is_settlement(self) -> bool {
        matches!(self, TxType::Lock | TxType::Unlock | TxType::TransferM1)
    }

    /// The types that carry an extra payload.
    pub fn has_extra_payload(self) -> bool {
        matches!(
            self,
            TxType::BurnClaim | TxType::MintM0Btc | TxType::BtcHeaders
        )
    }
}

impl TryFrom<u16> for TxType {
    type Error = SerializationError;

    fn try_from(tag: u16) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(TxType::Normal),
            1 => Ok(TxType::Lock),
            2 => Ok(TxType::Unlock),
            3 => Ok(TxType::TransferM1),
            4 => Ok(TxType::BurnClaim),
            5 => Ok(TxType::MintM0Btc),
            6 => Ok(TxType::BtcHeaders),
            _ => Err(SerializationError::Parse("unknown transaction type tag")),
        }
    }
}

impl BathronSerialize for TxType {
    fn bathron_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        self.as_u16().bathron_serialize(writer)
    }
}

impl BathronDeserialize for TxType {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        TxType::try_from(u16::bathron_deserialize(&mut reader)?)
    }
}
