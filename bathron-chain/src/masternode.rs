//! Masternode identity types.
//!
//! The registry itself (registration, revocation, ordering) is an external
//! collaborator; consensus consumes its rows through these types.

use std::fmt;

use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use crate::serialization::{BathronDeserialize, BathronSerialize, SerializationError};

/// The 32-byte provider-registration transaction hash identifying a
/// masternode.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct ProTxHash(pub [u8; 32]);

impl fmt::Debug for ProTxHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("ProTxHash")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl BathronSerialize for ProTxHash {
    fn bathron_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        writer.write_all(&self.0)
    }
}

impl BathronDeserialize for ProTxHash {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(ProTxHash(<[u8; 32]>::bathron_deserialize(&mut reader)?))
    }
}

/// One row of the active-masternode list: identity plus the operator key
/// that signs blocks and finality votes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MasternodeEntry {
    pub pro_tx_hash: ProTxHash,
    pub operator_key: PublicKey,
}

impl BathronSerialize for MasternodeEntry {
    fn bathron_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        self.pro_tx_hash.bathron_serialize(&mut writer)?;
        writer.write_all(&self.operator_key.serialize())
    }
}

impl BathronDeserialize for MasternodeEntry {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let pro_tx_hash = ProTxHash::bathron_deserialize(&mut reader)?;
        let mut key_bytes = [0u8; 33];
        reader.read_exact(&mut key_bytes)?;
        let operator_key = PublicKey::from_slice(&key_bytes)
            .map_err(|_| SerializationError::Parse("invalid operator public key"))?;
        Ok(MasternodeEntry {
            pro_tx_hash,
            operator_key,
        })
    }
}
