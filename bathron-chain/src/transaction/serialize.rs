//! Serialization for transactions, so that all the logic is in one place.

use std::io;

use crate::serialization::{BathronDeserialize, BathronSerialize, SerializationError};

/// The maximum size of a transaction in bytes.
pub const MAX_TX_SIZE: u64 = 1_000_000;

use super::*;
use crate::cached::Cached;
use crate::transparent;

impl BathronSerialize for Transaction {
    fn bathron_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.version.bathron_serialize(&mut writer)?;
        self.tx_type.bathron_serialize(&mut writer)?;
        self.inputs.bathron_serialize(&mut writer)?;
        self.outputs.bathron_serialize(&mut writer)?;
        self.locktime.bathron_serialize(&mut writer)?;
        self.extra_payload.bathron_serialize(&mut writer)?;
        Ok(())
    }
}

/// Deserializes a transaction, calculating and caching its txid.
impl BathronDeserialize for Transaction {
    fn bathron_deserialize<R: io::Read>(src: R) -> Result<Self, SerializationError> {
        // Sanity limit on the size of a transaction to protect against DOS
        let mut src = src.take(MAX_TX_SIZE);
        let version = i32::bathron_deserialize(&mut src)?;
        let tx_type = TxType::bathron_deserialize(&mut src)?;
        let inputs = <Vec<transparent::Input>>::bathron_deserialize(&mut src)?;
        let outputs = <Vec<transparent::Output>>::bathron_deserialize(&mut src)?;
        let locktime = LockTime::bathron_deserialize(&mut src)?;
        let extra_payload: Vec<u8> = Vec::bathron_deserialize(&mut src)?;
        if !extra_payload.is_empty() && !tx_type.has_extra_payload() {
            return Err(SerializationError::Parse(
                "extra payload on a type that carries none",
            ));
        }
        let mut tx = Transaction {
            version,
            tx_type,
            inputs,
            outputs,
            locktime,
            extra_payload,
            hash: Cached::new(),
        };
        // Calculate and cache the txid.
        let own_hash = tx.hash();
        tx.hash = Cached::from(own_hash);
        Ok(tx)
    }
}
