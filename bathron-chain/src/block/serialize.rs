//! Block serialization.

use std::{convert::TryInto, io, io::Read, sync::Arc};

use crate::compactint::CompactInt;
use crate::masternode::ProTxHash;
use crate::serialization::{BathronDeserialize, BathronSerialize, SerializationError};
use crate::transaction::Transaction;

use super::{Block, Header};

/// The maximum size of a BATHRON block, in bytes.
pub const MAX_BLOCK_BYTES: u64 = 4_000_000;

/// The maximum accepted producer signature length (DER ECDSA).
const MAX_SIGNATURE_BYTES: u64 = 80;

impl BathronSerialize for Block {
    fn bathron_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.header.bathron_serialize(&mut writer)?;
        self.producer.bathron_serialize(&mut writer)?;
        self.signature.bathron_serialize(&mut writer)?;
        self.transactions.bathron_serialize(&mut writer)?;
        Ok(())
    }
}

impl BathronDeserialize for Block {
    fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let header = Header::bathron_deserialize(&mut reader)?;

        let mut src = reader.take(MAX_BLOCK_BYTES - Header::len() as u64);
        let producer = ProTxHash::bathron_deserialize(&mut src)?;

        let sig_len = CompactInt::bathron_deserialize(&mut src)?.value();
        if sig_len > MAX_SIGNATURE_BYTES {
            return Err(SerializationError::Parse("producer signature too long"));
        }
        let mut signature = vec![0u8; sig_len as usize];
        src.read_exact(&mut signature)?;

        let tx_count = CompactInt::bathron_deserialize(&mut src)?.value();
        // Sanity check number of transactions to prevent DOS attacks
        if tx_count > MAX_BLOCK_BYTES / (36 * 4) {
            return Err(SerializationError::Parse(
                "Block contained too many transactions for each to have at least one input",
            ));
        }
        let mut transactions =
            Vec::with_capacity(tx_count.try_into().expect("tx count fits usize"));
        for _ in 0..tx_count {
            transactions.push(<Arc<Transaction>>::bathron_deserialize(&mut src)?);
        }

        Ok(Block {
            header,
            producer,
            signature,
            transactions,
        })
    }
}
