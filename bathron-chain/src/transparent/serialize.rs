//! Consensus serialization for transparent inputs and outputs.
//!
//! Coinbase inputs share the Bitcoin wire convention: a null outpoint
//! (all-zero hash, index 0xffff_ffff) followed by the coinbase data in the
//! script position.

use std::io;

use crate::{
    serialization::{BathronDeserialize, BathronSerialize, SerializationError},
    transaction,
};

use super::{CoinbaseData, Input, OutPoint, Output, Script};

const COINBASE_INDEX: u32 = 0xffff_ffff;
const MAX_COINBASE_DATA_LEN: u64 = 100;

impl BathronDeserialize for OutPoint {
    fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(OutPoint {
            hash: transaction::Hash::bathron_deserialize(&mut reader)?,
            index: u32::bathron_deserialize(&mut reader)?,
        })
    }
}

impl BathronDeserialize for Output {
    fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Output {
            value: BathronDeserialize::bathron_deserialize(&mut reader)?,
            lock_script: Script::bathron_deserialize(&mut reader)?,
        })
    }
}

impl BathronSerialize for Input {
    fn bathron_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        match self {
            Input::PrevOut {
                outpoint,
                unlock_script,
                sequence,
            } => {
                outpoint.bathron_serialize(&mut writer)?;
                unlock_script.bathron_serialize(&mut writer)?;
                sequence.bathron_serialize(&mut writer)
            }
            Input::Coinbase { data, sequence } => {
                writer.write_all(&[0u8; 32])?;
                COINBASE_INDEX.bathron_serialize(&mut writer)?;
                data.0.bathron_serialize(&mut writer)?;
                sequence.bathron_serialize(&mut writer)
            }
        }
    }
}

impl BathronDeserialize for Input {
    fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let hash = <[u8; 32]>::bathron_deserialize(&mut reader)?;
        let index = u32::bathron_deserialize(&mut reader)?;
        if hash == [0u8; 32] && index == COINBASE_INDEX {
            let data: Vec<u8> = Vec::bathron_deserialize(&mut reader)?;
            if data.len() as u64 > MAX_COINBASE_DATA_LEN {
                return Err(SerializationError::Parse("coinbase data too long"));
            }
            Ok(Input::Coinbase {
                data: CoinbaseData(data),
                sequence: u32::bathron_deserialize(&mut reader)?,
            })
        } else {
            Ok(Input::PrevOut {
                outpoint: OutPoint {
                    hash: transaction::Hash(hash),
                    index,
                },
                unlock_script: Script::bathron_deserialize(&mut reader)?,
                sequence: u32::bathron_deserialize(&mut reader)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use super::*;
    use crate::amount::Amount;
    use crate::block;

    #[test]
    fn input_roundtrip() {
        let input = Input::PrevOut {
            outpoint: OutPoint {
                hash: transaction::Hash([9u8; 32]),
                index: 3,
            },
            unlock_script: Script(vec![0xde, 0xad]),
            sequence: 0xffff_ffff,
        };
        let bytes = input.bathron_serialize_to_vec().unwrap();
        let round = Input::bathron_deserialize(&bytes[..]).unwrap();
        assert_eq!(input, round);
    }

    #[test]
    fn coinbase_roundtrip_keeps_height() {
        let input = Input::Coinbase {
            data: CoinbaseData::new(block::Height(42), b"bathron"),
            sequence: 0,
        };
        let bytes = input.bathron_serialize_to_vec().unwrap();
        let round = Input::bathron_deserialize(&bytes[..]).unwrap();
        assert_eq!(input, round);
        match round {
            Input::Coinbase { data, .. } => assert_eq!(data.height(), Some(block::Height(42))),
            _ => panic!("coinbase deserialized as prevout"),
        }
    }

    #[test]
    fn output_roundtrip() {
        let output = Output {
            value: Amount::try_from(7_000i64).unwrap(),
            lock_script: Script::new_op_true(),
        };
        let bytes = output.bathron_serialize_to_vec().unwrap();
        let round = Output::bathron_deserialize(&bytes[..]).unwrap();
        assert_eq!(output, round);
    }
}
