#![allow(clippy::unit_arg)]
use crate::{
    compactint::CompactInt,
    serialization::{BathronDeserialize, BathronSerialize, SerializationError},
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    io::{self, Read},
};

use super::Hash160;

/// The single-byte anyone-can-spend opcode used by settlement vaults.
pub const OP_TRUE: u8 = 0x51;

/// OP_RETURN, the unspendable data-carrier opcode.
pub const OP_RETURN: u8 = 0x6a;

/// An encoding of a BATHRON script.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn serialized_size(&self) -> usize {
        CompactInt::size(self.0.len()) + self.0.len()
    }

    /// The vault script: exactly one OP_TRUE byte.
    ///
    /// Anyone can satisfy it; consensus forbids every transaction type other
    /// than TX_UNLOCK from consuming it, and every type other than
    /// TX_LOCK / TX_UNLOCK from producing it.
    pub fn new_op_true() -> Script {
        Script(vec![OP_TRUE])
    }

    /// True iff this script is exactly the single-byte OP_TRUE vault script.
    pub fn is_op_true(&self) -> bool {
        self.0 == [OP_TRUE]
    }

    /// True iff this script starts with OP_RETURN.
    pub fn is_op_return(&self) -> bool {
        self.0.first() == Some(&OP_RETURN)
    }

    /// The standard pay-to-pubkey-hash script for `dest`.
    pub fn new_p2pkh(dest: &Hash160) -> Script {
        let mut bytes = Vec::with_capacity(25);
        bytes.extend_from_slice(&[0x76, 0xa9, 0x14]); // OP_DUP OP_HASH160 PUSH20
        bytes.extend_from_slice(&dest.0);
        bytes.extend_from_slice(&[0x88, 0xac]); // OP_EQUALVERIFY OP_CHECKSIG
        Script(bytes)
    }

    /// The destination hash of a canonical P2PKH script, if this is one.
    pub fn p2pkh_hash(&self) -> Option<Hash160> {
        if self.0.len() == 25
            && self.0[0..3] == [0x76, 0xa9, 0x14]
            && self.0[23..25] == [0x88, 0xac]
        {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&self.0[3..23]);
            Some(Hash160(hash))
        } else {
            None
        }
    }

    /// True for scripts that can never be satisfied (data carriers and
    /// oversized scripts); such scripts are not valid M1 destinations.
    pub fn is_unspendable(&self) -> bool {
        self.is_op_return() || self.0.len() > 10_000
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Script")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl BathronSerialize for Script {
    fn bathron_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        CompactInt::from(self.0.len()).bathron_serialize(&mut writer)?;
        writer.write_all(&self.0[..])?;
        Ok(())
    }
}

impl BathronDeserialize for Script {
    fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let len = CompactInt::bathron_deserialize(&mut reader)?.value();
        let mut bytes = Vec::new();
        reader.take(len).read_to_end(&mut bytes)?;
        if bytes.len() as u64 != len {
            return Err(SerializationError::Parse("script shorter than its length"));
        }
        Ok(Script(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_true_is_exact() {
        assert!(Script(vec![0x51]).is_op_true());
        assert!(!Script(vec![0x51, 0x51]).is_op_true());
        assert!(!Script(vec![]).is_op_true());
    }

    #[test]
    fn p2pkh_roundtrip() {
        let dest = Hash160([7u8; 20]);
        let script = Script::new_p2pkh(&dest);
        assert_eq!(script.p2pkh_hash(), Some(dest));
        assert!(!script.is_unspendable());
    }
}

#[cfg(test)]
mod proptests {
    use std::io::Cursor;

    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn script_roundtrip(script in any::<Script>()) {
            bathron_test::init();

            let mut bytes = Cursor::new(Vec::new());
            script.bathron_serialize(&mut bytes)?;

            bytes.set_position(0);
            let other_script = Script::bathron_deserialize(&mut bytes)?;

            prop_assert_eq![script, other_script];
        }
    }
}
