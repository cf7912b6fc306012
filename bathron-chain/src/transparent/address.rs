//! Destination hashes.

use std::fmt;

use ripemd160::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::serialization::{BathronDeserialize, BathronSerialize, SerializationError};

/// A 20-byte hash of a public key, the destination form used by burn marks
/// and mint outputs.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Hash160(pub [u8; 20]);

impl Hash160 {
    /// RIPEMD160(SHA256(data)), the Bitcoin-inherited key-hash construction.
    pub fn of(data: &[u8]) -> Hash160 {
        let sha = Sha256::digest(data);
        let ripe = Ripemd160::digest(&sha);
        let mut out = [0u8; 20];
        out.copy_from_slice(&ripe);
        Hash160(out)
    }
}

impl fmt::Debug for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Hash160").field(&hex::encode(self.0)).finish()
    }
}

impl BathronSerialize for Hash160 {
    fn bathron_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        writer.write_all(&self.0)
    }
}

impl BathronDeserialize for Hash160 {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Hash160(<[u8; 20]>::bathron_deserialize(&mut reader)?))
    }
}
