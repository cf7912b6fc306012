use std::io::Write;

use bytes::Buf;
use chrono::{DateTime, Utc};

use crate::{serialization::sha256d, BathronDeserialize, BathronSerialize, SerializationError};

use crate::{cached::Cached, work::difficulty::CompactDifficulty};

use super::{merkle, Hash};

/// A block header, containing metadata about a block.
///
/// Blocks are chained together via the backwards reference (previous header
/// hash) present in the block header. Each block points backwards to its
/// parent, all the way back to the genesis block.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Header {
    /// The block's version field.
    pub version: u32,

    /// The hash of the previous block, used to create a chain of blocks back
    /// to the genesis block.
    pub previous_block_hash: Hash,

    /// The root of the transaction Merkle tree, binding the block header to
    /// the transactions in the block.
    ///
    /// Note that because of a flaw in Bitcoin's design, the `merkle_root`
    /// does not always precisely bind the contents of the block
    /// (CVE-2012-2459); duplicate-transaction blocks are rejected separately.
    pub merkle_root: merkle::Root,

    /// The block timestamp, a Unix epoch time (UTC).
    ///
    /// Must land on a 15-second producer slot boundary, exceed the median
    /// time past, and lie within the future-time bound.
    pub time: DateTime<Utc>,

    /// An encoded version of the target threshold, in the nBits format used
    /// by Bitcoin.
    ///
    /// Under masternode finality this matters only for the chainwork
    /// tie-break of fork choice.
    pub difficulty_threshold: CompactDifficulty,

    /// An arbitrary field the producer can change to modify the header hash.
    pub nonce: u32,

    /// For efficiency, we cache the hash of this block after computing it
    /// the first time.
    /// This field is not part of the consensus serialization.
    hash: Cached<Hash>,
}

impl Header {
    /// Returns length of the serialized header in bytes.
    pub const fn len() -> usize {
        80
    }

    pub fn new(
        version: u32,
        previous_block_hash: Hash,
        merkle_root: merkle::Root,
        time: DateTime<Utc>,
        difficulty_threshold: CompactDifficulty,
        nonce: u32,
    ) -> Header {
        Header {
            version,
            previous_block_hash,
            merkle_root,
            time,
            difficulty_threshold,
            nonce,
            hash: Cached::new(),
        }
    }

    pub(super) fn cached_hash(&self) -> Option<Hash> {
        self.hash.value()
    }

    /// Deserializes a block header from a Buf object, allowing more
    /// efficient block hash calculation than vanilla deserialize.
    pub fn deserialize_from_buf<B: Buf>(mut src: B) -> Result<Self, SerializationError> {
        if src.remaining() < Header::len() {
            return Err(SerializationError::Parse(
                "Not enough bytes in block header",
            ));
        }
        // Hash the next 80 bytes (the header). This avoids needing to
        // reserialize and hash later.
        let src = src.copy_to_bytes(80);
        let mut hash_writer = sha256d::Writer::default();
        hash_writer
            .write_all(&src[..])
            .expect("Sha256dWriter is infallible");
        let own_hash = Hash::from_bytes_exact(hash_writer.finish());

        // Deserialize the header fields
        let mut src = std::io::Cursor::new(src);
        Ok(Header {
            version: u32::bathron_deserialize(&mut src)?,
            previous_block_hash: Hash::bathron_deserialize(&mut src)?,
            merkle_root: merkle::Root::bathron_deserialize(&mut src)?,
            time: <DateTime<Utc>>::bathron_deserialize(&mut src)?,
            difficulty_threshold: CompactDifficulty::bathron_deserialize(&mut src)?,
            nonce: u32::bathron_deserialize(&mut src)?,
            hash: Cached::from(own_hash),
        })
    }
}

impl BathronSerialize for Header {
    fn bathron_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        self.version.bathron_serialize(&mut writer)?;
        self.previous_block_hash.bathron_serialize(&mut writer)?;
        self.merkle_root.bathron_serialize(&mut writer)?;
        self.time.bathron_serialize(&mut writer)?;
        self.difficulty_threshold.bathron_serialize(&mut writer)?;
        self.nonce.bathron_serialize(&mut writer)?;
        Ok(())
    }
}

impl BathronDeserialize for Header {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut raw = [0u8; 80];
        reader.read_exact(&mut raw)?;
        Header::deserialize_from_buf(&raw[..])
    }
}
