//! Bitcoin block headers, as published on-chain by `TX_BTC_HEADERS`.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::compactint::CompactInt;
use crate::masternode::ProTxHash;
use crate::parameters::BTCHEADERS_GENESIS_MAX_COUNT;
use crate::serialization::{sha256d, BathronDeserialize, BathronSerialize, SerializationError};

use super::{BlockHash, ParseError};

/// The 80-byte Bitcoin block header.
///
/// Validation of these headers (difficulty, chain linkage) belongs to the
/// SPV header source; consensus only parses, hashes, and relays them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub version: i32,
    pub previous_block_hash: BlockHash,
    pub merkle_root: [u8; 32],
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl Header {
    /// Serialized header length in bytes.
    pub const fn len() -> usize {
        80
    }

    /// Parse a header from exactly 80 bytes.
    pub fn parse(bytes: &[u8]) -> Result<Header, ParseError> {
        if bytes.len() != Header::len() {
            return Err(ParseError::BadHeaderLength);
        }
        let mut src = Cursor::new(bytes);
        let mut read_32 = |src: &mut Cursor<&[u8]>| -> [u8; 32] {
            let mut out = [0u8; 32];
            src.read_exact(&mut out).expect("length checked above");
            out
        };
        let version = src.read_i32::<LittleEndian>().expect("length checked");
        let previous_block_hash = BlockHash(read_32(&mut src));
        let merkle_root = read_32(&mut src);
        Ok(Header {
            version,
            previous_block_hash,
            merkle_root,
            time: src.read_u32::<LittleEndian>().expect("length checked"),
            bits: src.read_u32::<LittleEndian>().expect("length checked"),
            nonce: src.read_u32::<LittleEndian>().expect("length checked"),
        })
    }

    /// The exact 80 wire bytes.
    pub fn to_bytes(&self) -> [u8; 80] {
        let mut out = Vec::with_capacity(Header::len());
        out.write_i32::<LittleEndian>(self.version)
            .expect("writing to a Vec is infallible");
        out.extend_from_slice(&self.previous_block_hash.0);
        out.extend_from_slice(&self.merkle_root);
        out.write_u32::<LittleEndian>(self.time)
            .expect("writing to a Vec is infallible");
        out.write_u32::<LittleEndian>(self.bits)
            .expect("writing to a Vec is infallible");
        out.write_u32::<LittleEndian>(self.nonce)
            .expect("writing to a Vec is infallible");
        let mut fixed = [0u8; 80];
        fixed.copy_from_slice(&out);
        fixed
    }

    /// The block hash: sha256d of the 80 header bytes.
    pub fn hash(&self) -> BlockHash {
        BlockHash(sha256d::digest(&self.to_bytes()))
    }
}

impl BathronSerialize for Header {
    fn bathron_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        writer.write_all(&self.to_bytes())
    }
}

impl BathronDeserialize for Header {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let raw = <[u8; 80]>::bathron_deserialize(&mut reader)?;
        Header::parse(&raw).map_err(|_| SerializationError::Parse("malformed BTC header"))
    }
}

/// The `extra_payload` of `TX_BTC_HEADERS`: a run of consecutive Bitcoin
/// headers published on-chain.
///
/// Block 1 carries the genesis bootstrap sequence with a zero publisher and
/// an empty signature; later publications are signed by the publishing
/// masternode's operator key.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HeadersPayload {
    pub version: u16,
    /// Zero at genesis.
    pub publisher_pro_tx_hash: ProTxHash,
    /// BTC height of the first header in `headers`.
    pub start_height: u32,
    pub headers: Vec<Header>,
    /// Operator ECDSA signature over the payload body; empty at genesis.
    pub sig: Vec<u8>,
}

impl HeadersPayload {
    pub const VERSION: u16 = 1;

    /// The signature preimage: every field except the signature itself.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_body(&mut out)
            .expect("writing to a Vec is infallible");
        out
    }

    fn write_body<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        self.version.bathron_serialize(&mut writer)?;
        self.publisher_pro_tx_hash.bathron_serialize(&mut writer)?;
        self.start_height.bathron_serialize(&mut writer)?;
        (self.headers.len() as u16).bathron_serialize(&mut writer)?;
        for header in &self.headers {
            header.bathron_serialize(&mut writer)?;
        }
        Ok(())
    }
}

impl BathronSerialize for HeadersPayload {
    fn bathron_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        self.write_body(&mut writer)?;
        self.sig.bathron_serialize(&mut writer)?;
        Ok(())
    }
}

impl BathronDeserialize for HeadersPayload {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let version = u16::bathron_deserialize(&mut reader)?;
        if version != Self::VERSION {
            return Err(SerializationError::Parse("unknown headers payload version"));
        }
        let publisher_pro_tx_hash = ProTxHash::bathron_deserialize(&mut reader)?;
        let start_height = u32::bathron_deserialize(&mut reader)?;
        let count = u16::bathron_deserialize(&mut reader)?;
        if count as usize > BTCHEADERS_GENESIS_MAX_COUNT {
            return Err(SerializationError::Parse("too many headers in payload"));
        }
        let mut headers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            headers.push(Header::bathron_deserialize(&mut reader)?);
        }
        let sig_len = CompactInt::bathron_deserialize(&mut reader)?.value();
        if sig_len > 80 {
            return Err(SerializationError::Parse("headers payload sig too long"));
        }
        let mut sig = vec![0u8; sig_len as usize];
        reader.read_exact(&mut sig)?;
        Ok(HeadersPayload {
            version,
            publisher_pro_tx_hash,
            start_height,
            headers,
            sig,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bathron_test::vectors::{BTC_GENESIS_HASH_HEX, BTC_GENESIS_HEADER};

    #[test]
    fn genesis_header_roundtrip_and_hash() {
        bathron_test::init();

        let header = Header::parse(&BTC_GENESIS_HEADER).expect("genesis header parses");
        assert_eq!(header.version, 1);
        assert_eq!(header.previous_block_hash, BlockHash([0u8; 32]));
        assert_eq!(&header.to_bytes()[..], &BTC_GENESIS_HEADER[..]);
        assert_eq!(header.hash().to_string(), BTC_GENESIS_HASH_HEX);
    }

    #[test]
    fn wrong_length_rejected() {
        bathron_test::init();

        assert_eq!(
            Header::parse(&BTC_GENESIS_HEADER[..79]),
            Err(ParseError::BadHeaderLength)
        );
    }

    #[test]
    fn headers_payload_roundtrip() {
        bathron_test::init();

        let genesis = Header::parse(&BTC_GENESIS_HEADER).unwrap();
        let payload = HeadersPayload {
            version: HeadersPayload::VERSION,
            publisher_pro_tx_hash: ProTxHash([0u8; 32]),
            start_height: 0,
            headers: vec![genesis],
            sig: Vec::new(),
        };
        let bytes = payload.bathron_serialize_to_vec().unwrap();
        let round = HeadersPayload::bathron_deserialize(&bytes[..]).unwrap();
        assert_eq!(payload, round);
        // The signing preimage excludes only the signature.
        assert_eq!(payload.signing_bytes().len(), bytes.len() - 1);
    }
}
