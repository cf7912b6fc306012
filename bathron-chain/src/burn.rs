//! Burn entities and the wire payloads that move them.
//!
//! A Bitcoin transaction is a BATHRON burn iff its output set contains
//! exactly one zero-value OP_RETURN carrying the 29-byte burn mark and
//! exactly one positive-value P2WSH(OP_FALSE) output. The mark encodes the
//! minting destination; the witness-program output carries the burned value.
//! No signature anywhere: the burn is self-authenticating via its embedded
//! destination.

use serde::{Deserialize, Serialize};

use bathron_serde_derive::{BathronDeserialize, BathronSerialize};

use crate::{
    block::Height,
    btc,
    compactint::CompactInt,
    parameters::{MAX_BTC_TX_SANITY_BYTES, MAX_MERKLE_PROOF_DEPTH},
    serialization::{BathronDeserialize, BathronSerialize, SerializationError},
    transparent::Hash160,
};

/// The magic prefix of the OP_RETURN burn mark.
pub const BURN_MARK_MAGIC: &[u8; 7] = b"BATHRON";

/// The only accepted burn mark version.
pub const BURN_MARK_VERSION: u8 = 1;

/// The exact length of the OP_RETURN burn mark payload.
pub const BURN_MARK_LEN: usize = 29;

/// SHA256(0x00): the witness program of the provably-unspendable
/// P2WSH(OP_FALSE) burn output.
pub const BURN_WITNESS_PROGRAM: [u8; 32] = [
    0x6e, 0x34, 0x0b, 0x9c, 0xff, 0xb3, 0x7a, 0x98, 0x9c, 0xa5, 0x44, 0xe6, 0xbb, 0x78, 0x0a,
    0x2c, 0x78, 0x90, 0x1d, 0x3f, 0xb3, 0x37, 0x38, 0x76, 0x85, 0x11, 0xa3, 0x06, 0x17, 0xaf,
    0xa0, 0x1d,
];

/// The decoded 29-byte burn mark.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BurnMark {
    pub version: u8,
    pub network_byte: u8,
    pub dest: Hash160,
}

impl BurnMark {
    /// Decode a mark from the 29 bytes following OP_RETURN's push.
    pub fn parse(payload: &[u8]) -> Option<BurnMark> {
        if payload.len() != BURN_MARK_LEN {
            return None;
        }
        if &payload[0..7] != BURN_MARK_MAGIC {
            return None;
        }
        let version = payload[7];
        if version != BURN_MARK_VERSION {
            return None;
        }
        let mut dest = [0u8; 20];
        dest.copy_from_slice(&payload[9..29]);
        Some(BurnMark {
            version,
            network_byte: payload[8],
            dest: Hash160(dest),
        })
    }

    /// Decode a mark from a full output script: `OP_RETURN PUSH29 <mark>`.
    pub fn parse_script(script_pubkey: &[u8]) -> Option<BurnMark> {
        if script_pubkey.len() != 2 + BURN_MARK_LEN {
            return None;
        }
        if script_pubkey[0] != 0x6a || script_pubkey[1] != BURN_MARK_LEN as u8 {
            return None;
        }
        BurnMark::parse(&script_pubkey[2..])
    }

    /// The full output script carrying this mark.
    pub fn to_script(&self) -> Vec<u8> {
        let mut script = Vec::with_capacity(2 + BURN_MARK_LEN);
        script.push(0x6a);
        script.push(BURN_MARK_LEN as u8);
        script.extend_from_slice(BURN_MARK_MAGIC);
        script.push(self.version);
        script.push(self.network_byte);
        script.extend_from_slice(&self.dest.0);
        script
    }
}

/// True iff `script_pubkey` is the P2WSH(OP_FALSE) burn output script:
/// `OP_0 PUSH32 <sha256(0x00)>`.
pub fn is_burn_witness_script(script_pubkey: &[u8]) -> bool {
    script_pubkey.len() == 34
        && script_pubkey[0] == 0x00
        && script_pubkey[1] == 0x20
        && script_pubkey[2..] == BURN_WITNESS_PROGRAM[..]
}

/// The persisted lifecycle state of a burn claim.
///
/// "Orphaned" is a derived display state (PENDING whose BTC block left the
/// best chain) and is never written.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ClaimStatus {
    Pending,
    Final,
}

impl ClaimStatus {
    pub fn as_byte(self) -> u8 {
        match self {
            ClaimStatus::Pending => 0,
            ClaimStatus::Final => 1,
        }
    }
}

impl BathronSerialize for ClaimStatus {
    fn bathron_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        writer.write_all(&[self.as_byte()])
    }
}

impl BathronDeserialize for ClaimStatus {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        match u8::bathron_deserialize(&mut reader)? {
            0 => Ok(ClaimStatus::Pending),
            1 => Ok(ClaimStatus::Final),
            _ => Err(SerializationError::Parse("unknown claim status")),
        }
    }
}

/// One burn claim, keyed by its Bitcoin txid.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, BathronSerialize, BathronDeserialize,
)]
pub struct BurnClaimRecord {
    pub btc_txid: btc::Txid,
    pub btc_block_hash: btc::BlockHash,
    pub btc_height: u32,
    pub burned_sats: u64,
    pub bathron_dest: Hash160,
    pub claim_height: Height,
    /// Zero while PENDING.
    pub final_height: Height,
    pub status: ClaimStatus,
}

/// The `extra_payload` of `TX_BURN_CLAIM`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BurnClaimPayload {
    pub version: u8,
    /// Full BTC wire bytes of the burn transaction.
    pub btc_tx_bytes: Vec<u8>,
    pub btc_block_hash: btc::BlockHash,
    pub btc_block_height: u32,
    /// Sibling hashes from the txid up to the BTC header's merkle root.
    pub merkle_proof: Vec<[u8; 32]>,
    /// Position of the transaction in the BTC block.
    pub tx_index: u32,
}

impl BurnClaimPayload {
    pub const VERSION: u8 = 1;
}

impl BathronSerialize for BurnClaimPayload {
    fn bathron_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        writer.write_all(&[self.version])?;
        self.btc_tx_bytes.bathron_serialize(&mut writer)?;
        self.btc_block_hash.bathron_serialize(&mut writer)?;
        self.btc_block_height.bathron_serialize(&mut writer)?;
        self.merkle_proof.bathron_serialize(&mut writer)?;
        self.tx_index.bathron_serialize(&mut writer)?;
        Ok(())
    }
}

impl BathronDeserialize for BurnClaimPayload {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let version = u8::bathron_deserialize(&mut reader)?;
        if version != Self::VERSION {
            return Err(SerializationError::Parse("unknown burn claim version"));
        }
        let tx_len = CompactInt::bathron_deserialize(&mut reader)?.value();
        if tx_len as usize > MAX_BTC_TX_SANITY_BYTES {
            return Err(SerializationError::Parse("embedded BTC tx too large"));
        }
        let mut btc_tx_bytes = vec![0u8; tx_len as usize];
        reader.read_exact(&mut btc_tx_bytes)?;

        let btc_block_hash = btc::BlockHash::bathron_deserialize(&mut reader)?;
        let btc_block_height = u32::bathron_deserialize(&mut reader)?;

        let proof_len = CompactInt::bathron_deserialize(&mut reader)?.value();
        if proof_len as usize > MAX_MERKLE_PROOF_DEPTH {
            return Err(SerializationError::Parse("merkle proof too deep"));
        }
        let mut merkle_proof = Vec::with_capacity(proof_len as usize);
        for _ in 0..proof_len {
            merkle_proof.push(<[u8; 32]>::bathron_deserialize(&mut reader)?);
        }

        Ok(BurnClaimPayload {
            version,
            btc_tx_bytes,
            btc_block_hash,
            btc_block_height,
            merkle_proof,
            tx_index: u32::bathron_deserialize(&mut reader)?,
        })
    }
}

/// The `extra_payload` of `TX_MINT_M0BTC`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MintPayload {
    pub version: u8,
    /// The claims finalized by this mint, in strict lexicographic txid
    /// order (validated, not assumed).
    pub btc_txids: Vec<btc::Txid>,
}

impl MintPayload {
    pub const VERSION: u8 = 1;

    /// Parse-time DoS bound; the validator separately enforces the
    /// consensus maximum of 100.
    const MAX_TXIDS: u64 = 10_000;
}

impl BathronSerialize for MintPayload {
    fn bathron_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        writer.write_all(&[self.version])?;
        self.btc_txids.bathron_serialize(&mut writer)?;
        Ok(())
    }
}

impl BathronDeserialize for MintPayload {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let version = u8::bathron_deserialize(&mut reader)?;
        if version != Self::VERSION {
            return Err(SerializationError::Parse("unknown mint payload version"));
        }
        let count = CompactInt::bathron_deserialize(&mut reader)?.value();
        if count > Self::MAX_TXIDS {
            return Err(SerializationError::Parse("mint payload too large"));
        }
        let mut btc_txids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            btc_txids.push(btc::Txid::bathron_deserialize(&mut reader)?);
        }
        Ok(MintPayload { version, btc_txids })
    }
}
