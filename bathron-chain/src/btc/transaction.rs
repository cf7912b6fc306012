//! Strict Bitcoin transaction parsing and reserialization.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::amount::MAX_MONEY;
use crate::compactint::CompactInt;
use crate::parameters::{
    MAX_BTC_TX_CONSENSUS_BYTES, MAX_BTC_TX_OUTPUTS, MAX_BTC_TX_SANITY_BYTES,
};
use crate::serialization::{sha256d, BathronDeserialize, BathronSerialize};

use super::{ParseError, Txid};

/// A hard cap on inputs; 41 bytes is the minimum input encoding, so this is
/// unreachable within the consensus size ceiling and exists as
/// defense-in-depth against pathological var-ints.
const MAX_BTC_TX_INPUTS: u64 = 1_000;

const SEGWIT_MARKER: u8 = 0x00;
const SEGWIT_FLAG: u8 = 0x01;

/// One parsed Bitcoin input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Input {
    pub prev_txid: Txid,
    pub prev_index: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

/// One parsed Bitcoin output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Output {
    /// Output value in satoshis.
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

/// A witness stack: one vector of items per input.
pub type Witness = Vec<Vec<u8>>;

/// A strictly parsed Bitcoin transaction.
///
/// `witnesses` is empty for legacy serializations and has exactly one entry
/// per input for SegWit serializations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub witnesses: Vec<Witness>,
    pub locktime: u32,
}

impl Transaction {
    /// Parse a transaction from exact wire bytes.
    ///
    /// Rejects trailing bytes, witness-flagged transactions without witness
    /// data, and anything over the DoS ceilings.
    pub fn parse(bytes: &[u8]) -> Result<Transaction, ParseError> {
        if bytes.len() > MAX_BTC_TX_SANITY_BYTES {
            return Err(ParseError::OversizedSanity);
        }
        if bytes.len() > MAX_BTC_TX_CONSENSUS_BYTES {
            return Err(ParseError::OversizedConsensus);
        }

        let mut src = Cursor::new(bytes);
        let version = src
            .read_i32::<LittleEndian>()
            .map_err(|_| ParseError::Truncated)?;

        // A zero byte where the input count belongs is the SegWit marker:
        // a legacy transaction cannot have zero inputs.
        let mut input_count = read_compact(&mut src)?;
        let segwit = input_count == 0;
        if segwit {
            let flag = src.read_u8().map_err(|_| ParseError::Truncated)?;
            if flag != SEGWIT_FLAG {
                return Err(ParseError::BadSegwitFlag);
            }
            input_count = read_compact(&mut src)?;
        }

        if input_count == 0 {
            return Err(ParseError::NoInputs);
        }
        if input_count > MAX_BTC_TX_INPUTS {
            return Err(ParseError::TooManyInputs);
        }

        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            inputs.push(Input {
                prev_txid: Txid(read_array(&mut src)?),
                prev_index: src
                    .read_u32::<LittleEndian>()
                    .map_err(|_| ParseError::Truncated)?,
                script_sig: read_blob(&mut src)?,
                sequence: src
                    .read_u32::<LittleEndian>()
                    .map_err(|_| ParseError::Truncated)?,
            });
        }

        let output_count = read_compact(&mut src)?;
        if output_count == 0 {
            return Err(ParseError::NoOutputs);
        }
        if output_count > MAX_BTC_TX_OUTPUTS as u64 {
            return Err(ParseError::TooManyOutputs);
        }

        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            let value = src
                .read_u64::<LittleEndian>()
                .map_err(|_| ParseError::Truncated)?;
            if value > MAX_MONEY as u64 {
                return Err(ParseError::ValueOutOfRange);
            }
            outputs.push(Output {
                value,
                script_pubkey: read_blob(&mut src)?,
            });
        }

        let mut witnesses = Vec::new();
        if segwit {
            let mut any_items = false;
            for _ in 0..input_count {
                let item_count = read_compact(&mut src)?;
                let mut stack = Vec::with_capacity(item_count as usize);
                for _ in 0..item_count {
                    stack.push(read_blob(&mut src)?);
                }
                any_items |= !stack.is_empty();
                witnesses.push(stack);
            }
            // A marker+flag serialization whose stacks are all empty is
            // non-canonical; Bitcoin requires the legacy form there.
            if !any_items {
                return Err(ParseError::EmptyWitness);
            }
        }

        let locktime = src
            .read_u32::<LittleEndian>()
            .map_err(|_| ParseError::Truncated)?;

        if src.position() != bytes.len() as u64 {
            return Err(ParseError::TrailingBytes);
        }

        Ok(Transaction {
            version,
            inputs,
            outputs,
            witnesses,
            locktime,
        })
    }

    pub fn has_witness(&self) -> bool {
        !self.witnesses.is_empty()
    }

    /// The non-witness serialization: the txid preimage.
    pub fn non_witness_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_core(&mut out, false);
        out
    }

    /// The full wire serialization (marker, flag, and witness included when
    /// present): the wtxid preimage.
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_core(&mut out, self.has_witness());
        out
    }

    /// The identifier Bitcoin headers commit to.
    pub fn txid(&self) -> Txid {
        Txid(sha256d::digest(&self.non_witness_bytes()))
    }

    /// The witness-inclusive identifier; equals [`Self::txid`] exactly when
    /// there is no witness.
    pub fn wtxid(&self) -> Txid {
        Txid(sha256d::digest(&self.wire_bytes()))
    }

    fn write_core(&self, out: &mut Vec<u8>, with_witness: bool) {
        out.write_i32::<LittleEndian>(self.version)
            .expect("writing to a Vec is infallible");
        if with_witness {
            out.push(SEGWIT_MARKER);
            out.push(SEGWIT_FLAG);
        }
        write_compact(out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(&input.prev_txid.0);
            out.write_u32::<LittleEndian>(input.prev_index)
                .expect("writing to a Vec is infallible");
            write_compact(out, input.script_sig.len() as u64);
            out.extend_from_slice(&input.script_sig);
            out.write_u32::<LittleEndian>(input.sequence)
                .expect("writing to a Vec is infallible");
        }
        write_compact(out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.write_u64::<LittleEndian>(output.value)
                .expect("writing to a Vec is infallible");
            write_compact(out, output.script_pubkey.len() as u64);
            out.extend_from_slice(&output.script_pubkey);
        }
        if with_witness {
            for stack in &self.witnesses {
                write_compact(out, stack.len() as u64);
                for item in stack {
                    write_compact(out, item.len() as u64);
                    out.extend_from_slice(item);
                }
            }
        }
        out.write_u32::<LittleEndian>(self.locktime)
            .expect("writing to a Vec is infallible");
    }
}

fn read_compact(src: &mut Cursor<&[u8]>) -> Result<u64, ParseError> {
    CompactInt::bathron_deserialize(src)
        .map(|ci| ci.value())
        .map_err(|_| ParseError::Truncated)
}

fn write_compact(out: &mut Vec<u8>, value: u64) {
    CompactInt::from(value as usize)
        .bathron_serialize(out)
        .expect("writing to a Vec is infallible");
}

fn read_array(src: &mut Cursor<&[u8]>) -> Result<[u8; 32], ParseError> {
    let mut out = [0u8; 32];
    src.read_exact(&mut out).map_err(|_| ParseError::Truncated)?;
    Ok(out)
}

fn read_blob(src: &mut Cursor<&[u8]>) -> Result<Vec<u8>, ParseError> {
    let len = read_compact(src)?;
    let remaining = src.get_ref().len() as u64 - src.position();
    if len > remaining {
        return Err(ParseError::BadLength);
    }
    let mut out = vec![0u8; len as usize];
    src.read_exact(&mut out).map_err(|_| ParseError::Truncated)?;
    Ok(out)
}
