//! Hex test vectors shared across the workspace.

use lazy_static::lazy_static;

lazy_static! {
    /// A hand-assembled SegWit Bitcoin transaction that is also a well-formed
    /// BATHRON testnet burn:
    ///
    /// - one input spending `aa..aa:1` with an empty script_sig,
    /// - output 0: zero-value OP_RETURN carrying the 29-byte burn mark
    ///   (`"BATHRON"`, version 1, network 0x01, destination `aa..aa`),
    /// - output 1: 1_000_000 sats to the P2WSH(OP_FALSE) burn program,
    /// - a two-item witness stack, locktime 0.
    pub static ref BURN_TX_SEGWIT: Vec<u8> = hex::decode(
        concat!(
            // version 2
            "02000000",
            // SegWit marker + flag
            "0001",
            // one input: aa..aa:1, empty script_sig, max sequence
            "01",
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "01000000",
            "00",
            "ffffffff",
            // two outputs
            "02",
            // output 0: value 0, OP_RETURN <29-byte burn mark>
            "0000000000000000",
            "1f",
            "6a1d",
            "42415448524f4e", // "BATHRON"
            "01",             // mark version
            "01",             // network byte: testnet
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            // output 1: 1_000_000 sats, OP_0 PUSH32 sha256(0x00)
            "40420f0000000000",
            "22",
            "0020",
            "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d",
            // witness: two single-byte items
            "02",
            "0101",
            "0102",
            // locktime
            "00000000",
        )
    )
    .expect("vector is valid hex");

    /// The same transaction without marker, flag, and witness: the preimage
    /// of its txid.
    pub static ref BURN_TX_NON_WITNESS: Vec<u8> = hex::decode(
        concat!(
            "02000000",
            "01",
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "01000000",
            "00",
            "ffffffff",
            "02",
            "0000000000000000",
            "1f",
            "6a1d",
            "42415448524f4e",
            "01",
            "01",
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "40420f0000000000",
            "22",
            "0020",
            "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d",
            "00000000",
        )
    )
    .expect("vector is valid hex");

    /// The 80-byte Bitcoin mainnet genesis block header.
    pub static ref BTC_GENESIS_HEADER: Vec<u8> = hex::decode(
        concat!(
            "01000000",
            "0000000000000000000000000000000000000000000000000000000000000000",
            "3ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a",
            "29ab5f49",
            "ffff001d",
            "1dac2b7c",
        )
    )
    .expect("vector is valid hex");
}

/// Big-endian display hash of [`struct@BTC_GENESIS_HEADER`].
pub const BTC_GENESIS_HASH_HEX: &str =
    "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";
