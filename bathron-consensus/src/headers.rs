//! `TX_BTC_HEADERS`: on-chain publication of Bitcoin headers.
//!
//! Block 1 carries the genesis bootstrap: the first producer publishes the
//! BTC header run from the checkpoint to its SPV tip, and every syncing
//! node replays it into its local header source, obtaining a
//! consensus-uniform BTC view without side-channel distribution.
//!
//! The genesis payloads are unsigned; the guard against a malicious first
//! producer is [`check_genesis_headers_agree`]: a node whose own SPV view
//! disagrees with any published header refuses block 1 outright. The check
//! is explicit and always runs; headers the local node has no opinion on
//! are accepted (no opinion means no checkpoint sync, and such a node does
//! not serve consensus).
//!
//! Disconnecting a block never un-publishes headers: BTC header knowledge
//! is monotone, and the header source keeps reorged-out entries addressable
//! by hash anyway.

use secp256k1::{Message, Signature};

use bathron_chain::{
    block::Height,
    btc::HeadersPayload,
    masternode::{MasternodeEntry, ProTxHash},
    parameters::BTCHEADERS_GENESIS_MAX_COUNT,
    serialization::{sha256d, BathronDeserialize, BathronSerialize},
    transaction::{LockTime, Transaction, TxType},
};

use crate::error::BlockError;
use crate::external::BtcHeaderSource;

/// Validate a `TX_BTC_HEADERS` transaction.
///
/// The unsigned form is legal only in block 1 with a zero publisher; later
/// publications must verify against the publisher's operator key.
pub fn check_btc_headers_tx(
    tx: &Transaction,
    height: Height,
    active: &[MasternodeEntry],
) -> Result<HeadersPayload, BlockError> {
    if tx.tx_type != TxType::BtcHeaders {
        return Err(BlockError::BadHeadersPayload);
    }
    let payload = HeadersPayload::bathron_deserialize(&tx.extra_payload[..])
        .map_err(|_| BlockError::BadHeadersPayload)?;
    if payload.headers.is_empty() {
        return Err(BlockError::BadHeadersPayload);
    }

    if payload.sig.is_empty() {
        if height != Height(1) || payload.publisher_pro_tx_hash != ProTxHash([0u8; 32]) {
            return Err(BlockError::BadHeadersSignature);
        }
        return Ok(payload);
    }

    let publisher = active
        .iter()
        .find(|entry| entry.pro_tx_hash == payload.publisher_pro_tx_hash)
        .ok_or(BlockError::BadHeadersSignature)?;
    let digest = sha256d::digest(&payload.signing_bytes());
    let message = Message::from_slice(&digest).expect("sha256d digests are 32 bytes");
    let signature =
        Signature::from_der(&payload.sig).map_err(|_| BlockError::BadHeadersSignature)?;
    secp256k1::Secp256k1::verification_only()
        .verify(&message, &signature, &publisher.operator_key)
        .map_err(|_| BlockError::BadHeadersSignature)?;

    Ok(payload)
}

/// The genesis bootstrap guard (see the module docs).
pub fn check_genesis_headers_agree(
    payload: &HeadersPayload,
    source: &dyn BtcHeaderSource,
) -> Result<(), BlockError> {
    for (offset, header) in payload.headers.iter().enumerate() {
        let height = payload.start_height + offset as u32;
        if let Some(local_hash) = source.get_hash_at_height(height) {
            if local_hash != header.hash() {
                tracing::error!(
                    btc_height = height,
                    published = %header.hash(),
                    local = %local_hash,
                    "published BTC headers disagree with the local SPV chain"
                );
                return Err(BlockError::HeadersSpvMismatch);
            }
        }
    }
    Ok(())
}

/// Replay a validated headers payload into the local header source.
pub fn connect_btc_headers(
    payload: &HeadersPayload,
    source: &mut dyn BtcHeaderSource,
) -> Result<(), BlockError> {
    if !source.accept_headers(payload.start_height, &payload.headers) {
        return Err(BlockError::BadHeadersPayload);
    }
    tracing::debug!(
        start = payload.start_height,
        count = payload.headers.len(),
        "replayed published BTC headers"
    );
    Ok(())
}

/// Build the chunked `TX_BTC_HEADERS` sequence for the canonical block 1,
/// covering BTC heights `[start ..= tip]` of the local SPV view.
pub fn build_genesis_headers_txs(
    source: &dyn BtcHeaderSource,
    start_height: u32,
) -> Vec<Transaction> {
    let tip = match source.tip_height() {
        Some(tip) if tip >= start_height => tip,
        _ => return Vec::new(),
    };

    let mut headers = Vec::with_capacity((tip - start_height + 1) as usize);
    for height in start_height..=tip {
        let header = source
            .get_hash_at_height(height)
            .and_then(|hash| source.get_header_by_hash(&hash));
        match header {
            Some(header) => headers.push(header),
            // A gap means the SPV view is incomplete; publish nothing
            // rather than a run that peers cannot connect.
            None => return Vec::new(),
        }
    }

    headers
        .chunks(BTCHEADERS_GENESIS_MAX_COUNT)
        .enumerate()
        .map(|(chunk_index, chunk)| {
            let payload = HeadersPayload {
                version: HeadersPayload::VERSION,
                publisher_pro_tx_hash: ProTxHash([0u8; 32]),
                start_height: start_height + (chunk_index * BTCHEADERS_GENESIS_MAX_COUNT) as u32,
                headers: chunk.to_vec(),
                sig: Vec::new(),
            };
            Transaction::new(
                1,
                TxType::BtcHeaders,
                vec![],
                vec![],
                LockTime::unlocked(),
                payload
                    .bathron_serialize_to_vec()
                    .expect("writing to a Vec is infallible"),
            )
        })
        .collect()
}
