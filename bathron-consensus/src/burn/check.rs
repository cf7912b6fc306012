//! Burn claim validation.
//!
//! `check_burn_claim` runs its steps in a fixed order so every node rejects
//! with the same reason; the order is part of the observable contract
//! (monitoring matches on reject strings).

use bathron_chain::{
    btc,
    burn::{is_burn_witness_script, BurnClaimPayload, BurnMark, ClaimStatus},
    parameters::MAX_BTC_TX_CONSENSUS_BYTES,
    serialization::BathronDeserialize,
    transaction::{Transaction, TxType},
};

use crate::error::BurnClaimError;
use crate::external::BtcHeaderSource;
use crate::killswitch::EmergencySwitch;

use super::book::BurnBook;

/// The burn facts extracted from a valid claim, ready to become a PENDING
/// record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedBurn {
    pub btc_txid: btc::Txid,
    pub btc_block_hash: btc::BlockHash,
    pub btc_height: u32,
    pub burned_sats: u64,
    pub mark: BurnMark,
}

/// Find the burn pair in a parsed Bitcoin transaction: exactly one OP_RETURN
/// mark of zero value and exactly one positive-value witness-program burn
/// output.
pub fn extract_burn(tx: &btc::Transaction) -> Option<(BurnMark, u64)> {
    let mut mark = None;
    let mut burned: Option<u64> = None;

    for output in &tx.outputs {
        if let Some(parsed) = BurnMark::parse_script(&output.script_pubkey) {
            if output.value != 0 || mark.is_some() {
                return None;
            }
            mark = Some(parsed);
        } else if is_burn_witness_script(&output.script_pubkey) {
            if output.value == 0 || burned.is_some() {
                return None;
            }
            burned = Some(output.value);
        }
    }

    match (mark, burned) {
        (Some(mark), Some(value)) => Some((mark, value)),
        _ => None,
    }
}

/// The derived "orphaned" display state: PENDING, but the claimed BTC
/// block has left the best chain. Never persisted: it is recomputed on
/// every read, and flips back by itself if the block is re-mined.
pub fn is_orphaned(
    record: &bathron_chain::burn::BurnClaimRecord,
    source: &dyn BtcHeaderSource,
) -> bool {
    record.status == ClaimStatus::Pending && !source.is_in_best_chain(&record.btc_block_hash)
}

/// The anti-replay rule with deterministic release.
///
/// A FINAL record blocks its txid forever. A PENDING record blocks only
/// while its BTC block remains on the best header chain; once the block is
/// reorged out, the txid is re-claimable (the stale record is overwritten,
/// preserving auditability).
pub fn is_btc_txid_blocked(
    txid: &btc::Txid,
    book: &BurnBook,
    source: &dyn BtcHeaderSource,
) -> bool {
    match book.get(txid) {
        Some(record) => match record.status {
            ClaimStatus::Final => true,
            ClaimStatus::Pending => source.is_in_best_chain(&record.btc_block_hash),
        },
        None => false,
    }
}

/// Validate a `TX_BURN_CLAIM`, returning the burn facts on success.
///
/// The checks run in the documented order: kill switch, parse, anti-replay,
/// header lookup and SPV range, height agreement, inclusion proof, burn
/// format, network byte.
pub fn check_burn_claim(
    tx: &Transaction,
    book: &BurnBook,
    source: &dyn BtcHeaderSource,
    network: bathron_chain::parameters::Network,
    switch: &EmergencySwitch,
) -> Result<ParsedBurn, BurnClaimError> {
    if !switch.burns_enabled() {
        return Err(BurnClaimError::Disabled);
    }

    if tx.tx_type != TxType::BurnClaim {
        return Err(BurnClaimError::ParseFailed);
    }
    let payload = BurnClaimPayload::bathron_deserialize(&tx.extra_payload[..])
        .map_err(|_| BurnClaimError::ParseFailed)?;

    if payload.btc_tx_bytes.len() > MAX_BTC_TX_CONSENSUS_BYTES {
        return Err(BurnClaimError::ParseFailed);
    }
    let btc_tx =
        btc::Transaction::parse(&payload.btc_tx_bytes).map_err(|_| BurnClaimError::ParseFailed)?;
    let btc_txid = btc_tx.txid();

    if is_btc_txid_blocked(&btc_txid, book, source) {
        return Err(BurnClaimError::Duplicate);
    }

    if source.get_header_by_hash(&payload.btc_block_hash).is_none() {
        return Err(BurnClaimError::UnknownBlock);
    }
    // The stable `burn-claim-spv-range` code: blocks below the checkpoint
    // horizon cannot be claimed even if headers are known.
    if payload.btc_block_height < source.min_supported_height() {
        return Err(BurnClaimError::SpvRange);
    }
    if !source.is_in_best_chain(&payload.btc_block_hash) {
        return Err(BurnClaimError::BlockNotBest);
    }
    if source.get_hash_at_height(payload.btc_block_height) != Some(payload.btc_block_hash) {
        return Err(BurnClaimError::HeightMismatch);
    }

    if !source.verify_merkle_proof(
        &payload.btc_block_hash,
        &btc_txid,
        &payload.merkle_proof,
        payload.tx_index,
    ) {
        return Err(BurnClaimError::MerkleInvalid);
    }

    let (mark, burned_sats) =
        extract_burn(&btc_tx).ok_or(BurnClaimError::FormatInvalid)?;

    if !network.accepts_burn_network_byte(mark.network_byte) {
        return Err(BurnClaimError::NetworkMismatch);
    }

    Ok(ParsedBurn {
        btc_txid,
        btc_block_hash: payload.btc_block_hash,
        btc_height: payload.btc_block_height,
        burned_sats,
        mark,
    })
}
