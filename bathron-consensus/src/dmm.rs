//! The Deterministic Masternode Miner: slot timing and producer election.
//!
//! Election is stateless and reentrant. Given `(prev_block_hash, height)`,
//! every node ranks the active masternodes by the same hash-derived score;
//! the wall clock only decides whether the *local* node should attempt to
//! produce: remote blocks are judged by their structural claim to a slot,
//! never by the receiver's clock.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use primitive_types::U256;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, Signature};

use bathron_chain::{
    block::{self, Block, Height},
    masternode::{MasternodeEntry, ProTxHash},
    parameters::{NetworkParameters, MAX_FUTURE_BLOCK_TIME_SECS},
    serialization::sha256d,
};

use crate::error::BlockError;

static SECP: Lazy<Secp256k1<secp256k1::All>> = Lazy::new(Secp256k1::new);

/// The producer slot implied by a candidate block time.
///
/// Slot 0 belongs to the elected leader for the whole `leader_timeout`
/// window; after that, one fallback slot opens every `fallback_recovery`
/// seconds.
pub fn producer_slot(
    prev_block_time: DateTime<Utc>,
    block_time: DateTime<Utc>,
    params: &NetworkParameters,
) -> u64 {
    let elapsed = block_time.timestamp() - prev_block_time.timestamp();
    if elapsed < params.leader_timeout_secs {
        0
    } else {
        1 + ((elapsed - params.leader_timeout_secs) / params.fallback_recovery_secs) as u64
    }
}

/// The election score of one masternode for one block slot:
/// `sha256d(prev_block_hash || height_le_u32 || pro_tx_hash)` as a 256-bit
/// integer. Lowest score leads.
pub fn score(prev_block_hash: &block::Hash, height: Height, pro_tx_hash: &ProTxHash) -> U256 {
    let mut preimage = Vec::with_capacity(32 + 4 + 32);
    preimage.extend_from_slice(&prev_block_hash.0);
    preimage.extend_from_slice(&height.0.to_le_bytes());
    preimage.extend_from_slice(&pro_tx_hash.0);
    U256::from_big_endian(&sha256d::digest(&preimage))
}

/// The active set ranked by ascending score (ties broken by identity, which
/// keeps the order total even against adversarial registrations).
pub fn rank_masternodes(
    active: &[MasternodeEntry],
    prev_block_hash: &block::Hash,
    height: Height,
) -> Vec<MasternodeEntry> {
    let mut ranked: Vec<MasternodeEntry> = active.to_vec();
    ranked.sort_by_key(|entry| (score(prev_block_hash, height, &entry.pro_tx_hash), entry.pro_tx_hash));
    ranked
}

/// The masternode entitled to `slot`, wrapping modulo the active set.
pub fn expected_producer(
    slot: u64,
    active: &[MasternodeEntry],
    prev_block_hash: &block::Hash,
    height: Height,
) -> Option<MasternodeEntry> {
    if active.is_empty() {
        return None;
    }
    let ranked = rank_masternodes(active, prev_block_hash, height);
    Some(ranked[(slot % ranked.len() as u64) as usize])
}

/// May the local masternode produce at `slot`?
///
/// The expected producer always may; once the leader window has passed
/// (`slot >= 1`) any active masternode may step in; during bootstrap the
/// election is skipped entirely.
pub fn may_produce(
    local: &ProTxHash,
    slot: u64,
    active: &[MasternodeEntry],
    prev_block_hash: &block::Hash,
    height: Height,
    params: &NetworkParameters,
) -> bool {
    let is_active = active.iter().any(|entry| entry.pro_tx_hash == *local);
    if !is_active {
        return false;
    }
    if height <= params.dmm_bootstrap_height {
        return true;
    }
    if slot >= 1 {
        return true;
    }
    expected_producer(slot, active, prev_block_hash, height)
        .map(|entry| entry.pro_tx_hash == *local)
        .unwrap_or(false)
}

/// Structural block-time checks: slot rounding, median-time-past, and the
/// future bound.
///
/// The future bound is the only wall-clock rule in consensus, and it is
/// one-sided: a block rejected now may be accepted later.
pub fn check_block_time(
    block_time: DateTime<Utc>,
    median_time_past: DateTime<Utc>,
    now: DateTime<Utc>,
    params: &NetworkParameters,
) -> Result<(), BlockError> {
    if block_time.timestamp() % params.block_time_slot_secs != 0 {
        return Err(BlockError::TimeNotSlotAligned);
    }
    if block_time.timestamp() <= median_time_past.timestamp() {
        return Err(BlockError::TimeTooEarly);
    }
    if block_time.timestamp() > now.timestamp() + MAX_FUTURE_BLOCK_TIME_SECS {
        return Err(BlockError::TimeTooFar);
    }
    Ok(())
}

/// Validate a remote block's structural claim to its producer slot.
pub fn check_producer_slot(
    block: &Block,
    height: Height,
    prev_block_time: DateTime<Utc>,
    active: &[MasternodeEntry],
    params: &NetworkParameters,
) -> Result<(), BlockError> {
    let producer = active
        .iter()
        .find(|entry| entry.pro_tx_hash == block.producer)
        .ok_or(BlockError::WrongProducer)?;

    // Bootstrap phase: any active masternode, no slot math.
    if height <= params.dmm_bootstrap_height {
        return Ok(());
    }

    let slot = producer_slot(prev_block_time, block.header.time, params);
    if slot == 0 {
        let expected =
            expected_producer(0, active, &block.header.previous_block_hash, height)
                .ok_or(BlockError::WrongProducer)?;
        if expected.pro_tx_hash != producer.pro_tx_hash {
            return Err(BlockError::WrongProducer);
        }
    }
    Ok(())
}

/// Sign a final block hash with the producer's operator key (DER bytes).
pub fn sign_block_hash(secret_key: &SecretKey, hash: &block::Hash) -> Vec<u8> {
    let message = Message::from_slice(&hash.0).expect("block hashes are 32 bytes");
    SECP.sign(&message, secret_key).serialize_der().to_vec()
}

/// Verify the producer signature carried by a block.
pub fn verify_block_signature(
    block: &Block,
    operator_key: &PublicKey,
) -> Result<(), BlockError> {
    let message =
        Message::from_slice(&block.hash().0).expect("block hashes are 32 bytes");
    let signature =
        Signature::from_der(&block.signature).map_err(|_| BlockError::BadProducerSignature)?;
    SECP.verify(&message, &signature, operator_key)
        .map_err(|_| BlockError::BadProducerSignature)
}
