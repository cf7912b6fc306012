//! Structural block checks.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use bathron_chain::{
    block::{Block, Height},
    masternode::MasternodeEntry,
    parameters::{NetworkParameters, MAX_BURN_CLAIMS_PER_BLOCK},
    transaction::{self, TxType},
};

use crate::dmm;
use crate::error::BlockError;

/// Returns `Ok(())` if there is exactly one coinbase transaction in
/// `block`, and that coinbase transaction is the first transaction in the
/// block.
pub fn coinbase_is_first(block: &Block) -> Result<(), BlockError> {
    let first = block
        .transactions
        .get(0)
        .ok_or(BlockError::NoTransactions)?;
    let mut rest = block.transactions.iter().skip(1);
    if !first.is_coinbase() {
        return Err(BlockError::CoinbasePosition);
    }
    if rest.any(|tx| tx.contains_coinbase_input()) {
        return Err(BlockError::CoinbaseInputFound);
    }

    Ok(())
}

/// Check Merkle root validity.
///
/// `transaction_hashes` is a precomputed list of transaction hashes.
pub fn merkle_root_validity(
    block: &Block,
    transaction_hashes: &[transaction::Hash],
) -> Result<(), BlockError> {
    let merkle_root = transaction_hashes.iter().cloned().collect();

    if block.header.merkle_root != merkle_root {
        return Err(BlockError::BadMerkleRoot);
    }

    // The transaction Merkle tree is malleable (CVE-2012-2459): blocks with
    // duplicated transactions can share a root with honest ones. Duplicates
    // imply a double-spend, so reject them outright as defense-in-depth.
    if transaction_hashes.len() != transaction_hashes.iter().collect::<HashSet<_>>().len() {
        return Err(BlockError::DuplicateTransaction);
    }

    Ok(())
}

/// Per-block ceilings on special transactions: at most 50 burn claims and
/// one mint.
pub fn special_tx_limits(block: &Block) -> Result<(), BlockError> {
    let mut claims = 0usize;
    let mut mints = 0usize;
    for tx in &block.transactions {
        match tx.tx_type {
            TxType::BurnClaim => claims += 1,
            TxType::MintM0Btc => mints += 1,
            _ => {}
        }
    }
    if claims > MAX_BURN_CLAIMS_PER_BLOCK {
        return Err(BlockError::TooManyBurnClaims);
    }
    if mints > 1 {
        return Err(BlockError::MultipleMints);
    }
    Ok(())
}

/// All context-free structure checks in one call.
pub fn block_structure(block: &Block) -> Result<(), BlockError> {
    coinbase_is_first(block)?;
    let hashes: Vec<transaction::Hash> =
        block.transactions.iter().map(|tx| tx.hash()).collect();
    merkle_root_validity(block, &hashes)?;
    special_tx_limits(block)?;
    Ok(())
}

/// The producer acceptance gate, run before connection: block time rules,
/// the structural slot claim, and the operator signature over the final
/// block hash.
///
/// The genesis block carries no producer and skips the gate entirely.
pub fn block_producer(
    block: &Block,
    height: Height,
    prev_block_time: DateTime<Utc>,
    median_time_past: DateTime<Utc>,
    now: DateTime<Utc>,
    active: &[MasternodeEntry],
    params: &NetworkParameters,
) -> Result<(), BlockError> {
    if height == Height(0) {
        return Ok(());
    }
    dmm::check_block_time(block.header.time, median_time_past, now, params)?;
    dmm::check_producer_slot(block, height, prev_block_time, active, params)?;
    let producer = active
        .iter()
        .find(|entry| entry.pro_tx_hash == block.producer)
        .ok_or(BlockError::WrongProducer)?;
    dmm::verify_block_signature(block, &producer.operator_key)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use bathron_chain::{
        block::{Header, Height},
        masternode::ProTxHash,
        transaction::{LockTime, Transaction},
        transparent::CoinbaseData,
        work::difficulty::CompactDifficulty,
    };
    use chrono::{TimeZone, Utc};

    fn coinbase(height: Height) -> Transaction {
        Transaction::new(
            1,
            TxType::Normal,
            vec![bathron_chain::transparent::Input::Coinbase {
                data: CoinbaseData::new(height, b""),
                sequence: 0,
            }],
            vec![],
            LockTime::unlocked(),
            Vec::new(),
        )
    }

    fn block_with(transactions: Vec<Transaction>) -> Block {
        let transactions: Vec<Arc<Transaction>> = transactions.into_iter().map(Arc::new).collect();
        let merkle_root = transactions.iter().map(|tx| tx.hash()).collect();
        Block {
            header: Header::new(
                1,
                bathron_chain::block::Hash([0; 32]),
                merkle_root,
                Utc.timestamp(1_600_000_005, 0),
                CompactDifficulty(0x207f_ffff),
                0,
            ),
            producer: ProTxHash([0; 32]),
            signature: Vec::new(),
            transactions,
        }
    }

    #[test]
    fn coinbase_must_lead() {
        bathron_test::init();

        let good = block_with(vec![coinbase(Height(5))]);
        assert!(coinbase_is_first(&good).is_ok());

        let empty = Block {
            transactions: Vec::new(),
            ..good.clone()
        };
        assert_eq!(coinbase_is_first(&empty), Err(BlockError::NoTransactions));

        let double = block_with(vec![coinbase(Height(5)), coinbase(Height(5))]);
        // The merkle check rejects the duplicate; coinbase_is_first rejects
        // the stray coinbase input first.
        assert_eq!(
            coinbase_is_first(&double),
            Err(BlockError::CoinbaseInputFound)
        );
    }

    #[test]
    fn merkle_mismatch_rejected() {
        bathron_test::init();

        let mut block = block_with(vec![coinbase(Height(5))]);
        block.header = Header::new(
            1,
            bathron_chain::block::Hash([0; 32]),
            bathron_chain::block::merkle::Root([0xFF; 32]),
            Utc.timestamp(1_600_000_005, 0),
            CompactDifficulty(0x207f_ffff),
            0,
        );
        let hashes: Vec<transaction::Hash> =
            block.transactions.iter().map(|tx| tx.hash()).collect();
        assert_eq!(
            merkle_root_validity(&block, &hashes),
            Err(BlockError::BadMerkleRoot)
        );
    }

    #[test]
    fn producer_gate_accepts_signed_bootstrap_block() {
        bathron_test::init();

        use crate::dmm::{self, tests::masternode};
        use crate::external::{DmnRegistry, StaticRegistry};
        use bathron_chain::parameters::{Network, NetworkParameters};

        let (secret, entry) = masternode(1);
        let registry = StaticRegistry(vec![entry]);
        let params = NetworkParameters::for_network(Network::Regtest);

        // Height 5 is inside the regtest bootstrap window: any active
        // masternode may produce, but the signature must still verify.
        let height = Height(5);
        let mut block = block_with(vec![coinbase(height)]);
        block.producer = entry.pro_tx_hash;
        block.signature = dmm::sign_block_hash(&secret, &block.hash());

        let active = registry.active_masternodes(height);
        let prev_time = Utc.timestamp(1_599_999_990, 0);
        let mtp = Utc.timestamp(1_599_999_975, 0);
        let now = Utc.timestamp(1_600_000_010, 0);

        assert!(block_producer(&block, height, prev_time, mtp, now, &active, &params).is_ok());

        // A stranger's signature fails the gate.
        let (other_secret, _) = masternode(2);
        block.signature = dmm::sign_block_hash(&other_secret, &block.hash());
        assert_eq!(
            block_producer(&block, height, prev_time, mtp, now, &active, &params),
            Err(BlockError::BadProducerSignature)
        );

        // An unregistered producer fails regardless of signature.
        block.producer = bathron_chain::masternode::ProTxHash([9; 32]);
        assert_eq!(
            block_producer(&block, height, prev_time, mtp, now, &active, &params),
            Err(BlockError::WrongProducer)
        );
    }

    #[test]
    fn mint_limit_is_one() {
        bathron_test::init();

        let mint = |n: u8| {
            Transaction::new(
                1,
                TxType::MintM0Btc,
                vec![],
                vec![],
                LockTime::unlocked(),
                vec![n],
            )
        };
        let block = block_with(vec![coinbase(Height(5)), mint(1), mint(2)]);
        assert_eq!(special_tx_limits(&block), Err(BlockError::MultipleMints));
    }
}
