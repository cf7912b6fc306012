//! Interfaces of the out-of-scope collaborators.
//!
//! The SPV header chain and the masternode registry are maintained
//! elsewhere; consensus names them here at exactly the surface it consumes.
//! Both must answer synchronously under the chain-state lock and from
//! consensus-replicated data only: never from wall clock or local-only
//! network state.

use std::collections::HashMap;

use bathron_chain::{block, btc, masternode::MasternodeEntry};

/// The consensus-replicated view of the Bitcoin header chain.
pub trait BtcHeaderSource {
    /// The header for `hash`, whether or not it is on the best chain.
    fn get_header_by_hash(&self, hash: &btc::BlockHash) -> Option<btc::Header>;

    /// The best-chain block hash at `height`.
    fn get_hash_at_height(&self, height: u32) -> Option<btc::BlockHash>;

    /// The best-chain tip height, if any headers are known.
    fn tip_height(&self) -> Option<u32>;

    /// The lowest BTC height burn claims may reference.
    fn min_supported_height(&self) -> u32;

    /// True iff `hash` is on the current best header chain.
    fn is_in_best_chain(&self, hash: &btc::BlockHash) -> bool;

    /// Verify a transaction-inclusion proof against the header for `hash`.
    fn verify_merkle_proof(
        &self,
        hash: &btc::BlockHash,
        txid: &btc::Txid,
        siblings: &[[u8; 32]],
        tx_index: u32,
    ) -> bool {
        match self.get_header_by_hash(hash) {
            Some(header) => btc::merkle::verify_proof(txid, siblings, tx_index, &header.merkle_root),
            None => false,
        }
    }

    /// Ingest a run of consecutive headers starting at `start_height`, as
    /// replayed from `TX_BTC_HEADERS`.
    ///
    /// Returns false when the run does not connect to the existing view.
    fn accept_headers(&mut self, start_height: u32, headers: &[btc::Header]) -> bool;

    /// Best-chain confirmations of the block at `height`: tip − height + 1,
    /// zero when unknown.
    fn confirmations(&self, height: u32) -> u32 {
        match self.tip_height() {
            Some(tip) if tip >= height => tip - height + 1,
            _ => 0,
        }
    }
}

/// The ordered active-masternode list, snapshotted by height.
pub trait DmnRegistry {
    /// The ordered active set as of `height`.
    fn active_masternodes(&self, height: block::Height) -> Vec<MasternodeEntry>;
}

/// An in-memory [`BtcHeaderSource`], used for the headers replayed from
/// block 1 and as the test double for every SPV-dependent check.
#[derive(Debug, Default)]
pub struct MemoryHeaderSource {
    by_hash: HashMap<btc::BlockHash, (btc::Header, u32)>,
    best_by_height: HashMap<u32, btc::BlockHash>,
    tip: Option<u32>,
    min_supported: u32,
}

impl MemoryHeaderSource {
    pub fn new(min_supported: u32) -> MemoryHeaderSource {
        MemoryHeaderSource {
            min_supported,
            ..MemoryHeaderSource::default()
        }
    }

    /// Install a header at `height` on the best chain, displacing whatever
    /// was there (a reorg, from the caller's point of view).
    pub fn insert_best(&mut self, height: u32, header: btc::Header) {
        let hash = header.hash();
        self.by_hash.insert(hash, (header, height));
        self.best_by_height.insert(height, hash);
        self.tip = Some(self.tip.map_or(height, |tip| tip.max(height)));
    }

    /// Drop heights above `height` from the best chain, simulating a BTC
    /// reorg. Headers stay known by hash (off-best-chain).
    pub fn truncate_best_chain(&mut self, height: u32) {
        self.best_by_height.retain(|&h, _| h <= height);
        self.tip = self.best_by_height.keys().copied().max();
    }

    /// Replace the best-chain entry at `height`, leaving the old header
    /// known but off-chain.
    pub fn replace_best(&mut self, height: u32, header: btc::Header) {
        let hash = header.hash();
        self.by_hash.insert(hash, (header, height));
        self.best_by_height.insert(height, hash);
    }
}

impl BtcHeaderSource for MemoryHeaderSource {
    fn get_header_by_hash(&self, hash: &btc::BlockHash) -> Option<btc::Header> {
        self.by_hash.get(hash).map(|(header, _)| *header)
    }

    fn get_hash_at_height(&self, height: u32) -> Option<btc::BlockHash> {
        self.best_by_height.get(&height).copied()
    }

    fn tip_height(&self) -> Option<u32> {
        self.tip
    }

    fn min_supported_height(&self) -> u32 {
        self.min_supported
    }

    fn is_in_best_chain(&self, hash: &btc::BlockHash) -> bool {
        match self.by_hash.get(hash) {
            Some((_, height)) => self.best_by_height.get(height) == Some(hash),
            None => false,
        }
    }

    fn accept_headers(&mut self, start_height: u32, headers: &[btc::Header]) -> bool {
        // The run must chain internally; linkage to the previous best entry
        // is checked when that entry exists.
        for (offset, header) in headers.iter().enumerate() {
            let height = start_height + offset as u32;
            if height > 0 {
                if let Some(prev_hash) = self.get_hash_at_height(height - 1) {
                    if header.previous_block_hash != prev_hash {
                        return false;
                    }
                }
            }
            self.insert_best(height, *header);
        }
        true
    }
}

/// A fixed registry snapshot, for tests and single-process tools.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry(pub Vec<MasternodeEntry>);

impl DmnRegistry for StaticRegistry {
    fn active_masternodes(&self, _height: block::Height) -> Vec<MasternodeEntry> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(prev: btc::BlockHash, nonce: u32) -> btc::Header {
        btc::Header {
            version: 2,
            previous_block_hash: prev,
            merkle_root: [0u8; 32],
            time: 0,
            bits: 0x207f_ffff,
            nonce,
        }
    }

    #[test]
    fn best_chain_tracking_and_reorg() {
        bathron_test::init();

        let mut source = MemoryHeaderSource::new(100);
        let h100 = header(btc::BlockHash([0; 32]), 0);
        let h101 = header(h100.hash(), 1);
        assert!(source.accept_headers(100, &[h100, h101]));

        assert_eq!(source.tip_height(), Some(101));
        assert!(source.is_in_best_chain(&h101.hash()));
        assert_eq!(source.confirmations(100), 2);

        // Reorg out 101; the header stays known but off-best-chain.
        source.truncate_best_chain(100);
        assert!(!source.is_in_best_chain(&h101.hash()));
        assert!(source.get_header_by_hash(&h101.hash()).is_some());
    }

    #[test]
    fn disconnected_run_rejected() {
        bathron_test::init();

        let mut source = MemoryHeaderSource::new(0);
        let h0 = header(btc::BlockHash([0; 32]), 0);
        assert!(source.accept_headers(0, &[h0]));

        // A header at height 1 that does not link to h0.
        let stranger = header(btc::BlockHash([9; 32]), 7);
        assert!(!source.accept_headers(1, &[stranger]));
    }
}
