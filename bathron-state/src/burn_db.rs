//! The burn claim database (namespace `C`).
//!
//! Key layout (raw byte concatenations, no length framing):
//!
//! ```text
//! "Cc" || btc_txid (32)                                   -> BurnClaimRecord
//! "Cs" || status (1) || claim_height_be_u32 (4) || txid   -> ()
//! "Cd" || bathron_dest (20) || btc_txid (32)              -> ()
//! "Cm"                                                    -> u64 LE supply
//! "Cb"                                                    -> best block hash
//! ```
//!
//! The status index uses a big-endian height so an ordered scan yields
//! claims oldest-first within a status.

use bathron_chain::{
    block,
    btc,
    burn::{BurnClaimRecord, ClaimStatus},
    transparent::Hash160,
};
use bathron_consensus::{block::BlockUndo, burn::BurnBook};

use crate::settlement_db::{deserialize, serialize};
use crate::{Config, StateError};

const RECORD_PREFIX: &[u8; 2] = b"Cc";
const STATUS_PREFIX: &[u8; 2] = b"Cs";
const DEST_PREFIX: &[u8; 2] = b"Cd";
const SUPPLY_KEY: &[u8] = b"Cm";
const BEST_BLOCK_KEY: &[u8] = b"Cb";

/// The sled-backed mirror of the burn book.
pub struct BurnClaimDb {
    tree: sled::Tree,
}

fn record_key(txid: &btc::Txid) -> Vec<u8> {
    let mut key = Vec::with_capacity(34);
    key.extend_from_slice(RECORD_PREFIX);
    key.extend_from_slice(&txid.0);
    key
}

fn status_key(status: ClaimStatus, claim_height: u32, txid: &btc::Txid) -> Vec<u8> {
    let mut key = Vec::with_capacity(39);
    key.extend_from_slice(STATUS_PREFIX);
    key.push(status.as_byte());
    key.extend_from_slice(&claim_height.to_be_bytes());
    key.extend_from_slice(&txid.0);
    key
}

fn dest_key(dest: &Hash160, txid: &btc::Txid) -> Vec<u8> {
    let mut key = Vec::with_capacity(54);
    key.extend_from_slice(DEST_PREFIX);
    key.extend_from_slice(&dest.0);
    key.extend_from_slice(&txid.0);
    key
}

fn record_index_keys(record: &BurnClaimRecord) -> (Vec<u8>, Vec<u8>) {
    (
        status_key(record.status, record.claim_height.0, &record.btc_txid),
        dest_key(&record.bathron_dest, &record.btc_txid),
    )
}

impl BurnClaimDb {
    pub fn open(config: &Config) -> Result<BurnClaimDb, StateError> {
        let db = config.open()?;
        Ok(BurnClaimDb {
            tree: db.open_tree(b"burn_claims")?,
        })
    }

    /// Persist the burn-side effects of one connected block.
    pub fn commit_block(&self, book: &BurnBook, undo: &BlockUndo) -> Result<(), StateError> {
        let mut batch = sled::Batch::default();

        for claim_undo in &undo.claims {
            let record = book.get(&claim_undo.btc_txid).ok_or_else(|| {
                StateError::Inconsistent("committed claim missing from book".into())
            })?;
            if let Some(previous) = &claim_undo.previous {
                let (old_status, old_dest) = record_index_keys(previous);
                batch.remove(old_status);
                batch.remove(old_dest);
            }
            let (status, dest) = record_index_keys(&record);
            batch.insert(record_key(&record.btc_txid), serialize(&record)?);
            batch.insert(status, Vec::<u8>::new());
            batch.insert(dest, Vec::<u8>::new());
        }

        if let Some(mint_undo) = &undo.mint {
            for txid in &mint_undo.btc_txids {
                let record = book.get(txid).ok_or_else(|| {
                    StateError::Inconsistent("finalized claim missing from book".into())
                })?;
                // The record just moved PENDING -> FINAL at the same claim
                // height; swap its status-index entry.
                batch.remove(status_key(
                    ClaimStatus::Pending,
                    record.claim_height.0,
                    txid,
                ));
                batch.insert(
                    status_key(ClaimStatus::Final, record.claim_height.0, txid),
                    Vec::<u8>::new(),
                );
                batch.insert(record_key(txid), serialize(&record)?);
            }
        }

        batch.insert(SUPPLY_KEY, &book.m0btc_supply().to_le_bytes()[..]);
        batch.insert(BEST_BLOCK_KEY, &undo.block_hash.0[..]);
        self.tree.apply_batch(batch)?;

        metrics::gauge!("state.burn.m0btc.supply", book.m0btc_supply() as _);
        Ok(())
    }

    /// Persist the burn-side effects of one disconnected block. The book
    /// must already be rolled back; `previous_best` restores `Cb`.
    pub fn rollback_block(
        &self,
        book: &BurnBook,
        undo: &BlockUndo,
        previous_best: Option<block::Hash>,
    ) -> Result<(), StateError> {
        let mut batch = sled::Batch::default();

        if let Some(mint_undo) = &undo.mint {
            for txid in &mint_undo.btc_txids {
                let record = book.get(txid).ok_or_else(|| {
                    StateError::Inconsistent("definalized claim missing from book".into())
                })?;
                batch.remove(status_key(
                    ClaimStatus::Final,
                    record.claim_height.0,
                    txid,
                ));
                batch.insert(
                    status_key(ClaimStatus::Pending, record.claim_height.0, txid),
                    Vec::<u8>::new(),
                );
                batch.insert(record_key(txid), serialize(&record)?);
            }
        }

        for claim_undo in undo.claims.iter().rev() {
            // The record this claim wrote (now gone from the book).
            let written = self.get(&claim_undo.btc_txid)?.ok_or_else(|| {
                StateError::Inconsistent("rollback claim missing from the DB".into())
            })?;
            let (status, dest) = record_index_keys(&written);
            batch.remove(status);
            batch.remove(dest);

            match &claim_undo.previous {
                Some(previous) => {
                    let (status, dest) = record_index_keys(previous);
                    batch.insert(record_key(&previous.btc_txid), serialize(previous)?);
                    batch.insert(status, Vec::<u8>::new());
                    batch.insert(dest, Vec::<u8>::new());
                }
                None => {
                    batch.remove(record_key(&claim_undo.btc_txid));
                }
            }
        }

        batch.insert(SUPPLY_KEY, &book.m0btc_supply().to_le_bytes()[..]);
        match previous_best {
            Some(hash) => batch.insert(BEST_BLOCK_KEY, &hash.0[..]),
            None => batch.remove(BEST_BLOCK_KEY),
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    /// One record by txid.
    pub fn get(&self, txid: &btc::Txid) -> Result<Option<BurnClaimRecord>, StateError> {
        match self.tree.get(record_key(txid))? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The best block hash the burn DB was last committed at.
    pub fn best_block(&self) -> Result<Option<block::Hash>, StateError> {
        match self.tree.get(BEST_BLOCK_KEY)? {
            Some(bytes) if bytes.len() == 32 => {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&bytes);
                Ok(Some(block::Hash(hash)))
            }
            Some(_) => Err(StateError::Corrupt("best block hash is not 32 bytes".into())),
            None => Ok(None),
        }
    }

    /// Rebuild the in-memory book, verifying the supply counter against
    /// the recomputed FINAL sum.
    pub fn load(&self) -> Result<BurnBook, StateError> {
        let mut records = Vec::new();
        for item in self.tree.scan_prefix(RECORD_PREFIX) {
            let (_, value) = item?;
            records.push(deserialize::<BurnClaimRecord>(&value)?);
        }

        let stored_supply = match self.tree.get(SUPPLY_KEY)? {
            Some(bytes) if bytes.len() == 8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes);
                u64::from_le_bytes(raw)
            }
            Some(_) => return Err(StateError::Corrupt("supply counter is not 8 bytes".into())),
            None => 0,
        };

        let recomputed: u64 = records
            .iter()
            .filter(|record| record.status == ClaimStatus::Final)
            .map(|record| record.burned_sats)
            .sum();
        if recomputed != stored_supply {
            return Err(StateError::Inconsistent(format!(
                "FINAL burn sum {} vs stored supply {}",
                recomputed, stored_supply
            )));
        }

        Ok(BurnBook::from_parts(records, stored_supply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bathron_chain::block::Height;
    use bathron_consensus::burn::ClaimUndo;
    use bathron_consensus::mint::MintUndo;

    fn record(n: u8, status: ClaimStatus, sats: u64) -> BurnClaimRecord {
        BurnClaimRecord {
            btc_txid: btc::Txid([n; 32]),
            btc_block_hash: btc::BlockHash([n; 32]),
            btc_height: 200_000,
            burned_sats: sats,
            bathron_dest: Hash160([n; 20]),
            claim_height: Height(100),
            final_height: if status == ClaimStatus::Final {
                Height(121)
            } else {
                Height(0)
            },
            status,
        }
    }

    fn undo_with_claim(n: u8) -> BlockUndo {
        BlockUndo {
            block_hash: block::Hash([n; 32]),
            height: Height(100),
            settlement: Vec::new(),
            claims: vec![ClaimUndo {
                btc_txid: btc::Txid([n; 32]),
                previous: None,
            }],
            mint: None,
        }
    }

    #[test]
    fn commit_load_roundtrip() {
        bathron_test::init();

        let db = BurnClaimDb::open(&Config::ephemeral()).unwrap();
        let book = BurnBook::from_parts(vec![record(1, ClaimStatus::Pending, 1_000_000)], 0);

        db.commit_block(&book, &undo_with_claim(1)).unwrap();

        let reloaded = db.load().unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.m0btc_supply(), 0);
        assert_eq!(
            reloaded.get(&btc::Txid([1; 32])),
            Some(record(1, ClaimStatus::Pending, 1_000_000))
        );
        assert_eq!(db.best_block().unwrap(), Some(block::Hash([1; 32])));
    }

    #[test]
    fn finalization_updates_supply_and_index() {
        bathron_test::init();

        let db = BurnClaimDb::open(&Config::ephemeral()).unwrap();
        let pending_book =
            BurnBook::from_parts(vec![record(1, ClaimStatus::Pending, 1_000_000)], 0);
        db.commit_block(&pending_book, &undo_with_claim(1)).unwrap();

        let final_book =
            BurnBook::from_parts(vec![record(1, ClaimStatus::Final, 1_000_000)], 1_000_000);
        let mint_undo = BlockUndo {
            block_hash: block::Hash([2; 32]),
            height: Height(121),
            settlement: Vec::new(),
            claims: Vec::new(),
            mint: Some(MintUndo {
                btc_txids: vec![btc::Txid([1; 32])],
            }),
        };
        db.commit_block(&final_book, &mint_undo).unwrap();

        let reloaded = db.load().unwrap();
        assert_eq!(reloaded.m0btc_supply(), 1_000_000);
        assert_eq!(
            reloaded.get(&btc::Txid([1; 32])).unwrap().status,
            ClaimStatus::Final
        );

        // The status index moved: no pending entry, one final entry.
        let pending_prefix: Vec<u8> = status_key(ClaimStatus::Pending, 100, &btc::Txid([1; 32]));
        assert!(db.tree.get(&pending_prefix).unwrap().is_none());
        let final_key = status_key(ClaimStatus::Final, 100, &btc::Txid([1; 32]));
        assert!(db.tree.get(&final_key).unwrap().is_some());

        // Roll the mint back.
        db.rollback_block(&pending_book, &mint_undo, Some(block::Hash([1; 32])))
            .unwrap();
        let reloaded = db.load().unwrap();
        assert_eq!(reloaded.m0btc_supply(), 0);
        assert_eq!(
            reloaded.get(&btc::Txid([1; 32])).unwrap().status,
            ClaimStatus::Pending
        );
        assert_eq!(db.best_block().unwrap(), Some(block::Hash([1; 32])));
    }

    #[test]
    fn rollback_of_fresh_claim_deletes_everything() {
        bathron_test::init();

        let db = BurnClaimDb::open(&Config::ephemeral()).unwrap();
        let book = BurnBook::from_parts(vec![record(1, ClaimStatus::Pending, 500_000)], 0);
        let undo = undo_with_claim(1);
        db.commit_block(&book, &undo).unwrap();

        let empty = BurnBook::new();
        db.rollback_block(&empty, &undo, None).unwrap();
        assert!(db.get(&btc::Txid([1; 32])).unwrap().is_none());
        assert!(db.best_block().unwrap().is_none());
        assert_eq!(db.load().unwrap().len(), 0);
    }

    #[test]
    fn supply_mismatch_is_fatal_on_load() {
        bathron_test::init();

        let db = BurnClaimDb::open(&Config::ephemeral()).unwrap();
        // A FINAL record but a zero supply counter: corrupted state.
        let book = BurnBook::from_parts(vec![record(1, ClaimStatus::Final, 900_000)], 0);
        db.commit_block(&book, &undo_with_claim(1)).unwrap();

        assert!(matches!(db.load(), Err(StateError::Inconsistent(_))));
    }

    #[test]
    fn index_keys_are_raw_concatenations() {
        let txid = btc::Txid([0xAB; 32]);
        let key = status_key(ClaimStatus::Pending, 0x0102_0304, &txid);
        assert_eq!(key.len(), 2 + 1 + 4 + 32);
        assert_eq!(&key[0..2], b"Cs");
        assert_eq!(key[2], 0);
        // Big-endian height for ordered scans.
        assert_eq!(&key[3..7], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&key[7..], &[0xAB; 32]);

        let dest = dest_key(&Hash160([0xCD; 20]), &txid);
        assert_eq!(dest.len(), 2 + 20 + 32);
        assert_eq!(&dest[0..2], b"Cd");
    }
}
