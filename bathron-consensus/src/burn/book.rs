//! The burn claim book: claim records and the M0BTC supply counter.
//!
//! Records move PENDING->FINAL on mint connection and back on disconnection;
//! claim connection may overwrite a released PENDING record (BTC reorg
//! case), so its undo carries the previous record.

use std::collections::BTreeMap;

use bathron_chain::{
    block::Height,
    btc,
    burn::{BurnClaimRecord, ClaimStatus},
    serialization::{BathronDeserialize, BathronSerialize, SerializationError},
};

use crate::error::BlockError;

use super::check::ParsedBurn;

/// The in-memory claim store.
///
/// Keyed by BTC txid; the `BTreeMap` keeps iteration deterministic, which
/// the mint builder's sorted enumeration relies on.
#[derive(Clone, Debug, Default)]
pub struct BurnBook {
    claims: BTreeMap<btc::Txid, BurnClaimRecord>,
    m0btc_supply: u64,
}

/// Undo for one connected claim: the record it displaced, if any.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClaimUndo {
    pub btc_txid: btc::Txid,
    pub previous: Option<BurnClaimRecord>,
}

impl BurnBook {
    pub fn new() -> BurnBook {
        BurnBook::default()
    }

    /// Rebuild from persisted parts.
    pub fn from_parts(
        records: impl IntoIterator<Item = BurnClaimRecord>,
        m0btc_supply: u64,
    ) -> BurnBook {
        BurnBook {
            claims: records.into_iter().map(|r| (r.btc_txid, r)).collect(),
            m0btc_supply,
        }
    }

    pub fn get(&self, txid: &btc::Txid) -> Option<BurnClaimRecord> {
        self.claims.get(txid).copied()
    }

    /// The sum of burned amounts currently at FINAL status.
    pub fn m0btc_supply(&self) -> u64 {
        self.m0btc_supply
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BurnClaimRecord> {
        self.claims.values()
    }

    /// All PENDING records, in txid order.
    pub fn pending(&self) -> impl Iterator<Item = &BurnClaimRecord> {
        self.claims
            .values()
            .filter(|record| record.status == ClaimStatus::Pending)
    }

    /// Write (or overwrite) the PENDING record for a validated claim.
    pub fn connect_claim(&mut self, burn: &ParsedBurn, claim_height: Height) -> ClaimUndo {
        let record = BurnClaimRecord {
            btc_txid: burn.btc_txid,
            btc_block_hash: burn.btc_block_hash,
            btc_height: burn.btc_height,
            burned_sats: burn.burned_sats,
            bathron_dest: burn.mark.dest,
            claim_height,
            final_height: Height(0),
            status: ClaimStatus::Pending,
        };
        let previous = self.claims.insert(burn.btc_txid, record);
        tracing::debug!(txid = %burn.btc_txid, height = claim_height.0, "burn claim recorded");
        ClaimUndo {
            btc_txid: burn.btc_txid,
            previous,
        }
    }

    /// Reverse a connected claim: restore the displaced record or delete.
    pub fn disconnect_claim(&mut self, undo: &ClaimUndo) -> Result<(), BlockError> {
        match undo.previous {
            Some(previous) => {
                self.claims.insert(undo.btc_txid, previous);
            }
            None => {
                if self.claims.remove(&undo.btc_txid).is_none() {
                    return Err(BlockError::Fatal(
                        "undo claim: record missing from the book".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Move a claim to FINAL at `final_height` and credit the supply.
    pub fn finalize(&mut self, txid: &btc::Txid, final_height: Height) -> Result<u64, BlockError> {
        let record = self
            .claims
            .get_mut(txid)
            .ok_or_else(|| BlockError::Fatal("finalize: claim record missing".into()))?;
        if record.status != ClaimStatus::Pending {
            return Err(BlockError::Fatal("finalize: claim is not PENDING".into()));
        }
        record.status = ClaimStatus::Final;
        record.final_height = final_height;
        let burned = record.burned_sats;

        self.m0btc_supply = self
            .m0btc_supply
            .checked_add(burned)
            .ok_or_else(|| BlockError::Fatal("M0BTC supply overflow".into()))?;
        metrics::gauge!("burn.m0btc.supply", self.m0btc_supply as _);
        Ok(burned)
    }

    /// Move a claim back to PENDING and debit the supply; underflow is a
    /// fatal consistency error.
    pub fn definalize(&mut self, txid: &btc::Txid) -> Result<u64, BlockError> {
        let record = self
            .claims
            .get_mut(txid)
            .ok_or_else(|| BlockError::Fatal("definalize: claim record missing".into()))?;
        if record.status != ClaimStatus::Final {
            return Err(BlockError::Fatal("definalize: claim is not FINAL".into()));
        }
        record.status = ClaimStatus::Pending;
        record.final_height = Height(0);
        let burned = record.burned_sats;

        self.m0btc_supply = self
            .m0btc_supply
            .checked_sub(burned)
            .ok_or_else(|| BlockError::Fatal("M0BTC supply underflow".into()))?;
        metrics::gauge!("burn.m0btc.supply", self.m0btc_supply as _);
        Ok(burned)
    }

    #[cfg(test)]
    pub(crate) fn insert_for_test(&mut self, record: BurnClaimRecord) {
        self.claims.insert(record.btc_txid, record);
    }
}

impl BathronSerialize for ClaimUndo {
    fn bathron_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        self.btc_txid.bathron_serialize(&mut writer)?;
        (self.previous.is_some()).bathron_serialize(&mut writer)?;
        self.previous.bathron_serialize(&mut writer)
    }
}

impl BathronDeserialize for ClaimUndo {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let btc_txid = btc::Txid::bathron_deserialize(&mut reader)?;
        let previous = if bool::bathron_deserialize(&mut reader)? {
            Some(BurnClaimRecord::bathron_deserialize(&mut reader)?)
        } else {
            None
        };
        Ok(ClaimUndo { btc_txid, previous })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bathron_chain::{burn::BurnMark, transparent::Hash160};

    fn parsed(n: u8, sats: u64) -> ParsedBurn {
        ParsedBurn {
            btc_txid: btc::Txid([n; 32]),
            btc_block_hash: btc::BlockHash([n; 32]),
            btc_height: 200_000 + n as u32,
            burned_sats: sats,
            mark: BurnMark {
                version: 1,
                network_byte: 0x01,
                dest: Hash160([n; 20]),
            },
        }
    }

    #[test]
    fn claim_lifecycle_and_supply() {
        bathron_test::init();

        let mut book = BurnBook::new();
        let undo = book.connect_claim(&parsed(1, 1_000_000), Height(100));
        assert!(undo.previous.is_none());
        assert_eq!(book.get(&btc::Txid([1; 32])).unwrap().status, ClaimStatus::Pending);
        assert_eq!(book.m0btc_supply(), 0);

        let burned = book.finalize(&btc::Txid([1; 32]), Height(121)).unwrap();
        assert_eq!(burned, 1_000_000);
        assert_eq!(book.m0btc_supply(), 1_000_000);
        let record = book.get(&btc::Txid([1; 32])).unwrap();
        assert_eq!(record.status, ClaimStatus::Final);
        assert_eq!(record.final_height, Height(121));

        book.definalize(&btc::Txid([1; 32])).unwrap();
        assert_eq!(book.m0btc_supply(), 0);
        let record = book.get(&btc::Txid([1; 32])).unwrap();
        assert_eq!(record.status, ClaimStatus::Pending);
        assert_eq!(record.final_height, Height(0));

        book.disconnect_claim(&undo).unwrap();
        assert!(book.get(&btc::Txid([1; 32])).is_none());
    }

    #[test]
    fn overwrite_keeps_previous_record_in_undo() {
        bathron_test::init();

        let mut book = BurnBook::new();
        book.connect_claim(&parsed(1, 500_000), Height(90));
        let first = book.get(&btc::Txid([1; 32])).unwrap();

        // Re-claim after a BTC reorg: same txid, new block.
        let mut reclaim = parsed(1, 500_000);
        reclaim.btc_block_hash = btc::BlockHash([99; 32]);
        let undo = book.connect_claim(&reclaim, Height(110));
        assert_eq!(undo.previous, Some(first));
        assert_eq!(
            book.get(&btc::Txid([1; 32])).unwrap().btc_block_hash,
            btc::BlockHash([99; 32])
        );

        // Disconnect restores the displaced record.
        book.disconnect_claim(&undo).unwrap();
        assert_eq!(book.get(&btc::Txid([1; 32])), Some(first));
    }

    #[test]
    fn definalize_of_pending_is_fatal() {
        bathron_test::init();

        let mut book = BurnBook::new();
        book.connect_claim(&parsed(2, 700), Height(10));
        let err = book.definalize(&btc::Txid([2; 32])).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn pending_iterates_in_txid_order() {
        bathron_test::init();

        let mut book = BurnBook::new();
        for n in [3u8, 1, 2].iter() {
            book.connect_claim(&parsed(*n, 1_000), Height(5));
        }
        let order: Vec<_> = book.pending().map(|r| r.btc_txid).collect();
        assert_eq!(
            order,
            vec![btc::Txid([1; 32]), btc::Txid([2; 32]), btc::Txid([3; 32])]
        );
    }

    #[test]
    fn claim_undo_roundtrip() {
        bathron_test::init();

        let mut book = BurnBook::new();
        book.connect_claim(&parsed(1, 500), Height(90));
        let mut reclaim = parsed(1, 500);
        reclaim.btc_block_hash = btc::BlockHash([8; 32]);
        let undo = book.connect_claim(&reclaim, Height(95));

        let bytes = undo.bathron_serialize_to_vec().unwrap();
        assert_eq!(ClaimUndo::bathron_deserialize(&bytes[..]).unwrap(), undo);
    }
}
