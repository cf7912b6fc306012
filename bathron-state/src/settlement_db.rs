//! The settlement database.
//!
//! Key layout (raw byte concatenations, no length framing):
//!
//! ```text
//! 'V' || outpoint (36)  -> VaultEntry
//! 'R' || outpoint (36)  -> M1Receipt
//! 'S'                   -> SettlementState
//! ```
//!
//! plus a sibling undo tree:
//!
//! ```text
//! 'U' || block_hash (32) -> BlockUndo
//! ```

use bathron_chain::{
    block,
    serialization::{BathronDeserialize, BathronSerialize},
    settlement::{M1Receipt, SettlementState, VaultEntry},
    transparent::OutPoint,
};
use bathron_consensus::{
    block::BlockUndo,
    settlement::{SettlementBook, SettlementIndex, SettlementUndo},
};

use crate::{Config, StateError};

const VAULT_PREFIX: u8 = b'V';
const RECEIPT_PREFIX: u8 = b'R';
const STATE_KEY: &[u8] = b"S";
const UNDO_PREFIX: u8 = b'U';

/// The sled-backed mirror of the settlement book.
pub struct SettlementDb {
    entries: sled::Tree,
    undo: sled::Tree,
}

fn vault_key(outpoint: &OutPoint) -> Vec<u8> {
    prefixed_outpoint(VAULT_PREFIX, outpoint)
}

fn receipt_key(outpoint: &OutPoint) -> Vec<u8> {
    prefixed_outpoint(RECEIPT_PREFIX, outpoint)
}

// Raw concatenation on purpose: these keys must never grow a length prefix.
fn prefixed_outpoint(prefix: u8, outpoint: &OutPoint) -> Vec<u8> {
    let mut key = Vec::with_capacity(37);
    key.push(prefix);
    key.extend_from_slice(&outpoint.to_key_bytes());
    key
}

fn undo_key(block_hash: &block::Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(UNDO_PREFIX);
    key.extend_from_slice(&block_hash.0);
    key
}

impl SettlementDb {
    pub fn open(config: &Config) -> Result<SettlementDb, StateError> {
        let db = config.open()?;
        Ok(SettlementDb {
            entries: db.open_tree(b"settlement")?,
            undo: db.open_tree(b"settlement_undo")?,
        })
    }

    /// Share an already-open database (the burn DB lives alongside).
    pub(crate) fn open_in(db: &sled::Db) -> Result<SettlementDb, StateError> {
        Ok(SettlementDb {
            entries: db.open_tree(b"settlement")?,
            undo: db.open_tree(b"settlement_undo")?,
        })
    }

    /// Persist one connected block: every index mutation the undo record
    /// names, the new supply state, and the journal entry: one atomic
    /// batch per tree.
    pub fn commit_block(
        &self,
        book: &SettlementBook,
        undo: &BlockUndo,
    ) -> Result<(), StateError> {
        let mut batch = sled::Batch::default();

        for entry_undo in &undo.settlement {
            match entry_undo {
                SettlementUndo::Lock {
                    vault_outpoint,
                    receipt_outpoint,
                    ..
                } => {
                    let vault = book.vault(vault_outpoint).ok_or_else(|| {
                        StateError::Inconsistent("committed lock vault missing from book".into())
                    })?;
                    let receipt = book.receipt(receipt_outpoint).ok_or_else(|| {
                        StateError::Inconsistent("committed lock receipt missing from book".into())
                    })?;
                    batch.insert(vault_key(vault_outpoint), serialize(&vault)?);
                    batch.insert(receipt_key(receipt_outpoint), serialize(&receipt)?);
                }
                SettlementUndo::Unlock {
                    erased_vaults,
                    erased_receipts,
                    created_receipt,
                    created_vault,
                    ..
                } => {
                    for vault in erased_vaults {
                        batch.remove(vault_key(&vault.outpoint));
                    }
                    for receipt in erased_receipts {
                        batch.remove(receipt_key(&receipt.outpoint));
                    }
                    if let Some(outpoint) = created_receipt {
                        let receipt = book.receipt(outpoint).ok_or_else(|| {
                            StateError::Inconsistent("change receipt missing from book".into())
                        })?;
                        batch.insert(receipt_key(outpoint), serialize(&receipt)?);
                    }
                    if let Some(outpoint) = created_vault {
                        let vault = book.vault(outpoint).ok_or_else(|| {
                            StateError::Inconsistent("change vault missing from book".into())
                        })?;
                        batch.insert(vault_key(outpoint), serialize(&vault)?);
                    }
                }
                SettlementUndo::Transfer {
                    erased_receipt,
                    created_receipts,
                } => {
                    batch.remove(receipt_key(&erased_receipt.outpoint));
                    for outpoint in created_receipts {
                        let receipt = book.receipt(outpoint).ok_or_else(|| {
                            StateError::Inconsistent("transfer receipt missing from book".into())
                        })?;
                        batch.insert(receipt_key(outpoint), serialize(&receipt)?);
                    }
                }
            }
        }

        batch.insert(STATE_KEY, serialize(book.state())?);
        self.entries.apply_batch(batch)?;

        self.undo
            .insert(undo_key(&undo.block_hash), serialize(undo)?)?;

        metrics::counter!("state.settlement.committed.block.count", 1);
        tracing::trace!(height = undo.height.0, "settlement state committed");
        Ok(())
    }

    /// Persist one disconnected block: reverse every index mutation and
    /// drop the journal entry.
    pub fn rollback_block(
        &self,
        book: &SettlementBook,
        undo: &BlockUndo,
    ) -> Result<(), StateError> {
        let mut batch = sled::Batch::default();

        for entry_undo in undo.settlement.iter().rev() {
            match entry_undo {
                SettlementUndo::Lock {
                    vault_outpoint,
                    receipt_outpoint,
                    ..
                } => {
                    batch.remove(vault_key(vault_outpoint));
                    batch.remove(receipt_key(receipt_outpoint));
                }
                SettlementUndo::Unlock {
                    erased_vaults,
                    erased_receipts,
                    created_receipt,
                    created_vault,
                    ..
                } => {
                    if let Some(outpoint) = created_receipt {
                        batch.remove(receipt_key(outpoint));
                    }
                    if let Some(outpoint) = created_vault {
                        batch.remove(vault_key(outpoint));
                    }
                    for vault in erased_vaults {
                        batch.insert(vault_key(&vault.outpoint), serialize(vault)?);
                    }
                    for receipt in erased_receipts {
                        batch.insert(receipt_key(&receipt.outpoint), serialize(receipt)?);
                    }
                }
                SettlementUndo::Transfer {
                    erased_receipt,
                    created_receipts,
                } => {
                    for outpoint in created_receipts {
                        batch.remove(receipt_key(outpoint));
                    }
                    batch.insert(
                        receipt_key(&erased_receipt.outpoint),
                        serialize(erased_receipt)?,
                    );
                }
            }
        }

        batch.insert(STATE_KEY, serialize(book.state())?);
        self.entries.apply_batch(batch)?;
        self.undo.remove(undo_key(&undo.block_hash))?;
        Ok(())
    }

    /// The journal entry for `block_hash`, if that block is connected.
    pub fn undo_for(&self, block_hash: &block::Hash) -> Result<Option<BlockUndo>, StateError> {
        match self.undo.get(undo_key(block_hash))? {
            Some(bytes) => Ok(Some(deserialize::<BlockUndo>(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Rebuild the in-memory book from disk, verifying that the persisted
    /// state equals the recomputed entry sums.
    pub fn load(&self) -> Result<SettlementBook, StateError> {
        let mut vaults: Vec<VaultEntry> = Vec::new();
        let mut receipts: Vec<M1Receipt> = Vec::new();
        let mut state: Option<SettlementState> = None;

        for item in self.entries.iter() {
            let (key, value) = item?;
            match key.first() {
                Some(&VAULT_PREFIX) => vaults.push(deserialize(&value)?),
                Some(&RECEIPT_PREFIX) => receipts.push(deserialize(&value)?),
                Some(&b'S') if key.len() == 1 => state = Some(deserialize(&value)?),
                _ => {
                    return Err(StateError::Corrupt(format!(
                        "unknown settlement key prefix: {}",
                        hex::encode(&key)
                    )))
                }
            }
        }

        let state = state.unwrap_or_else(SettlementState::empty);

        let vault_sum: i64 = vaults.iter().map(|vault| vault.amount.value()).sum();
        let receipt_sum: i64 = receipts.iter().map(|receipt| receipt.amount.value()).sum();
        if vault_sum != state.m0_vaulted.value() || receipt_sum != state.m1_supply.value() {
            return Err(StateError::Inconsistent(format!(
                "vault sum {} / receipt sum {} vs persisted state {} / {}",
                vault_sum,
                receipt_sum,
                state.m0_vaulted.value(),
                state.m1_supply.value()
            )));
        }

        Ok(SettlementBook::from_parts(vaults, receipts, state))
    }
}

pub(crate) fn serialize<T: BathronSerialize>(value: &T) -> Result<Vec<u8>, StateError> {
    value
        .bathron_serialize_to_vec()
        .map_err(|e| StateError::Corrupt(format!("serialize: {}", e)))
}

pub(crate) fn deserialize<T: BathronDeserialize>(bytes: &[u8]) -> Result<T, StateError> {
    T::bathron_deserialize(bytes).map_err(|e| StateError::Corrupt(format!("deserialize: {}", e)))
}
