//! The settlement book: vault/receipt indices plus the supply state.
//!
//! The book is mutated exclusively by block connection; every mutation
//! returns an undo record that reverses it exactly. `revert(apply(tx))`
//! restores the indices and the supply amounts byte-for-byte: reorg
//! safety depends on this being unconditional.

use std::collections::HashMap;
use std::convert::TryFrom;

use bathron_chain::{
    amount::{Amount, NonNegative},
    block::Height,
    serialization::{BathronDeserialize, BathronSerialize, SerializationError},
    settlement::{M1Receipt, SettlementState, VaultEntry},
    transaction::{Transaction, TxType},
    transparent::OutPoint,
};

use crate::error::{BlockError, TransactionError};

use super::view::{SettlementIndex, SettlementTxView};

/// The in-memory settlement indices and supply state.
///
/// Persistence mirrors this structure per block (see the state crate); the
/// book itself never touches disk.
#[derive(Clone, Debug, Default)]
pub struct SettlementBook {
    vaults: HashMap<OutPoint, VaultEntry>,
    receipts: HashMap<OutPoint, M1Receipt>,
    state: SettlementState,
}

/// The undo record for one applied settlement transaction.
///
/// Captures enough to reverse every mutation: created outpoints for a lock,
/// the full erased entries (plus created change outpoints) for an unlock,
/// and the erased receipt for a transfer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SettlementUndo {
    Lock {
        vault_outpoint: OutPoint,
        receipt_outpoint: OutPoint,
        amount: Amount<NonNegative>,
    },
    Unlock {
        erased_vaults: Vec<VaultEntry>,
        erased_receipts: Vec<M1Receipt>,
        created_receipt: Option<OutPoint>,
        created_vault: Option<OutPoint>,
        released: Amount<NonNegative>,
    },
    Transfer {
        erased_receipt: M1Receipt,
        created_receipts: Vec<OutPoint>,
    },
}

impl SettlementBook {
    pub fn new() -> SettlementBook {
        SettlementBook::default()
    }

    /// Rebuild a book from persisted parts.
    pub fn from_parts(
        vaults: impl IntoIterator<Item = VaultEntry>,
        receipts: impl IntoIterator<Item = M1Receipt>,
        state: SettlementState,
    ) -> SettlementBook {
        SettlementBook {
            vaults: vaults.into_iter().map(|v| (v.outpoint, v)).collect(),
            receipts: receipts.into_iter().map(|r| (r.outpoint, r)).collect(),
            state,
        }
    }

    pub fn state(&self) -> &SettlementState {
        &self.state
    }

    pub fn set_height(&mut self, height: Height) {
        self.state.height = height;
    }

    /// Credit newly minted M0 (burn finalization) to the total supply.
    pub fn add_minted_supply(&mut self, sats: u64) -> Result<(), BlockError> {
        let amount = Amount::try_from(sats as i64)
            .map_err(|e| BlockError::Fatal(format!("minted amount out of range: {}", e)))?;
        self.state.m0_total_supply = (self.state.m0_total_supply + amount)
            .map_err(|e| BlockError::Fatal(format!("total supply overflow: {}", e)))?;
        Ok(())
    }

    /// Remove minted M0 on mint disconnection.
    pub fn remove_minted_supply(&mut self, sats: u64) -> Result<(), BlockError> {
        let amount = Amount::try_from(sats as i64)
            .map_err(|e| BlockError::Fatal(format!("minted amount out of range: {}", e)))?;
        self.state.m0_total_supply = (self.state.m0_total_supply - amount)
            .map_err(|_| BlockError::Fatal("total supply underflow on disconnect".into()))?;
        Ok(())
    }

    pub fn vault_count(&self) -> usize {
        self.vaults.len()
    }

    pub fn receipt_count(&self) -> usize {
        self.receipts.len()
    }

    pub fn iter_vaults(&self) -> impl Iterator<Item = &VaultEntry> {
        self.vaults.values()
    }

    pub fn iter_receipts(&self) -> impl Iterator<Item = &M1Receipt> {
        self.receipts.values()
    }

    /// Apply a checked settlement transaction, returning its undo record.
    ///
    /// The caller must have run the matching validator first; apply assumes
    /// a well-formed view and treats index disagreements as fatal.
    pub fn apply(
        &mut self,
        tx: &Transaction,
        view: &SettlementTxView,
        height: Height,
    ) -> Result<SettlementUndo, BlockError> {
        match tx.tx_type {
            TxType::Lock => self.apply_lock(tx, height),
            TxType::Unlock => self.apply_unlock(tx, view, height),
            TxType::TransferM1 => self.apply_transfer(tx, view, height),
            _ => Err(BlockError::Transaction(TransactionError::LockWrongType)),
        }
    }

    fn apply_lock(
        &mut self,
        tx: &Transaction,
        height: Height,
    ) -> Result<SettlementUndo, BlockError> {
        let amount = tx.outputs[0].value;
        let vault_outpoint = tx.outpoint(0);
        let receipt_outpoint = tx.outpoint(1);

        self.vaults.insert(
            vault_outpoint,
            VaultEntry {
                outpoint: vault_outpoint,
                amount,
                lock_height: height,
            },
        );
        self.receipts.insert(
            receipt_outpoint,
            M1Receipt {
                outpoint: receipt_outpoint,
                amount,
                create_height: height,
            },
        );

        self.state.m0_vaulted = (self.state.m0_vaulted + amount)
            .map_err(|_| BlockError::Transaction(TransactionError::AmountOverflow))?;
        self.state.m1_supply = (self.state.m1_supply + amount)
            .map_err(|_| BlockError::Transaction(TransactionError::AmountOverflow))?;

        Ok(SettlementUndo::Lock {
            vault_outpoint,
            receipt_outpoint,
            amount,
        })
    }

    fn apply_unlock(
        &mut self,
        tx: &Transaction,
        view: &SettlementTxView,
        height: Height,
    ) -> Result<SettlementUndo, BlockError> {
        let mut erased_vaults = Vec::with_capacity(view.vault_input_indices.len());
        for &index in &view.vault_input_indices {
            let outpoint = tx.inputs[index]
                .outpoint()
                .ok_or_else(|| BlockError::Fatal("vault input without outpoint".into()))?;
            let entry = self
                .vaults
                .remove(&outpoint)
                .ok_or_else(|| BlockError::Fatal("unlock spends unindexed vault".into()))?;
            erased_vaults.push(entry);
        }

        let mut erased_receipts = Vec::with_capacity(view.m1_input_indices.len());
        for &index in &view.m1_input_indices {
            let outpoint = tx.inputs[index]
                .outpoint()
                .ok_or_else(|| BlockError::Fatal("receipt input without outpoint".into()))?;
            let entry = self
                .receipts
                .remove(&outpoint)
                .ok_or_else(|| BlockError::Fatal("unlock spends unindexed receipt".into()))?;
            erased_receipts.push(entry);
        }

        let mut created_receipt = None;
        if let Some(&index) = view.m1_output_indices.first() {
            let outpoint = tx.outpoint(index as u32);
            self.receipts.insert(
                outpoint,
                M1Receipt {
                    outpoint,
                    amount: tx.outputs[index].value,
                    create_height: height,
                },
            );
            created_receipt = Some(outpoint);
        }

        let mut created_vault = None;
        if let Some(&index) = view.vault_output_indices.first() {
            let outpoint = tx.outpoint(index as u32);
            self.vaults.insert(
                outpoint,
                VaultEntry {
                    outpoint,
                    amount: tx.outputs[index].value,
                    lock_height: height,
                },
            );
            created_vault = Some(outpoint);
        }

        let released = Amount::<NonNegative>::try_from(view.unlock_release(tx))
            .map_err(|_| BlockError::Transaction(TransactionError::AmountOverflow))?;
        self.state.m0_vaulted = (self.state.m0_vaulted - released)
            .map_err(|_| BlockError::Fatal("vaulted supply underflow".into()))?;
        self.state.m1_supply = (self.state.m1_supply - released)
            .map_err(|_| BlockError::Fatal("m1 supply underflow".into()))?;

        Ok(SettlementUndo::Unlock {
            erased_vaults,
            erased_receipts,
            created_receipt,
            created_vault,
            released,
        })
    }

    fn apply_transfer(
        &mut self,
        tx: &Transaction,
        view: &SettlementTxView,
        height: Height,
    ) -> Result<SettlementUndo, BlockError> {
        let outpoint = tx.inputs[view.m1_input_indices[0]]
            .outpoint()
            .ok_or_else(|| BlockError::Fatal("receipt input without outpoint".into()))?;
        let erased_receipt = self
            .receipts
            .remove(&outpoint)
            .ok_or_else(|| BlockError::Fatal("transfer spends unindexed receipt".into()))?;

        let mut created_receipts = Vec::with_capacity(view.m1_output_indices.len());
        for &index in &view.m1_output_indices {
            let outpoint = tx.outpoint(index as u32);
            self.receipts.insert(
                outpoint,
                M1Receipt {
                    outpoint,
                    amount: tx.outputs[index].value,
                    create_height: height,
                },
            );
            created_receipts.push(outpoint);
        }

        // Transfers move ownership only; the supply state is untouched.
        Ok(SettlementUndo::Transfer {
            erased_receipt,
            created_receipts,
        })
    }

    /// Reverse one applied transaction.
    ///
    /// Must be called in strict reverse application order; a missing target
    /// means the journal and the book disagree, which is unrecoverable.
    pub fn revert(&mut self, undo: &SettlementUndo) -> Result<(), BlockError> {
        match undo {
            SettlementUndo::Lock {
                vault_outpoint,
                receipt_outpoint,
                amount,
            } => {
                if self.vaults.remove(vault_outpoint).is_none() {
                    return Err(BlockError::Fatal("undo lock: vault missing".into()));
                }
                if self.receipts.remove(receipt_outpoint).is_none() {
                    return Err(BlockError::Fatal("undo lock: receipt missing".into()));
                }
                self.state.m0_vaulted = (self.state.m0_vaulted - *amount)
                    .map_err(|_| BlockError::Fatal("undo lock: vaulted underflow".into()))?;
                self.state.m1_supply = (self.state.m1_supply - *amount)
                    .map_err(|_| BlockError::Fatal("undo lock: m1 underflow".into()))?;
            }
            SettlementUndo::Unlock {
                erased_vaults,
                erased_receipts,
                created_receipt,
                created_vault,
                released,
            } => {
                if let Some(outpoint) = created_receipt {
                    if self.receipts.remove(outpoint).is_none() {
                        return Err(BlockError::Fatal("undo unlock: change receipt missing".into()));
                    }
                }
                if let Some(outpoint) = created_vault {
                    if self.vaults.remove(outpoint).is_none() {
                        return Err(BlockError::Fatal("undo unlock: change vault missing".into()));
                    }
                }
                for entry in erased_vaults {
                    self.vaults.insert(entry.outpoint, *entry);
                }
                for entry in erased_receipts {
                    self.receipts.insert(entry.outpoint, *entry);
                }
                self.state.m0_vaulted = (self.state.m0_vaulted + *released)
                    .map_err(|_| BlockError::Fatal("undo unlock: vaulted overflow".into()))?;
                self.state.m1_supply = (self.state.m1_supply + *released)
                    .map_err(|_| BlockError::Fatal("undo unlock: m1 overflow".into()))?;
            }
            SettlementUndo::Transfer {
                erased_receipt,
                created_receipts,
            } => {
                for outpoint in created_receipts {
                    if self.receipts.remove(outpoint).is_none() {
                        return Err(BlockError::Fatal("undo transfer: receipt missing".into()));
                    }
                }
                self.receipts
                    .insert(erased_receipt.outpoint, *erased_receipt);
            }
        }
        Ok(())
    }

    /// The A6 consensus check: vaulted M0 equals live M1, always.
    pub fn check_a6(&self) -> Result<(), BlockError> {
        if self.state.a6_holds() {
            Ok(())
        } else {
            Err(BlockError::A6Broken)
        }
    }
}

impl SettlementIndex for SettlementBook {
    fn vault(&self, outpoint: &OutPoint) -> Option<VaultEntry> {
        self.vaults.get(outpoint).copied()
    }

    fn receipt(&self, outpoint: &OutPoint) -> Option<M1Receipt> {
        self.receipts.get(outpoint).copied()
    }
}

const UNDO_TAG_LOCK: u8 = 0;
const UNDO_TAG_UNLOCK: u8 = 1;
const UNDO_TAG_TRANSFER: u8 = 2;

impl BathronSerialize for SettlementUndo {
    fn bathron_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        match self {
            SettlementUndo::Lock {
                vault_outpoint,
                receipt_outpoint,
                amount,
            } => {
                writer.write_all(&[UNDO_TAG_LOCK])?;
                vault_outpoint.bathron_serialize(&mut writer)?;
                receipt_outpoint.bathron_serialize(&mut writer)?;
                amount.bathron_serialize(&mut writer)
            }
            SettlementUndo::Unlock {
                erased_vaults,
                erased_receipts,
                created_receipt,
                created_vault,
                released,
            } => {
                writer.write_all(&[UNDO_TAG_UNLOCK])?;
                erased_vaults.bathron_serialize(&mut writer)?;
                erased_receipts.bathron_serialize(&mut writer)?;
                (created_receipt.is_some()).bathron_serialize(&mut writer)?;
                created_receipt.bathron_serialize(&mut writer)?;
                (created_vault.is_some()).bathron_serialize(&mut writer)?;
                created_vault.bathron_serialize(&mut writer)?;
                released.bathron_serialize(&mut writer)
            }
            SettlementUndo::Transfer {
                erased_receipt,
                created_receipts,
            } => {
                writer.write_all(&[UNDO_TAG_TRANSFER])?;
                erased_receipt.bathron_serialize(&mut writer)?;
                created_receipts.bathron_serialize(&mut writer)
            }
        }
    }
}

impl BathronDeserialize for SettlementUndo {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        match u8::bathron_deserialize(&mut reader)? {
            UNDO_TAG_LOCK => Ok(SettlementUndo::Lock {
                vault_outpoint: OutPoint::bathron_deserialize(&mut reader)?,
                receipt_outpoint: OutPoint::bathron_deserialize(&mut reader)?,
                amount: BathronDeserialize::bathron_deserialize(&mut reader)?,
            }),
            UNDO_TAG_UNLOCK => {
                let erased_vaults = Vec::bathron_deserialize(&mut reader)?;
                let erased_receipts = Vec::bathron_deserialize(&mut reader)?;
                let created_receipt = if bool::bathron_deserialize(&mut reader)? {
                    Some(OutPoint::bathron_deserialize(&mut reader)?)
                } else {
                    None
                };
                let created_vault = if bool::bathron_deserialize(&mut reader)? {
                    Some(OutPoint::bathron_deserialize(&mut reader)?)
                } else {
                    None
                };
                Ok(SettlementUndo::Unlock {
                    erased_vaults,
                    erased_receipts,
                    created_receipt,
                    created_vault,
                    released: BathronDeserialize::bathron_deserialize(&mut reader)?,
                })
            }
            UNDO_TAG_TRANSFER => Ok(SettlementUndo::Transfer {
                erased_receipt: M1Receipt::bathron_deserialize(&mut reader)?,
                created_receipts: Vec::bathron_deserialize(&mut reader)?,
            }),
            _ => Err(SerializationError::Parse("unknown settlement undo tag")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use super::super::view::{parse_settlement_tx, InputView, ResolvedInput};
    use super::*;
    use bathron_chain::{
        amount::COIN,
        transaction::{Hash, LockTime},
        transparent::{Input, Output, Script},
    };

    fn dest_script(n: u8) -> Script {
        Script(vec![0x76, 0xa9, n])
    }

    fn output(amount: i64, script: Script) -> Output {
        Output {
            value: Amount::try_from(amount).unwrap(),
            lock_script: script,
        }
    }

    fn spend(outpoint: OutPoint) -> Input {
        Input::PrevOut {
            outpoint,
            unlock_script: Script(vec![]),
            sequence: 0,
        }
    }

    fn m0_funding(n: u8, amount: i64) -> (Input, Option<ResolvedInput>) {
        (
            spend(OutPoint {
                hash: Hash([n; 32]),
                index: 0,
            }),
            Some(ResolvedInput {
                script: dest_script(9),
                amount,
            }),
        )
    }

    fn lock(book: &mut SettlementBook, amount: i64, height: Height) -> (Transaction, SettlementUndo) {
        let (input, resolved) = m0_funding(height.0 as u8, amount + COIN);
        let tx = Transaction::new(
            1,
            TxType::Lock,
            vec![input],
            vec![
                output(amount, Script::new_op_true()),
                output(amount, dest_script(1)),
            ],
            LockTime::unlocked(),
            Vec::new(),
        );
        let view = parse_settlement_tx(&tx, &vec![resolved], book).unwrap();
        let undo = book.apply(&tx, &view, height).unwrap();
        (tx, undo)
    }

    fn snapshot(book: &SettlementBook) -> (Vec<VaultEntry>, Vec<M1Receipt>, SettlementState) {
        let mut vaults: Vec<_> = book.iter_vaults().copied().collect();
        vaults.sort_by_key(|v| v.outpoint.to_key_bytes());
        let mut receipts: Vec<_> = book.iter_receipts().copied().collect();
        receipts.sort_by_key(|r| r.outpoint.to_key_bytes());
        (vaults, receipts, *book.state())
    }

    #[test]
    fn lock_creates_vault_and_receipt() {
        bathron_test::init();

        let mut book = SettlementBook::new();
        let (tx, _) = lock(&mut book, 10 * COIN, Height(5));

        assert_eq!(book.state().m0_vaulted.value(), 10 * COIN);
        assert_eq!(book.state().m1_supply.value(), 10 * COIN);
        assert!(book.vault(&tx.outpoint(0)).is_some());
        assert!(book.receipt(&tx.outpoint(1)).is_some());
        assert!(book.check_a6().is_ok());
    }

    #[test]
    fn undo_inverts_lock_exactly() {
        bathron_test::init();

        let mut book = SettlementBook::new();
        let before = snapshot(&book);
        let (_, undo) = lock(&mut book, 10 * COIN, Height(5));
        book.revert(&undo).unwrap();
        assert_eq!(snapshot(&book), before);
        assert!(book.check_a6().is_ok());
    }

    #[test]
    fn partial_unlock_with_change_and_undo() {
        bathron_test::init();

        let mut book = SettlementBook::new();
        let (lock_tx, _) = lock(&mut book, 100 * COIN, Height(1));
        let before = snapshot(&book);

        // S2: unlock 30, 70 back as M1 change and vault change.
        let tx = Transaction::new(
            1,
            TxType::Unlock,
            vec![spend(lock_tx.outpoint(1)), spend(lock_tx.outpoint(0))],
            vec![
                output(30 * COIN, dest_script(2)),
                output(70 * COIN, dest_script(3)),
                output(70 * COIN, Script::new_op_true()),
            ],
            LockTime::unlocked(),
            Vec::new(),
        );
        let inputs: InputView = vec![None, None];
        let view = parse_settlement_tx(&tx, &inputs, &book).unwrap();
        super::super::check::check_unlock(&tx, &view).unwrap();
        let undo = book.apply(&tx, &view, Height(2)).unwrap();

        assert_eq!(book.state().m0_vaulted.value(), 70 * COIN);
        assert_eq!(book.state().m1_supply.value(), 70 * COIN);
        assert!(book.vault(&lock_tx.outpoint(0)).is_none());
        assert!(book.receipt(&lock_tx.outpoint(1)).is_none());
        assert!(book.vault(&tx.outpoint(2)).is_some());
        assert!(book.receipt(&tx.outpoint(1)).is_some());
        assert!(book.check_a6().is_ok());

        book.revert(&undo).unwrap();
        assert_eq!(snapshot(&book), before);
    }

    #[test]
    fn transfer_moves_receipt_and_undo_restores() {
        bathron_test::init();

        let mut book = SettlementBook::new();
        let (lock_tx, _) = lock(&mut book, 10 * COIN, Height(1));
        let before = snapshot(&book);

        let tx = Transaction::new(
            1,
            TxType::TransferM1,
            vec![spend(lock_tx.outpoint(1))],
            vec![output(10 * COIN, dest_script(4))],
            LockTime::unlocked(),
            Vec::new(),
        );
        let view = parse_settlement_tx(&tx, &vec![None], &book).unwrap();
        super::super::check::check_transfer(&tx, &view).unwrap();
        let undo = book.apply(&tx, &view, Height(2)).unwrap();

        // Supply unchanged, receipt moved.
        assert_eq!(book.state(), &before.2);
        assert!(book.receipt(&lock_tx.outpoint(1)).is_none());
        assert!(book.receipt(&tx.outpoint(0)).is_some());

        book.revert(&undo).unwrap();
        assert_eq!(snapshot(&book), before);
    }

    #[test]
    fn undo_roundtrips_through_serialization() {
        bathron_test::init();

        let mut book = SettlementBook::new();
        let (lock_tx, lock_undo) = lock(&mut book, 10 * COIN, Height(1));

        let tx = Transaction::new(
            1,
            TxType::Unlock,
            vec![spend(lock_tx.outpoint(1)), spend(lock_tx.outpoint(0))],
            vec![
                output(4 * COIN, dest_script(2)),
                output(6 * COIN, dest_script(3)),
                output(6 * COIN, Script::new_op_true()),
            ],
            LockTime::unlocked(),
            Vec::new(),
        );
        let view = parse_settlement_tx(&tx, &vec![None, None], &book).unwrap();
        let unlock_undo = book.apply(&tx, &view, Height(2)).unwrap();

        for undo in &[lock_undo, unlock_undo] {
            let bytes = undo.bathron_serialize_to_vec().unwrap();
            let round = SettlementUndo::bathron_deserialize(&bytes[..]).unwrap();
            assert_eq!(&round, undo);
        }
    }
}
