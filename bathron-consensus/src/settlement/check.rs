//! Settlement validators.
//!
//! Every function here is a pure check: `Ok(())` or a typed rejection with
//! a stable reject reason. Nothing mutates state; the book applies a
//! transaction only after its check passed.

use bathron_chain::{
    amount::add_no_overflow,
    transaction::{Transaction, TxType},
};

use crate::error::TransactionError;

use super::view::SettlementTxView;

/// Validate a `TX_LOCK` against its classifier view.
pub fn check_lock(tx: &Transaction, view: &SettlementTxView) -> Result<(), TransactionError> {
    if tx.tx_type != TxType::Lock {
        return Err(TransactionError::LockWrongType);
    }

    // Locks mint M1 against plain M0 only.
    if !view.m1_input_indices.is_empty() || !view.vault_input_indices.is_empty() {
        return Err(TransactionError::LockInputNotM0);
    }

    if tx.outputs.len() < 2 {
        return Err(TransactionError::LockOutputCount);
    }

    let vault = &tx.outputs[0];
    let receipt = &tx.outputs[1];

    if !vault.lock_script.is_op_true() {
        return Err(TransactionError::LockVaultNotOpTrue);
    }
    if vault.value.value() == 0 {
        return Err(TransactionError::LockAmountZero);
    }
    if vault.value != receipt.value {
        return Err(TransactionError::LockAmountMismatch);
    }

    // The only OP_TRUE output of a lock is the vault at index 0.
    if view.vault_output_indices != [0] {
        return Err(TransactionError::OpTrueForbidden);
    }
    if receipt.lock_script.is_op_true() || receipt.lock_script.is_unspendable() {
        return Err(TransactionError::TransferInvalidOutputs);
    }

    Ok(())
}

/// Validate a `TX_UNLOCK` against its classifier view.
pub fn check_unlock(tx: &Transaction, view: &SettlementTxView) -> Result<(), TransactionError> {
    if tx.tx_type != TxType::Unlock {
        return Err(TransactionError::UnlockWrongType);
    }

    if view.m1_input_indices.is_empty() {
        return Err(TransactionError::UnlockNoReceipts);
    }

    // Canonical input order: a contiguous run of receipts, then a
    // contiguous run of vaults, then M0 fee inputs. Encoded as classes that
    // may never decrease along the input list.
    let mut last_class = 0u8; // 0 = receipt, 1 = vault, 2 = fee
    for index in 0..tx.inputs.len() {
        let class = if view.m1_input_indices.contains(&index) {
            0
        } else if view.vault_input_indices.contains(&index) {
            1
        } else {
            2
        };
        if class < last_class {
            return Err(TransactionError::UnlockFeeBeforeVault);
        }
        last_class = class;
    }

    let release = view.unlock_release(tx);
    if view.vault_in < release {
        return Err(TransactionError::UnlockM0ExceedsVault);
    }

    // Strict conservation on the M1 side: every receipt satoshi either
    // leaves as released M0 or returns as M1 change.
    let m1_required =
        add_no_overflow(release, view.m1_change()).map_err(|_| TransactionError::AmountOverflow)?;
    if view.m1_in != m1_required {
        return Err(TransactionError::UnlockConservation);
    }

    // The vault side must balance identically, change output or not;
    // anything else would desynchronize M0_vaulted from M1_supply.
    let vault_required = add_no_overflow(release, view.vault_change())
        .map_err(|_| TransactionError::AmountOverflow)?;
    if view.vault_in != vault_required {
        return Err(TransactionError::UnlockConservation);
    }

    // At most one vault change output, and classification already demands
    // it carries the OP_TRUE script.
    if view.vault_output_indices.len() > 1 {
        return Err(TransactionError::OpTrueForbidden);
    }
    for &index in &view.m1_output_indices {
        let script = &tx.outputs[index].lock_script;
        if script.is_op_true() {
            return Err(TransactionError::UnlockVaultChangeNotOpTrue);
        }
        if script.is_unspendable() {
            return Err(TransactionError::TransferInvalidOutputs);
        }
    }

    Ok(())
}

/// Validate a `TX_TRANSFER_M1` against its classifier view.
pub fn check_transfer(tx: &Transaction, view: &SettlementTxView) -> Result<(), TransactionError> {
    if tx.tx_type != TxType::TransferM1 {
        return Err(TransactionError::TransferNoReceiptInput);
    }

    if view.m1_input_indices.is_empty() {
        return Err(TransactionError::TransferNoReceiptInput);
    }
    // Exactly one receipt, and it must sit at vin[0].
    if view.m1_input_indices != [0] {
        return Err(TransactionError::TransferReceiptNotVin0);
    }
    // Transfers never touch vaults.
    if !view.vault_input_indices.is_empty() {
        return Err(TransactionError::OpTrueForbidden);
    }

    if view.m1_output_indices.is_empty() {
        return Err(TransactionError::TransferInvalidOutputs);
    }
    for &index in &view.m1_output_indices {
        let output = &tx.outputs[index];
        if output.lock_script.is_op_true() {
            return Err(TransactionError::OpTrueForbidden);
        }
        if output.value.value() <= 0 || output.lock_script.is_unspendable() {
            return Err(TransactionError::TransferInvalidOutputs);
        }
    }

    // Strict conservation: neither burn nor inflation.
    if view.m1_out != view.m1_in {
        return Err(TransactionError::TransferNotConserved);
    }

    Ok(())
}

/// The OP_TRUE containment rule for non-settlement transactions.
///
/// This is the entire reason an anyone-can-spend vault script is safe: no
/// transaction outside the settlement triplet may produce *or consume* an
/// OP_TRUE output, and no non-settlement transaction may consume a tracked
/// receipt.
pub fn check_containment(
    tx: &Transaction,
    view: &SettlementTxView,
) -> Result<(), TransactionError> {
    debug_assert!(!tx.tx_type.is_settlement());

    if !view.vault_output_indices.is_empty() {
        return Err(TransactionError::OpTrueForbidden);
    }
    if !view.vault_input_indices.is_empty() {
        return Err(TransactionError::OpTrueForbidden);
    }
    if !view.m1_input_indices.is_empty() {
        return Err(TransactionError::ReceiptForbidden);
    }
    Ok(())
}
