//! The settlement transaction classifier.
//!
//! Classification is purely DB-driven: an input is whatever the vault and
//! receipt indices say its prevout is, with a single override: an input
//! whose resolved script is OP_TRUE is a vault input even when the index
//! has no entry (the index and UTXO set can only disagree transiently,
//! during the same block that creates the vault).
//!
//! The classifier is a pure function: identical inputs produce identical
//! views on every node. It performs no logging and touches no state.

use bathron_chain::{
    amount::add_no_overflow,
    settlement::{M1Receipt, VaultEntry},
    transaction::{Transaction, TxType},
    transparent::{OutPoint, Script},
};

use crate::error::TransactionError;

/// A resolved prevout: the script and amount of the output an input spends.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedInput {
    pub script: Script,
    pub amount: i64,
}

/// The resolved prevouts of a transaction, one slot per input; `None` where
/// the referenced output could not be found.
pub type InputView = Vec<Option<ResolvedInput>>;

/// Read access to the live vault and receipt indices.
pub trait SettlementIndex {
    fn vault(&self, outpoint: &OutPoint) -> Option<VaultEntry>;
    fn receipt(&self, outpoint: &OutPoint) -> Option<M1Receipt>;
}

/// The classifier's verdict on one transaction.
///
/// All amounts are satoshis; they are only populated when `complete` is
/// true. The index lists partition inputs and outputs into the three money
/// classes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SettlementTxView {
    pub tx_type: TxType,
    pub complete: bool,
    pub missing_inputs: Vec<usize>,

    pub m0_input_indices: Vec<usize>,
    pub m1_input_indices: Vec<usize>,
    pub vault_input_indices: Vec<usize>,

    pub m0_output_indices: Vec<usize>,
    pub m1_output_indices: Vec<usize>,
    pub vault_output_indices: Vec<usize>,

    pub m0_in: i64,
    pub m1_in: i64,
    pub vault_in: i64,

    pub m0_out: i64,
    pub m1_out: i64,
    pub vault_out: i64,

    pub m0_fee: i64,
}

impl SettlementTxView {
    fn empty(tx_type: TxType) -> SettlementTxView {
        SettlementTxView {
            tx_type,
            complete: true,
            missing_inputs: Vec::new(),
            m0_input_indices: Vec::new(),
            m1_input_indices: Vec::new(),
            vault_input_indices: Vec::new(),
            m0_output_indices: Vec::new(),
            m1_output_indices: Vec::new(),
            vault_output_indices: Vec::new(),
            m0_in: 0,
            m1_in: 0,
            vault_in: 0,
            m0_out: 0,
            m1_out: 0,
            vault_out: 0,
            m0_fee: 0,
        }
    }

    /// The amount released to M0 by an unlock: `vout[0]`.
    pub fn unlock_release(&self, tx: &Transaction) -> i64 {
        tx.outputs.get(0).map(|o| o.value.value()).unwrap_or(0)
    }

    /// The M1 change of an unlock: the sum over its M1 output indices.
    pub fn m1_change(&self) -> i64 {
        self.m1_out
    }

    /// The vault change of an unlock: the sum over its vault output
    /// indices.
    pub fn vault_change(&self) -> i64 {
        self.vault_out
    }
}

fn accumulate(total: &mut i64, amount: i64) -> Result<(), TransactionError> {
    *total = add_no_overflow(*total, amount).map_err(|_| TransactionError::AmountOverflow)?;
    Ok(())
}

/// Classify `tx` against the resolved prevouts and the live indices.
///
/// Fails only on amount overflow; an unresolvable input yields
/// `complete == false` with type and output indices still populated.
pub fn parse_settlement_tx(
    tx: &Transaction,
    inputs: &InputView,
    index: &dyn SettlementIndex,
) -> Result<SettlementTxView, TransactionError> {
    let mut view = SettlementTxView::empty(tx.tx_type);

    for (i, input) in tx.inputs.iter().enumerate() {
        let outpoint = match input.outpoint() {
            Some(outpoint) => outpoint,
            // Coinbase inputs carry no money class.
            None => {
                view.m0_input_indices.push(i);
                continue;
            }
        };

        if let Some(vault) = index.vault(&outpoint) {
            view.vault_input_indices.push(i);
            accumulate(&mut view.vault_in, vault.amount.value())?;
        } else if let Some(receipt) = index.receipt(&outpoint) {
            view.m1_input_indices.push(i);
            accumulate(&mut view.m1_in, receipt.amount.value())?;
        } else if let Some(resolved) = inputs.get(i).and_then(|slot| slot.as_ref()) {
            if resolved.script.is_op_true() {
                view.vault_input_indices.push(i);
                accumulate(&mut view.vault_in, resolved.amount)?;
            } else {
                view.m0_input_indices.push(i);
                accumulate(&mut view.m0_in, resolved.amount)?;
            }
        } else {
            view.complete = false;
            view.missing_inputs.push(i);
        }
    }

    classify_outputs(tx, &mut view)?;

    if view.complete {
        let total_in =
            add_no_overflow(view.m0_in, view.vault_in).map_err(|_| TransactionError::AmountOverflow)?;
        let total_out = add_no_overflow(view.m0_out, view.vault_out)
            .map_err(|_| TransactionError::AmountOverflow)?;
        view.m0_fee = total_in - total_out;
    }

    Ok(view)
}

fn classify_outputs(
    tx: &Transaction,
    view: &mut SettlementTxView,
) -> Result<(), TransactionError> {
    match tx.tx_type {
        TxType::Lock => {
            // vout[0] vault, vout[1] receipt, everything after is M0 change.
            for (i, output) in tx.outputs.iter().enumerate() {
                let amount = output.value.value();
                match i {
                    0 => {
                        view.vault_output_indices.push(i);
                        accumulate(&mut view.vault_out, amount)?;
                    }
                    1 => {
                        view.m1_output_indices.push(i);
                        accumulate(&mut view.m1_out, amount)?;
                    }
                    _ => {
                        view.m0_output_indices.push(i);
                        accumulate(&mut view.m0_out, amount)?;
                    }
                }
            }
        }
        TxType::Unlock => {
            // vout[0] is the M0 release. Vault change is recognized by its
            // OP_TRUE script; M1 change sits at vout[1] when the input
            // amounts call for one. Anything else is M0 fee change.
            let release = view.unlock_release(tx);
            let expects_m1_change = !view.complete || view.m1_in > release;
            for (i, output) in tx.outputs.iter().enumerate() {
                let amount = output.value.value();
                if i == 0 {
                    view.m0_output_indices.push(i);
                    accumulate(&mut view.m0_out, amount)?;
                } else if output.lock_script.is_op_true() {
                    view.vault_output_indices.push(i);
                    accumulate(&mut view.vault_out, amount)?;
                } else if i == 1 && expects_m1_change {
                    view.m1_output_indices.push(i);
                    accumulate(&mut view.m1_out, amount)?;
                } else {
                    view.m0_output_indices.push(i);
                    accumulate(&mut view.m0_out, amount)?;
                }
            }
        }
        TxType::TransferM1 => {
            // Cumulative-sum walk: outputs are M1 while their running total
            // stays within the M1 input; the first to exceed it starts the
            // M0 tail.
            let mut running: i64 = 0;
            let mut in_m0_tail = false;
            for (i, output) in tx.outputs.iter().enumerate() {
                let amount = output.value.value();
                if !view.complete {
                    // Without amounts the walk is undefined; report every
                    // output as a candidate receipt.
                    view.m1_output_indices.push(i);
                    continue;
                }
                running = add_no_overflow(running, amount)
                    .map_err(|_| TransactionError::AmountOverflow)?;
                if !in_m0_tail && running <= view.m1_in {
                    view.m1_output_indices.push(i);
                    accumulate(&mut view.m1_out, amount)?;
                } else {
                    in_m0_tail = true;
                    view.m0_output_indices.push(i);
                    accumulate(&mut view.m0_out, amount)?;
                }
            }
        }
        _ => {
            // Non-settlement types: the classifier only flags OP_TRUE
            // outputs so the containment rule can see them.
            for (i, output) in tx.outputs.iter().enumerate() {
                let amount = output.value.value();
                if output.lock_script.is_op_true() {
                    view.vault_output_indices.push(i);
                    accumulate(&mut view.vault_out, amount)?;
                } else {
                    view.m0_output_indices.push(i);
                    accumulate(&mut view.m0_out, amount)?;
                }
            }
        }
    }
    Ok(())
}
