//! Atomic block connection and disconnection.
//!
//! Connect runs under the chain-state lock as one logical transaction:
//! classifier -> validator -> apply, transaction by transaction in block
//! order. Any failure rolls back every mutation already made, so the books
//! are untouched by a rejected block. Disconnect replays the captured undo
//! journal in strict reverse order.
//!
//! Intra-block ordering matters in exactly one place: the same-block
//! receipt set (`pending_receipts`) that blocks LOCK-from-fresh-receipt
//! inflation. Anything parallelizing this loop must serialize the insertion
//! of newly created receipts before the next transaction resolves its
//! inputs, or stay sequential as this implementation does.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use bathron_chain::{
    block::{self, Block, Height},
    masternode::MasternodeEntry,
    parameters::{Network, NetworkParameters},
    serialization::{BathronDeserialize, BathronSerialize, SerializationError},
    transaction::{Transaction, TxType},
    transparent::OutPoint,
};

use crate::burn::{check_burn_claim, BurnBook, ClaimUndo};
use crate::error::{BlockError, TransactionError};
use crate::external::BtcHeaderSource;
use crate::headers;
use crate::killswitch::EmergencySwitch;
use crate::mint::{self, MintUndo};
use crate::settlement::{
    check as settlement_check, parse_settlement_tx, InputView, ResolvedInput, SettlementBook,
    SettlementUndo,
};

/// Read access to the spendable-output set maintained by the chainstate.
pub trait UtxoView {
    fn resolve(&self, outpoint: &OutPoint) -> Option<ResolvedInput>;
}

impl UtxoView for HashMap<OutPoint, ResolvedInput> {
    fn resolve(&self, outpoint: &OutPoint) -> Option<ResolvedInput> {
        self.get(outpoint).cloned()
    }
}

/// Everything a connect needs besides the stores themselves.
pub struct ConnectContext<'a> {
    pub network: Network,
    pub params: &'a NetworkParameters,
    pub switch: &'a EmergencySwitch,
    /// Checked between transactions, never mid-transaction.
    pub shutdown: &'a AtomicBool,
    /// The active masternode snapshot at this height (headers signature
    /// validation).
    pub active_masternodes: &'a [MasternodeEntry],
}

/// The journal entry for one connected block: everything needed to reverse
/// it exactly.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockUndo {
    pub block_hash: block::Hash,
    pub height: Height,
    /// Settlement undos in application order.
    pub settlement: Vec<SettlementUndo>,
    /// Claim undos in application order.
    pub claims: Vec<ClaimUndo>,
    pub mint: Option<MintUndo>,
}

/// Connect `block` at `height`, mutating the books and returning the undo
/// journal entry.
///
/// On any rejection the books are exactly as before the call. A fatal
/// error (A6 break, journal inconsistency) means the node must halt.
pub fn connect_block(
    block: &Block,
    height: Height,
    ctx: &ConnectContext<'_>,
    utxos: &dyn UtxoView,
    settlement: &mut SettlementBook,
    burns: &mut BurnBook,
    header_source: &mut dyn BtcHeaderSource,
) -> Result<BlockUndo, BlockError> {
    super::check::block_structure(block)?;

    if block.coinbase_height() != Some(height) {
        return Err(BlockError::BadHeight);
    }

    let previous_height = settlement.state().height;
    let mut undo = BlockUndo {
        block_hash: block.hash(),
        height,
        settlement: Vec::new(),
        claims: Vec::new(),
        mint: None,
    };

    // Outputs created earlier in this block, resolvable by later inputs.
    let mut overlay: HashMap<OutPoint, ResolvedInput> = HashMap::new();
    // Receipts created earlier in this block (same-block theft prevention).
    let mut pending_receipts: HashSet<OutPoint> = HashSet::new();

    let result = (|| -> Result<(), BlockError> {
        for (position, tx) in block.transactions.iter().enumerate() {
            if ctx.shutdown.load(Ordering::SeqCst) {
                return Err(BlockError::Fatal("shutdown during block connect".into()));
            }

            if position > 0 {
                connect_transaction(
                    tx,
                    height,
                    ctx,
                    utxos,
                    &overlay,
                    &mut pending_receipts,
                    settlement,
                    burns,
                    header_source,
                    &mut undo,
                )?;
            }

            let txid = tx.hash();
            for (index, output) in tx.outputs.iter().enumerate() {
                overlay.insert(
                    OutPoint {
                        hash: txid,
                        index: index as u32,
                    },
                    ResolvedInput {
                        script: output.lock_script.clone(),
                        amount: output.value.value(),
                    },
                );
            }
        }

        settlement.set_height(height);
        settlement.check_a6()
    })();

    if let Err(error) = result {
        // Reject path: put every store back exactly as it was.
        rollback(&undo, previous_height, settlement, burns)?;
        return Err(error);
    }

    metrics::counter!("consensus.connected.block.count", 1);
    metrics::gauge!("consensus.connected.block.height", height.0 as _);
    tracing::debug!(height = height.0, hash = %undo.block_hash, "block connected");
    Ok(undo)
}

#[allow(clippy::too_many_arguments)]
fn connect_transaction(
    tx: &Transaction,
    height: Height,
    ctx: &ConnectContext<'_>,
    utxos: &dyn UtxoView,
    overlay: &HashMap<OutPoint, ResolvedInput>,
    pending_receipts: &mut HashSet<OutPoint>,
    settlement: &mut SettlementBook,
    burns: &mut BurnBook,
    header_source: &mut dyn BtcHeaderSource,
    undo: &mut BlockUndo,
) -> Result<(), BlockError> {
    let input_view = resolve_inputs(tx, overlay, utxos);
    let view = parse_settlement_tx(tx, &input_view, settlement)?;

    // Containment binds every non-settlement type, special or not: no
    // OP_TRUE production or consumption, no receipt consumption, and no
    // touching receipts created earlier in this block.
    if !tx.tx_type.is_settlement() {
        settlement_check::check_containment(tx, &view)?;
        for input in &tx.inputs {
            if let Some(outpoint) = input.outpoint() {
                if pending_receipts.contains(&outpoint) {
                    return Err(TransactionError::ReceiptForbidden.into());
                }
            }
        }
    }

    match tx.tx_type {
        TxType::Lock => {
            for input in &tx.inputs {
                if let Some(outpoint) = input.outpoint() {
                    if pending_receipts.contains(&outpoint) {
                        return Err(TransactionError::LockSameBlockReceipt.into());
                    }
                }
            }
            if !view.complete {
                return Err(TransactionError::InputsMissing.into());
            }
            settlement_check::check_lock(tx, &view)?;
            undo.settlement.push(settlement.apply(tx, &view, height)?);
            pending_receipts.insert(tx.outpoint(1));
        }
        TxType::Unlock => {
            if !view.complete {
                return Err(TransactionError::InputsMissing.into());
            }
            settlement_check::check_unlock(tx, &view)?;
            let applied = settlement.apply(tx, &view, height)?;
            if let SettlementUndo::Unlock {
                created_receipt: Some(outpoint),
                ..
            } = &applied
            {
                pending_receipts.insert(*outpoint);
            }
            undo.settlement.push(applied);
        }
        TxType::TransferM1 => {
            if !view.complete {
                return Err(TransactionError::InputsMissing.into());
            }
            settlement_check::check_transfer(tx, &view)?;
            for &index in &view.m1_output_indices {
                pending_receipts.insert(tx.outpoint(index as u32));
            }
            undo.settlement.push(settlement.apply(tx, &view, height)?);
        }
        TxType::BurnClaim => {
            let parsed =
                check_burn_claim(tx, burns, header_source, ctx.network, ctx.switch)?;
            undo.claims.push(burns.connect_claim(&parsed, height));
        }
        TxType::MintM0Btc => {
            let payload = mint::check_mint_m0btc(
                tx,
                height,
                burns,
                header_source,
                ctx.params,
                ctx.switch,
            )?;
            let mint_undo = mint::connect_mint(&payload, burns, height)?;
            settlement.add_minted_supply(minted_total(&mint_undo, burns))?;
            undo.mint = Some(mint_undo);
        }
        TxType::BtcHeaders => {
            let payload =
                headers::check_btc_headers_tx(tx, height, ctx.active_masternodes)?;
            if height == Height(1) {
                headers::check_genesis_headers_agree(&payload, header_source)?;
            }
            headers::connect_btc_headers(&payload, header_source)?;
        }
        TxType::Normal => {}
    }

    Ok(())
}

fn resolve_inputs(
    tx: &Transaction,
    overlay: &HashMap<OutPoint, ResolvedInput>,
    utxos: &dyn UtxoView,
) -> InputView {
    tx.inputs
        .iter()
        .map(|input| {
            input.outpoint().and_then(|outpoint| {
                overlay
                    .get(&outpoint)
                    .cloned()
                    .or_else(|| utxos.resolve(&outpoint))
            })
        })
        .collect()
}

/// Disconnect a block: replay its journal entry in strict reverse order.
pub fn disconnect_block(
    undo: &BlockUndo,
    settlement: &mut SettlementBook,
    burns: &mut BurnBook,
) -> Result<(), BlockError> {
    let previous_height = Height(undo.height.0.saturating_sub(1));
    rollback(undo, previous_height, settlement, burns)?;
    tracing::debug!(height = undo.height.0, hash = %undo.block_hash, "block disconnected");
    Ok(())
}

fn minted_total(mint_undo: &MintUndo, burns: &BurnBook) -> u64 {
    mint_undo
        .btc_txids
        .iter()
        .filter_map(|txid| burns.get(txid))
        .map(|record| record.burned_sats)
        .sum()
}

fn rollback(
    undo: &BlockUndo,
    restore_height: Height,
    settlement: &mut SettlementBook,
    burns: &mut BurnBook,
) -> Result<(), BlockError> {
    if let Some(mint_undo) = &undo.mint {
        let minted = minted_total(mint_undo, burns);
        mint::disconnect_mint(mint_undo, burns)?;
        settlement.remove_minted_supply(minted)?;
    }
    for claim_undo in undo.claims.iter().rev() {
        burns.disconnect_claim(claim_undo)?;
    }
    for settlement_undo in undo.settlement.iter().rev() {
        settlement.revert(settlement_undo)?;
    }
    settlement.set_height(restore_height);
    settlement.check_a6()
}

impl BathronSerialize for BlockUndo {
    fn bathron_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        self.block_hash.bathron_serialize(&mut writer)?;
        self.height.bathron_serialize(&mut writer)?;
        self.settlement.bathron_serialize(&mut writer)?;
        self.claims.bathron_serialize(&mut writer)?;
        (self.mint.is_some()).bathron_serialize(&mut writer)?;
        self.mint.bathron_serialize(&mut writer)
    }
}

impl BathronDeserialize for BlockUndo {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let block_hash = block::Hash::bathron_deserialize(&mut reader)?;
        let height = Height::bathron_deserialize(&mut reader)?;
        let settlement = Vec::bathron_deserialize(&mut reader)?;
        let claims = Vec::bathron_deserialize(&mut reader)?;
        let mint = if bool::bathron_deserialize(&mut reader)? {
            Some(MintUndo::bathron_deserialize(&mut reader)?)
        } else {
            None
        };
        Ok(BlockUndo {
            block_hash,
            height,
            settlement,
            claims,
            mint,
        })
    }
}
