//! Deterministic construction and byte-exact validation of `TX_MINT_M0BTC`.
//!
//! Every node runs the builder's eligibility rules inside the validator, so
//! the producer's mint either matches what every peer would have built or
//! the block is rejected. Determinism hinges on three things: eligibility
//! queries go only to the consensus-replicated header store, the claim list
//! is sorted lexicographically by txid, and the 1-sat-BTC = 1-sat-M0 value
//! map leaves no rounding to disagree over.

use std::convert::TryFrom;

use bathron_chain::{
    amount::Amount,
    block::Height,
    btc,
    burn::{ClaimStatus, MintPayload},
    parameters::{NetworkParameters, MAX_MINT_CLAIMS_PER_BLOCK, MIN_BURN_SATS},
    serialization::{BathronDeserialize, BathronSerialize, SerializationError},
    transaction::{LockTime, Transaction, TxType},
    transparent::{Output, Script},
};

use crate::burn::BurnBook;
use crate::error::{BlockError, MintError};
use crate::external::BtcHeaderSource;
use crate::killswitch::EmergencySwitch;

/// Undo for one connected mint: the finalized txids, in payload order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MintUndo {
    pub btc_txids: Vec<btc::Txid>,
}

/// Is this PENDING claim ready to finalize in a block at `mint_height`?
///
/// Both time dimensions are consensus queries: the BATHRON delay against
/// the claim height, and the BTC confirmation depth against the replicated
/// header store. Wall clock never participates.
pub fn eligible_for_mint(
    record: &bathron_chain::burn::BurnClaimRecord,
    mint_height: Height,
    source: &dyn BtcHeaderSource,
    params: &NetworkParameters,
) -> Result<(), MintError> {
    if record.status != ClaimStatus::Pending {
        return Err(MintError::NotPending);
    }
    if u64::from(mint_height.0) <= u64::from(record.claim_height.0) + u64::from(params.k_finality)
    {
        return Err(MintError::ClaimTooEarly);
    }
    // The claimed block must still sit at its claimed height on the best
    // chain, with enough confirmations on top.
    if source.get_hash_at_height(record.btc_height) != Some(record.btc_block_hash) {
        return Err(MintError::BtcInvalid);
    }
    if source.confirmations(record.btc_height) < params.k_confirmations {
        return Err(MintError::BtcInvalid);
    }
    Ok(())
}

/// Build the canonical mint transaction for a block at `height`, if any
/// claim is eligible.
///
/// Deterministic: with identical burn books and header stores, two nodes
/// produce byte-identical transactions.
pub fn create_mint_m0btc(
    height: Height,
    book: &BurnBook,
    source: &dyn BtcHeaderSource,
    params: &NetworkParameters,
    switch: &EmergencySwitch,
) -> Option<Transaction> {
    if !switch.burns_enabled() {
        return None;
    }

    // `pending()` already iterates in txid order, which is exactly the
    // canonical payload order.
    let mut txids = Vec::new();
    let mut outputs = Vec::new();
    for record in book.pending() {
        if eligible_for_mint(record, height, source, params).is_err() {
            continue;
        }
        if record.burned_sats < MIN_BURN_SATS {
            continue;
        }
        let value = match Amount::try_from(record.burned_sats as i64) {
            Ok(value) => value,
            Err(_) => continue,
        };
        txids.push(record.btc_txid);
        outputs.push(Output {
            value,
            lock_script: Script::new_p2pkh(&record.bathron_dest),
        });
        if txids.len() == MAX_MINT_CLAIMS_PER_BLOCK {
            break;
        }
    }

    if txids.is_empty() {
        return None;
    }

    let payload = MintPayload {
        version: MintPayload::VERSION,
        btc_txids: txids,
    };
    let payload_bytes = payload
        .bathron_serialize_to_vec()
        .expect("writing to a Vec is infallible");

    Some(Transaction::new(
        1,
        TxType::MintM0Btc,
        vec![],
        outputs,
        LockTime::unlocked(),
        payload_bytes,
    ))
}

/// Byte-exact validation of a mint transaction.
///
/// Every node must accept or reject identically; each rule carries its own
/// stable reject code.
pub fn check_mint_m0btc(
    tx: &Transaction,
    height: Height,
    book: &BurnBook,
    source: &dyn BtcHeaderSource,
    params: &NetworkParameters,
    switch: &EmergencySwitch,
) -> Result<MintPayload, MintError> {
    if tx.tx_type != TxType::MintM0Btc {
        return Err(MintError::NotSpecial);
    }
    if tx.extra_payload.is_empty() {
        return Err(MintError::NoPayload);
    }
    let payload = MintPayload::bathron_deserialize(&tx.extra_payload[..])
        .map_err(|_| MintError::PayloadDecode)?;

    if payload.btc_txids.is_empty() || payload.btc_txids.len() > MAX_MINT_CLAIMS_PER_BLOCK {
        return Err(MintError::PayloadInvalid);
    }
    // Strictly sorted: ascending with no duplicates.
    if !payload.btc_txids.windows(2).all(|pair| pair[0] < pair[1]) {
        return Err(MintError::NotSorted);
    }

    if !tx.inputs.is_empty() {
        return Err(MintError::HasInputs);
    }
    if tx.outputs.len() != payload.btc_txids.len() {
        return Err(MintError::OutputCount);
    }

    // Re-checked here on purpose: a kill-switch trip voids in-flight mints.
    if !switch.burns_enabled() {
        return Err(MintError::Disabled);
    }

    for (txid, output) in payload.btc_txids.iter().zip(tx.outputs.iter()) {
        let record = book.get(txid).ok_or(MintError::UnknownClaim)?;
        eligible_for_mint(&record, height, source, params)?;

        if record.burned_sats < MIN_BURN_SATS {
            return Err(MintError::AmountDust);
        }
        let expected = Amount::<bathron_chain::amount::NonNegative>::try_from(
            record.burned_sats as i64,
        )
        .map_err(|_| MintError::AmountRange)?;
        if output.value != expected {
            return Err(MintError::AmountMismatch);
        }
        if output.lock_script != Script::new_p2pkh(&record.bathron_dest) {
            return Err(MintError::DestMismatch);
        }
    }

    Ok(payload)
}

/// Finalize every claim named by a validated mint.
pub fn connect_mint(
    payload: &MintPayload,
    book: &mut BurnBook,
    height: Height,
) -> Result<MintUndo, BlockError> {
    for txid in &payload.btc_txids {
        book.finalize(txid, height)?;
    }
    tracing::info!(
        claims = payload.btc_txids.len(),
        height = height.0,
        "mint finalized burn claims"
    );
    Ok(MintUndo {
        btc_txids: payload.btc_txids.clone(),
    })
}

/// Reverse a connected mint: claims back to PENDING, supply debited.
pub fn disconnect_mint(undo: &MintUndo, book: &mut BurnBook) -> Result<(), BlockError> {
    for txid in undo.btc_txids.iter().rev() {
        book.definalize(txid)?;
    }
    Ok(())
}

impl BathronSerialize for MintUndo {
    fn bathron_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        self.btc_txids.bathron_serialize(&mut writer)
    }
}

impl BathronDeserialize for MintUndo {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(MintUndo {
            btc_txids: Vec::bathron_deserialize(&mut reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use super::*;
    use crate::burn::check::tests::{claim_tx, source_with_burn};
    use crate::burn::check_burn_claim;
    use crate::external::MemoryHeaderSource;
    use bathron_chain::parameters::Network;

    fn testnet_params() -> NetworkParameters {
        NetworkParameters::for_network(Network::Testnet)
    }

    /// A book with the burn vector claimed at `claim_height`, plus the
    /// header source that backs it.
    fn claimed_book(claim_height: Height) -> (BurnBook, MemoryHeaderSource, btc::Txid) {
        let (source, block_hash, txid) = source_with_burn(200_050, 10);
        let tx = claim_tx(block_hash, 200_050);
        let mut book = BurnBook::new();
        let parsed = check_burn_claim(
            &tx,
            &book,
            &source,
            Network::Testnet,
            &EmergencySwitch::new(),
        )
        .unwrap();
        book.connect_claim(&parsed, claim_height);
        (book, source, txid)
    }

    #[test]
    fn builder_emits_nothing_before_the_delay() {
        bathron_test::init();

        let (book, source, _) = claimed_book(Height(100));
        let params = testnet_params();
        // 100 + k_finality(20) = 120: height 120 is still too early.
        assert!(create_mint_m0btc(
            Height(120),
            &book,
            &source,
            &params,
            &EmergencySwitch::new()
        )
        .is_none());
    }

    #[test]
    fn builder_and_validator_agree() {
        bathron_test::init();

        let (book, source, txid) = claimed_book(Height(100));
        let params = testnet_params();
        let switch = EmergencySwitch::new();

        let mint = create_mint_m0btc(Height(121), &book, &source, &params, &switch)
            .expect("claim is eligible at 121");
        assert!(mint.inputs.is_empty());
        assert_eq!(mint.outputs.len(), 1);
        assert_eq!(mint.outputs[0].value.value(), 1_000_000);

        let payload =
            check_mint_m0btc(&mint, Height(121), &book, &source, &params, &switch).unwrap();
        assert_eq!(payload.btc_txids, vec![txid]);
    }

    #[test]
    fn mint_determinism() {
        bathron_test::init();

        let (book, source, _) = claimed_book(Height(100));
        let params = testnet_params();
        let switch = EmergencySwitch::new();

        let first = create_mint_m0btc(Height(121), &book, &source, &params, &switch).unwrap();
        let second = create_mint_m0btc(Height(121), &book, &source, &params, &switch).unwrap();
        assert_eq!(
            first.bathron_serialize_to_vec().unwrap(),
            second.bathron_serialize_to_vec().unwrap()
        );
    }

    #[test]
    fn validator_rejects_unsorted_and_tampered_mints() {
        bathron_test::init();

        let (book, source, _) = claimed_book(Height(100));
        let params = testnet_params();
        let switch = EmergencySwitch::new();
        let mint = create_mint_m0btc(Height(121), &book, &source, &params, &switch).unwrap();

        // Duplicate txid entry: not strictly sorted.
        let payload = MintPayload::bathron_deserialize(&mint.extra_payload[..]).unwrap();
        let mut doubled = payload.clone();
        doubled.btc_txids.push(doubled.btc_txids[0]);
        let mut tampered = mint.clone();
        tampered.extra_payload = doubled.bathron_serialize_to_vec().unwrap();
        tampered.outputs.push(tampered.outputs[0].clone());
        let tampered = Transaction::new(
            tampered.version,
            tampered.tx_type,
            tampered.inputs.clone(),
            tampered.outputs.clone(),
            tampered.locktime,
            tampered.extra_payload.clone(),
        );
        assert_eq!(
            check_mint_m0btc(&tampered, Height(121), &book, &source, &params, &switch),
            Err(MintError::NotSorted)
        );

        // Wrong output value.
        let mut wrong_value = mint.clone();
        wrong_value.outputs[0].value = Amount::try_from(999_999i64).unwrap();
        assert_eq!(
            check_mint_m0btc(&wrong_value, Height(121), &book, &source, &params, &switch),
            Err(MintError::AmountMismatch)
        );

        // Wrong destination.
        let mut wrong_dest = mint.clone();
        wrong_dest.outputs[0].lock_script =
            Script::new_p2pkh(&bathron_chain::transparent::Hash160([0xbb; 20]));
        assert_eq!(
            check_mint_m0btc(&wrong_dest, Height(121), &book, &source, &params, &switch),
            Err(MintError::DestMismatch)
        );
    }

    #[test]
    fn kill_switch_voids_in_flight_mints() {
        bathron_test::init();

        let (book, source, _) = claimed_book(Height(100));
        let params = testnet_params();
        let switch = EmergencySwitch::new();
        let mint = create_mint_m0btc(Height(121), &book, &source, &params, &switch).unwrap();

        switch.set_burns_enabled(false);
        assert_eq!(
            check_mint_m0btc(&mint, Height(121), &book, &source, &params, &switch),
            Err(MintError::Disabled)
        );
    }

    #[test]
    fn btc_reorg_invalidates_eligibility() {
        bathron_test::init();

        let (book, mut source, _) = claimed_book(Height(100));
        let params = testnet_params();
        let switch = EmergencySwitch::new();
        let mint = create_mint_m0btc(Height(121), &book, &source, &params, &switch).unwrap();

        // The burn's BTC block leaves the best chain before the mint lands.
        source.truncate_best_chain(200_049);
        assert_eq!(
            check_mint_m0btc(&mint, Height(121), &book, &source, &params, &switch),
            Err(MintError::BtcInvalid)
        );
    }

    #[test]
    fn connect_disconnect_roundtrip() {
        bathron_test::init();

        let (mut book, source, txid) = claimed_book(Height(100));
        let params = testnet_params();
        let switch = EmergencySwitch::new();
        let mint = create_mint_m0btc(Height(121), &book, &source, &params, &switch).unwrap();
        let payload =
            check_mint_m0btc(&mint, Height(121), &book, &source, &params, &switch).unwrap();

        let undo = connect_mint(&payload, &mut book, Height(121)).unwrap();
        assert_eq!(book.m0btc_supply(), 1_000_000);
        assert_eq!(book.get(&txid).unwrap().status, ClaimStatus::Final);

        disconnect_mint(&undo, &mut book).unwrap();
        assert_eq!(book.m0btc_supply(), 0);
        assert_eq!(book.get(&txid).unwrap().status, ClaimStatus::Pending);
        assert_eq!(book.get(&txid).unwrap().final_height, Height(0));
    }
}
