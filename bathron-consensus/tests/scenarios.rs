//! End-to-end settlement and burn scenarios, driven through block
//! connection exactly as the chainstate drives them.

use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use bathron_chain::{
    amount::{Amount, COIN},
    block::{Block, Header, Height},
    btc,
    burn::{BurnClaimPayload, ClaimStatus},
    masternode::ProTxHash,
    parameters::{Network, NetworkParameters},
    serialization::BathronSerialize,
    transaction::{Hash, LockTime, Transaction, TxType},
    transparent::{CoinbaseData, Hash160, Input, OutPoint, Output, Script},
    work::difficulty::CompactDifficulty,
};
use bathron_consensus::{
    block::{connect_block, disconnect_block, ConnectContext},
    burn::BurnBook,
    error::{BlockError, TransactionError},
    external::MemoryHeaderSource,
    killswitch::EmergencySwitch,
    settlement::{ResolvedInput, SettlementBook, SettlementIndex},
};
use bathron_test::vectors::BURN_TX_SEGWIT;

type Utxos = HashMap<OutPoint, ResolvedInput>;

struct Harness {
    settlement: SettlementBook,
    burns: BurnBook,
    source: MemoryHeaderSource,
    utxos: Utxos,
    params: NetworkParameters,
    switch: EmergencySwitch,
    shutdown: AtomicBool,
}

impl Harness {
    fn testnet() -> Harness {
        Harness {
            settlement: SettlementBook::new(),
            burns: BurnBook::new(),
            source: MemoryHeaderSource::new(200_000),
            utxos: HashMap::new(),
            params: NetworkParameters::for_network(Network::Testnet),
            switch: EmergencySwitch::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    fn fund(&mut self, n: u8, amount: i64) -> OutPoint {
        let outpoint = OutPoint {
            hash: Hash([n; 32]),
            index: 0,
        };
        self.utxos.insert(
            outpoint,
            ResolvedInput {
                script: Script(vec![0x76, 0xa9, n]),
                amount,
            },
        );
        outpoint
    }

    fn connect(
        &mut self,
        height: u32,
        txs: Vec<Transaction>,
    ) -> Result<bathron_consensus::block::BlockUndo, BlockError> {
        let block = make_block(Height(height), txs);
        let ctx = ConnectContext {
            network: Network::Testnet,
            params: &self.params,
            switch: &self.switch,
            shutdown: &self.shutdown,
            active_masternodes: &[],
        };
        connect_block(
            &block,
            Height(height),
            &ctx,
            &self.utxos,
            &mut self.settlement,
            &mut self.burns,
            &mut self.source,
        )
    }
}

fn coinbase(height: Height) -> Transaction {
    Transaction::new(
        1,
        TxType::Normal,
        vec![Input::Coinbase {
            data: CoinbaseData::new(height, b""),
            sequence: 0,
        }],
        vec![Output {
            value: Amount::try_from(0i64).unwrap(),
            lock_script: Script(vec![]),
        }],
        LockTime::unlocked(),
        Vec::new(),
    )
}

fn make_block(height: Height, txs: Vec<Transaction>) -> Block {
    let mut transactions = vec![Arc::new(coinbase(height))];
    transactions.extend(txs.into_iter().map(Arc::new));
    let merkle_root = transactions.iter().map(|tx| tx.hash()).collect();
    Block {
        header: Header::new(
            1,
            bathron_chain::block::Hash([height.0 as u8; 32]),
            merkle_root,
            Utc.timestamp(1_600_000_005 + height.0 as i64 * 15, 0),
            CompactDifficulty(0x207f_ffff),
            0,
        ),
        producer: ProTxHash([0; 32]),
        signature: Vec::new(),
        transactions,
    }
}

fn spend(outpoint: OutPoint) -> Input {
    Input::PrevOut {
        outpoint,
        unlock_script: Script(vec![]),
        sequence: 0,
    }
}

fn output(amount: i64, script: Script) -> Output {
    Output {
        value: Amount::try_from(amount).unwrap(),
        lock_script: script,
    }
}

fn dest(n: u8) -> Script {
    Script(vec![0x76, 0xa9, n])
}

fn lock_tx(funding: OutPoint, amount: i64) -> Transaction {
    Transaction::new(
        1,
        TxType::Lock,
        vec![spend(funding)],
        vec![
            output(amount, Script::new_op_true()),
            output(amount, dest(1)),
        ],
        LockTime::unlocked(),
        Vec::new(),
    )
}

/// S1: lock, transfer to another holder, full unlock by the new holder.
#[test]
fn s1_lock_transfer_unlock() {
    bathron_test::init();

    let mut harness = Harness::testnet();
    let funding = harness.fund(10, 11 * COIN);

    // 1. Alice locks 10 COIN.
    let lock = lock_tx(funding, 10 * COIN);
    harness.connect(1, vec![lock.clone()]).unwrap();
    assert_eq!(harness.settlement.state().m0_vaulted.value(), 10 * COIN);
    assert_eq!(harness.settlement.state().m1_supply.value(), 10 * COIN);
    assert!(harness.settlement.vault(&lock.outpoint(0)).is_some());
    assert!(harness.settlement.receipt(&lock.outpoint(1)).is_some());

    // 2. Alice transfers the receipt to Bob; supply unchanged.
    let transfer = Transaction::new(
        1,
        TxType::TransferM1,
        vec![spend(lock.outpoint(1))],
        vec![output(10 * COIN, dest(2))],
        LockTime::unlocked(),
        Vec::new(),
    );
    harness.connect(2, vec![transfer.clone()]).unwrap();
    assert_eq!(harness.settlement.state().m0_vaulted.value(), 10 * COIN);
    assert_eq!(harness.settlement.state().m1_supply.value(), 10 * COIN);
    assert!(harness.settlement.receipt(&lock.outpoint(1)).is_none());
    assert!(harness.settlement.receipt(&transfer.outpoint(0)).is_some());

    // 3. Bob unlocks. The receipt carries no vault pointer: Bob finds a
    //    sufficient vault through the index.
    let vault = harness
        .settlement
        .iter_vaults()
        .find(|vault| vault.amount.value() >= 10 * COIN)
        .copied()
        .expect("the vault from step 1 is live");
    let unlock = Transaction::new(
        1,
        TxType::Unlock,
        vec![spend(transfer.outpoint(0)), spend(vault.outpoint)],
        vec![output(10 * COIN, dest(2))],
        LockTime::unlocked(),
        Vec::new(),
    );
    harness.connect(3, vec![unlock]).unwrap();

    assert_eq!(harness.settlement.state().m0_vaulted.value(), 0);
    assert_eq!(harness.settlement.state().m1_supply.value(), 0);
    assert!(harness.settlement.vault(&vault.outpoint).is_none());
    assert!(harness.settlement.receipt(&transfer.outpoint(0)).is_none());
    assert_eq!(harness.settlement.vault_count(), 0);
    assert_eq!(harness.settlement.receipt_count(), 0);
}

/// S2: partial unlock with vault change, then disconnect restores all.
#[test]
fn s2_partial_unlock_and_reorg() {
    bathron_test::init();

    let mut harness = Harness::testnet();
    let funding = harness.fund(10, 101 * COIN);
    let lock = lock_tx(funding, 100 * COIN);
    harness.connect(1, vec![lock.clone()]).unwrap();

    let unlock = Transaction::new(
        1,
        TxType::Unlock,
        vec![spend(lock.outpoint(1)), spend(lock.outpoint(0))],
        vec![
            output(30 * COIN, dest(2)),
            output(70 * COIN, dest(1)),
            output(70 * COIN, Script::new_op_true()),
        ],
        LockTime::unlocked(),
        Vec::new(),
    );
    let undo = harness.connect(2, vec![unlock.clone()]).unwrap();

    assert_eq!(harness.settlement.state().m0_vaulted.value(), 70 * COIN);
    assert_eq!(harness.settlement.state().m1_supply.value(), 70 * COIN);
    assert!(harness.settlement.vault(&unlock.outpoint(2)).is_some());
    assert!(harness.settlement.receipt(&unlock.outpoint(1)).is_some());

    // Reorg the unlock away: the original vault and receipt come back.
    disconnect_block(&undo, &mut harness.settlement, &mut harness.burns).unwrap();
    assert_eq!(harness.settlement.state().m0_vaulted.value(), 100 * COIN);
    assert!(harness.settlement.vault(&lock.outpoint(0)).is_some());
    assert!(harness.settlement.receipt(&lock.outpoint(1)).is_some());
    assert!(harness.settlement.vault(&unlock.outpoint(2)).is_none());
}

/// S3: the bearer property: a third party unlocks with no key from the
/// locker, against a vault it never owned.
#[test]
fn s3_cross_wallet_bearer_unlock() {
    bathron_test::init();

    let mut harness = Harness::testnet();
    let funding = harness.fund(10, 11 * COIN);
    let lock = lock_tx(funding, 10 * COIN);
    harness.connect(1, vec![lock.clone()]).unwrap();

    // L -> B -> C, receipt changing hands twice.
    let to_b = Transaction::new(
        1,
        TxType::TransferM1,
        vec![spend(lock.outpoint(1))],
        vec![output(10 * COIN, dest(2))],
        LockTime::unlocked(),
        Vec::new(),
    );
    let to_c = Transaction::new(
        1,
        TxType::TransferM1,
        vec![spend(to_b.outpoint(0))],
        vec![output(10 * COIN, dest(3))],
        LockTime::unlocked(),
        Vec::new(),
    );
    harness.connect(2, vec![to_b.clone()]).unwrap();
    harness.connect(3, vec![to_c.clone()]).unwrap();

    // C partially unlocks 4, keeping 6 as M1 change.
    let unlock = Transaction::new(
        1,
        TxType::Unlock,
        vec![spend(to_c.outpoint(0)), spend(lock.outpoint(0))],
        vec![
            output(4 * COIN, dest(3)),
            output(6 * COIN, dest(3)),
            output(6 * COIN, Script::new_op_true()),
        ],
        LockTime::unlocked(),
        Vec::new(),
    );
    harness.connect(4, vec![unlock]).unwrap();

    assert_eq!(harness.settlement.state().m0_vaulted.value(), 6 * COIN);
    assert_eq!(harness.settlement.state().m1_supply.value(), 6 * COIN);
}

/// S4: a NORMAL transaction trying to sweep a vault is rejected and the
/// vault survives.
#[test]
fn s4_optrue_theft_rejected() {
    bathron_test::init();

    let mut harness = Harness::testnet();
    let funding = harness.fund(10, 11 * COIN);
    let lock = lock_tx(funding, 10 * COIN);
    harness.connect(1, vec![lock.clone()]).unwrap();

    let theft = Transaction::new(
        1,
        TxType::Normal,
        vec![spend(lock.outpoint(0))],
        vec![output(10 * COIN, dest(0x66))],
        LockTime::unlocked(),
        Vec::new(),
    );
    let error = harness.connect(2, vec![theft]).unwrap_err();
    assert_eq!(error.reject_reason(), "bad-txns-optrue-forbidden");

    // The vault is still in the index, state untouched.
    assert!(harness.settlement.vault(&lock.outpoint(0)).is_some());
    assert_eq!(harness.settlement.state().m0_vaulted.value(), 10 * COIN);
    assert_eq!(harness.settlement.state().height, Height(1));
}

/// Invariant 8: a receipt created earlier in the same block cannot feed a
/// TX_LOCK, and the rejected block leaves no trace.
#[test]
fn same_block_receipt_lock_rejected() {
    bathron_test::init();

    let mut harness = Harness::testnet();
    let funding_a = harness.fund(10, 11 * COIN);
    harness.fund(11, 11 * COIN);

    let first = lock_tx(funding_a, 10 * COIN);
    // Second lock tries to use the first's fresh receipt as its M0 input.
    let second = Transaction::new(
        1,
        TxType::Lock,
        vec![spend(first.outpoint(1))],
        vec![
            output(10 * COIN, Script::new_op_true()),
            output(10 * COIN, dest(4)),
        ],
        LockTime::unlocked(),
        Vec::new(),
    );
    let error = harness.connect(1, vec![first, second]).unwrap_err();
    assert_eq!(
        error,
        BlockError::Transaction(TransactionError::LockSameBlockReceipt)
    );

    // Full rollback: nothing was committed.
    assert_eq!(harness.settlement.vault_count(), 0);
    assert_eq!(harness.settlement.receipt_count(), 0);
    assert_eq!(harness.settlement.state().m0_vaulted.value(), 0);
}

/// S5: burn claim lifecycle across both BATHRON and BTC reorgs.
#[test]
fn s5_burn_claim_lifecycle_across_reorg() {
    bathron_test::init();

    let mut harness = Harness::testnet();

    // The burn transaction confirmed on BTC at height 200_050.
    let btc_tx = btc::Transaction::parse(&BURN_TX_SEGWIT).unwrap();
    let txid = btc_tx.txid();
    let burn_header = btc::Header {
        version: 2,
        previous_block_hash: btc::BlockHash([0; 32]),
        merkle_root: txid.0,
        time: 0,
        bits: 0x207f_ffff,
        nonce: 0,
    };
    harness.source.insert_best(200_050, burn_header);
    for offset in 1..=10u32 {
        harness.source.insert_best(
            200_050 + offset,
            btc::Header {
                version: 2,
                previous_block_hash: btc::BlockHash([0; 32]),
                merkle_root: [offset as u8; 32],
                time: offset,
                bits: 0x207f_ffff,
                nonce: offset,
            },
        );
    }

    // 2. Claim in BATHRON block 100.
    let payload = BurnClaimPayload {
        version: BurnClaimPayload::VERSION,
        btc_tx_bytes: BURN_TX_SEGWIT.clone(),
        btc_block_hash: burn_header.hash(),
        btc_block_height: 200_050,
        merkle_proof: vec![],
        tx_index: 0,
    };
    let claim = Transaction::new(
        1,
        TxType::BurnClaim,
        vec![],
        vec![],
        LockTime::unlocked(),
        payload.bathron_serialize_to_vec().unwrap(),
    );
    harness.connect(100, vec![claim.clone()]).unwrap();
    let record = harness.burns.get(&txid).unwrap();
    assert_eq!(record.status, ClaimStatus::Pending);
    assert_eq!(record.claim_height, Height(100));

    // 3. Block 121 (> 100 + K_finality=20): the producer mints.
    let mint = bathron_consensus::mint::create_mint_m0btc(
        Height(121),
        &harness.burns,
        &harness.source,
        &harness.params,
        &harness.switch,
    )
    .expect("claim is eligible");
    assert_eq!(mint.outputs.len(), 1);
    assert_eq!(mint.outputs[0].value.value(), 1_000_000);
    assert_eq!(
        mint.outputs[0].lock_script,
        Script::new_p2pkh(&Hash160([0xaa; 20]))
    );
    let undo = harness.connect(121, vec![mint]).unwrap();
    assert_eq!(harness.burns.m0btc_supply(), 1_000_000);
    assert_eq!(
        harness.settlement.state().m0_total_supply.value(),
        1_000_000
    );
    assert_eq!(harness.burns.get(&txid).unwrap().status, ClaimStatus::Final);
    assert_eq!(
        harness.burns.get(&txid).unwrap().final_height,
        Height(121)
    );

    // 4. BATHRON reorg removes block 121.
    disconnect_block(&undo, &mut harness.settlement, &mut harness.burns).unwrap();
    assert_eq!(harness.burns.m0btc_supply(), 0);
    assert_eq!(harness.settlement.state().m0_total_supply.value(), 0);
    let record = harness.burns.get(&txid).unwrap();
    assert_eq!(record.status, ClaimStatus::Pending);
    assert_eq!(record.final_height, Height(0));

    // 5. BTC reorgs the burn block out while the claim is PENDING: the
    //    same txid becomes claimable again in a new BTC block.
    harness.source.truncate_best_chain(200_049);
    let new_burn_header = btc::Header {
        nonce: 777,
        ..burn_header
    };
    harness.source.insert_best(200_050, new_burn_header);
    for offset in 1..=10u32 {
        harness.source.insert_best(
            200_050 + offset,
            btc::Header {
                version: 2,
                previous_block_hash: btc::BlockHash([0; 32]),
                merkle_root: [0x80 + offset as u8; 32],
                time: offset,
                bits: 0x207f_ffff,
                nonce: 1_000 + offset,
            },
        );
    }

    let new_payload = BurnClaimPayload {
        btc_block_hash: new_burn_header.hash(),
        ..payload
    };
    let reclaim = Transaction::new(
        1,
        TxType::BurnClaim,
        vec![],
        vec![],
        LockTime::unlocked(),
        new_payload.bathron_serialize_to_vec().unwrap(),
    );
    harness.connect(122, vec![reclaim]).unwrap();

    // The record was overwritten in place, preserving the txid key.
    let record = harness.burns.get(&txid).unwrap();
    assert_eq!(record.btc_block_hash, new_burn_header.hash());
    assert_eq!(record.claim_height, Height(122));
    assert_eq!(record.status, ClaimStatus::Pending);
}

/// A duplicate claim while the first is live on the BTC best chain.
#[test]
fn duplicate_claim_rejected_while_btc_block_stands() {
    bathron_test::init();

    let mut harness = Harness::testnet();
    let btc_tx = btc::Transaction::parse(&BURN_TX_SEGWIT).unwrap();
    let txid = btc_tx.txid();
    let burn_header = btc::Header {
        version: 2,
        previous_block_hash: btc::BlockHash([0; 32]),
        merkle_root: txid.0,
        time: 0,
        bits: 0x207f_ffff,
        nonce: 0,
    };
    harness.source.insert_best(200_050, burn_header);

    let payload = BurnClaimPayload {
        version: BurnClaimPayload::VERSION,
        btc_tx_bytes: BURN_TX_SEGWIT.clone(),
        btc_block_hash: burn_header.hash(),
        btc_block_height: 200_050,
        merkle_proof: vec![],
        tx_index: 0,
    };
    let claim = |payload: &BurnClaimPayload| {
        Transaction::new(
            1,
            TxType::BurnClaim,
            vec![],
            vec![],
            LockTime::unlocked(),
            payload.bathron_serialize_to_vec().unwrap(),
        )
    };
    harness.connect(100, vec![claim(&payload)]).unwrap();

    let error = harness.connect(101, vec![claim(&payload)]).unwrap_err();
    assert_eq!(error.reject_reason(), "burn-claim-duplicate");
    assert_eq!(error.reject_code(), bathron_consensus::error::REJECT_DUPLICATE);
}
