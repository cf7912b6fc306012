use std::convert::TryFrom;

use proptest::prelude::*;

use super::*;

use crate::amount::Amount;
use crate::serialization::{BathronDeserialize, BathronDeserializeInto, BathronSerialize};
use crate::transparent::{self, OutPoint, Script};

fn sample_tx(tx_type: TxType, extra_payload: Vec<u8>) -> Transaction {
    Transaction::new(
        1,
        tx_type,
        vec![transparent::Input::PrevOut {
            outpoint: OutPoint {
                hash: Hash([3u8; 32]),
                index: 0,
            },
            unlock_script: Script(vec![0xab]),
            sequence: 0xffff_ffff,
        }],
        vec![transparent::Output {
            value: Amount::try_from(5_000i64).unwrap(),
            lock_script: Script::new_op_true(),
        }],
        LockTime::unlocked(),
        extra_payload,
    )
}

#[test]
fn transaction_roundtrip() {
    bathron_test::init();

    let tx = sample_tx(TxType::Lock, Vec::new());
    let data = tx.bathron_serialize_to_vec().expect("tx should serialize");
    let tx2: Transaction = data
        .as_slice()
        .bathron_deserialize_into()
        .expect("tx should deserialize");
    assert_eq!(tx, tx2);
}

#[test]
fn type_tag_commits_to_hash() {
    bathron_test::init();

    // Same structure, different tag: different txid.
    let lock = sample_tx(TxType::Lock, Vec::new());
    let unlock = sample_tx(TxType::Unlock, Vec::new());
    assert_ne!(lock.hash(), unlock.hash());
}

#[test]
fn payload_commits_to_hash() {
    bathron_test::init();

    let a = sample_tx(TxType::BurnClaim, vec![1, 2, 3]);
    let b = sample_tx(TxType::BurnClaim, vec![1, 2, 4]);
    assert_ne!(a.hash(), b.hash());
}

#[test]
fn stray_payload_rejected() {
    bathron_test::init();

    let tx = sample_tx(TxType::Normal, vec![0xff]);
    let data = tx.bathron_serialize_to_vec().unwrap();
    assert!(Transaction::bathron_deserialize(&data[..]).is_err());
}

proptest! {
    #[test]
    fn transaction_hash_display_fromstr_roundtrip(hash in any::<Hash>()) {
        bathron_test::init();

        let display = format!("{}", hash);
        let parsed = display.parse::<Hash>().expect("hash should parse");
        prop_assert_eq!(hash, parsed);
    }
}
