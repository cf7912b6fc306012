//! Gossip-accumulated finality signatures.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use secp256k1::{Message, PublicKey, Secp256k1, Signature, VerifyOnly};
use tokio::sync::broadcast;

use bathron_chain::{block, masternode::MasternodeEntry};

static SECP: Lazy<Secp256k1<VerifyOnly>> = Lazy::new(Secp256k1::verification_only);

/// One masternode's finality vote for one block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FinalitySignature {
    pub block_hash: block::Hash,
    pub signer: PublicKey,
    /// DER-encoded ECDSA signature over `block_hash`.
    pub signature: Vec<u8>,
}

/// What happened to one submitted signature.
///
/// Rejections here are benign: gossip may race block delivery, carry
/// rotated-out signers, or duplicate earlier votes. None of them is peer
/// misbehavior worth acting on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddOutcome {
    /// Counted; the block is not yet at threshold.
    Added,
    /// Counted, and this signature crossed the threshold.
    Finalized,
    /// Already finalized, or the signer already voted.
    Duplicate,
    /// The signer is not in the quorum for this height.
    NotInQuorum,
    /// The ECDSA signature does not verify.
    BadSignature,
}

/// The per-block signature sets, behind their own short-lived lock so
/// signature arrival never contends with block validation.
pub struct SignatureTracker {
    threshold: usize,
    signers_by_block: Mutex<HashMap<block::Hash, BTreeSet<[u8; 33]>>>,
    finalized_tx: broadcast::Sender<block::Hash>,
}

impl SignatureTracker {
    /// A tracker declaring finality at `threshold` distinct valid signers.
    pub fn new(threshold: usize) -> SignatureTracker {
        let (finalized_tx, _) = broadcast::channel(64);
        SignatureTracker {
            threshold,
            signers_by_block: Mutex::new(HashMap::new()),
            finalized_tx,
        }
    }

    /// Subscribe to finalization events.
    pub fn subscribe(&self) -> broadcast::Receiver<block::Hash> {
        self.finalized_tx.subscribe()
    }

    /// Submit one signature against the quorum for its block's height.
    ///
    /// Idempotent per signer; the threshold fires exactly once.
    pub fn add_signature(
        &self,
        signature: &FinalitySignature,
        quorum: &[MasternodeEntry],
    ) -> AddOutcome {
        if !quorum
            .iter()
            .any(|entry| entry.operator_key == signature.signer)
        {
            tracing::trace!(block = %signature.block_hash, "finality vote from outside the quorum");
            return AddOutcome::NotInQuorum;
        }

        let message =
            Message::from_slice(&signature.block_hash.0).expect("block hashes are 32 bytes");
        let parsed = match Signature::from_der(&signature.signature) {
            Ok(parsed) => parsed,
            Err(_) => return AddOutcome::BadSignature,
        };
        if SECP.verify(&message, &parsed, &signature.signer).is_err() {
            return AddOutcome::BadSignature;
        }

        let mut by_block = self
            .signers_by_block
            .lock()
            .expect("finality tracker lock is never poisoned");
        let signers = by_block.entry(signature.block_hash).or_default();

        let was_finalized = signers.len() >= self.threshold;
        if !signers.insert(signature.signer.serialize()) {
            return AddOutcome::Duplicate;
        }
        if was_finalized {
            return AddOutcome::Duplicate;
        }

        if signers.len() >= self.threshold {
            tracing::info!(block = %signature.block_hash, signers = signers.len(), "block finalized");
            metrics::counter!("finality.blocks.finalized", 1);
            // Nobody listening is fine; finality is still recorded.
            let _ = self.finalized_tx.send(signature.block_hash);
            AddOutcome::Finalized
        } else {
            AddOutcome::Added
        }
    }

    /// Distinct valid signers seen for `block_hash`.
    pub fn signer_count(&self, block_hash: &block::Hash) -> usize {
        self.signers_by_block
            .lock()
            .expect("finality tracker lock is never poisoned")
            .get(block_hash)
            .map(|signers| signers.len())
            .unwrap_or(0)
    }

    /// Has `block_hash` reached the threshold?
    pub fn is_finalized(&self, block_hash: &block::Hash) -> bool {
        self.signer_count(block_hash) >= self.threshold
    }

    /// Drop signature sets for blocks at or below a pruned height, keyed
    /// by an externally supplied predicate (the tracker itself does not
    /// know heights).
    pub fn retain<F: FnMut(&block::Hash) -> bool>(&self, mut keep: F) {
        self.signers_by_block
            .lock()
            .expect("finality tracker lock is never poisoned")
            .retain(|hash, _| keep(hash));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dmm::{sign_block_hash, tests::masternode};

    fn vote(n: u8, hash: block::Hash) -> FinalitySignature {
        let (secret, entry) = masternode(n);
        FinalitySignature {
            block_hash: hash,
            signer: entry.operator_key,
            signature: sign_block_hash(&secret, &hash),
        }
    }

    fn quorum(count: u8) -> Vec<MasternodeEntry> {
        (1..=count).map(|n| masternode(n).1).collect()
    }

    #[test]
    fn threshold_fires_exactly_once() {
        bathron_test::init();

        let tracker = SignatureTracker::new(2);
        let quorum = quorum(3);
        let hash = block::Hash([0x11; 32]);
        let mut finalized = tracker.subscribe();

        assert_eq!(tracker.add_signature(&vote(1, hash), &quorum), AddOutcome::Added);
        assert!(!tracker.is_finalized(&hash));

        assert_eq!(
            tracker.add_signature(&vote(2, hash), &quorum),
            AddOutcome::Finalized
        );
        assert!(tracker.is_finalized(&hash));
        assert_eq!(finalized.try_recv().unwrap(), hash);

        // A third signature afterwards does not re-fire.
        assert_eq!(tracker.add_signature(&vote(3, hash), &quorum), AddOutcome::Duplicate);
        assert!(finalized.try_recv().is_err());
    }

    #[test]
    fn duplicates_are_idempotent() {
        bathron_test::init();

        let tracker = SignatureTracker::new(3);
        let quorum = quorum(3);
        let hash = block::Hash([0x22; 32]);

        assert_eq!(tracker.add_signature(&vote(1, hash), &quorum), AddOutcome::Added);
        assert_eq!(
            tracker.add_signature(&vote(1, hash), &quorum),
            AddOutcome::Duplicate
        );
        assert_eq!(tracker.signer_count(&hash), 1);
    }

    #[test]
    fn non_quorum_and_bad_signatures_dropped() {
        bathron_test::init();

        let tracker = SignatureTracker::new(2);
        let quorum = quorum(2);
        let hash = block::Hash([0x33; 32]);

        // Signer 5 exists but is not in this quorum.
        assert_eq!(
            tracker.add_signature(&vote(5, hash), &quorum),
            AddOutcome::NotInQuorum
        );

        // A quorum member signing the wrong hash.
        let mut wrong = vote(1, block::Hash([0x44; 32]));
        wrong.block_hash = hash;
        assert_eq!(
            tracker.add_signature(&wrong, &quorum),
            AddOutcome::BadSignature
        );
        assert_eq!(tracker.signer_count(&hash), 0);
    }

    #[test]
    fn signatures_before_block_are_benign() {
        bathron_test::init();

        // Gossip may deliver votes for blocks this node has not seen;
        // they accumulate keyed by hash and simply wait.
        let tracker = SignatureTracker::new(2);
        let quorum = quorum(2);
        let unknown = block::Hash([0x55; 32]);
        assert_eq!(
            tracker.add_signature(&vote(1, unknown), &quorum),
            AddOutcome::Added
        );
        assert_eq!(tracker.signer_count(&unknown), 1);
    }
}
