//! ECDSA finality: quorum rotation, signature aggregation, and the
//! finality-first fork choice.
//!
//! Signatures arrive out of order over gossip, possibly before their block.
//! The tracker therefore lives behind its own short-lived lock, decoupled
//! from block validation throughput, and treats unverifiable submissions as
//! benign noise rather than errors.

pub mod tracker;

pub use tracker::{AddOutcome, FinalitySignature, SignatureTracker};

use std::cmp::Ordering;

use bathron_chain::{
    block::Height,
    masternode::MasternodeEntry,
    parameters::NetworkParameters,
    work::difficulty::PartialCumulativeWork,
};

/// The quorum for a block height: a rotating window over the ordered
/// active-masternode snapshot.
///
/// `cycle = height / rotation_blocks`; the window of `quorum_size` entries
/// starts at `(cycle * quorum_size) % len` and wraps. Pure: identical
/// snapshots and heights give identical quorums on every node.
pub fn quorum_at_height(
    active: &[MasternodeEntry],
    height: Height,
    params: &NetworkParameters,
) -> Vec<MasternodeEntry> {
    if active.is_empty() {
        return Vec::new();
    }
    let cycle = (height.0 / params.rotation_blocks) as usize;
    let len = active.len();
    let start = (cycle * params.quorum_size) % len;
    (0..params.quorum_size.min(len))
        .map(|offset| active[(start + offset) % len])
        .collect()
}

/// The fork-choice key of a chain tip.
///
/// Comparison is lexicographic over (finalized, finalized height, work):
/// a finalized tip beats any unfinalized tip regardless of work, deeper
/// finality beats shallower, and work only breaks the remaining ties.
/// This is deliberately not a scalar score: no weighting of work can
/// reproduce the first rule.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TipCandidate {
    pub finalized: bool,
    pub finalized_height: Height,
    pub work: PartialCumulativeWork,
}

impl TipCandidate {
    /// A tip with no finalized block, ranked by work alone.
    pub fn unfinalized(work: PartialCumulativeWork) -> TipCandidate {
        TipCandidate {
            finalized: false,
            finalized_height: Height(0),
            work,
        }
    }

    pub fn finalized_at(height: Height, work: PartialCumulativeWork) -> TipCandidate {
        TipCandidate {
            finalized: true,
            finalized_height: height,
            work,
        }
    }
}

impl Ord for TipCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.finalized, self.finalized_height, self.work).cmp(&(
            other.finalized,
            other.finalized_height,
            other.work,
        ))
    }
}

impl PartialOrd for TipCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// May a reorganization to a fork rooted at `fork_height` proceed?
///
/// Unwinding a finalized block is forbidden: the fork point must sit at or
/// above the last finalized height. During the bootstrap phase no block is
/// finalized, so every reorg passes through to the work rule.
pub fn reorg_allowed(fork_height: Height, last_finalized: Option<Height>) -> bool {
    match last_finalized {
        Some(finalized) => fork_height >= finalized,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dmm::tests::active_set;
    use bathron_chain::parameters::Network;
    use bathron_chain::work::difficulty::Work;

    fn params() -> NetworkParameters {
        NetworkParameters::for_network(Network::Testnet)
    }

    #[test]
    fn quorum_is_pure_and_rotates() {
        bathron_test::init();

        let active = active_set(7);
        let params = params();

        let first = quorum_at_height(&active, Height(100), &params);
        let again = quorum_at_height(&active, Height(100), &params);
        assert_eq!(first.len(), params.quorum_size);
        assert_eq!(
            first.iter().map(|e| e.pro_tx_hash).collect::<Vec<_>>(),
            again.iter().map(|e| e.pro_tx_hash).collect::<Vec<_>>()
        );

        // Heights in the same cycle share a quorum; the next cycle shifts
        // the window.
        let same_cycle = quorum_at_height(&active, Height(105), &params);
        assert_eq!(
            first.iter().map(|e| e.pro_tx_hash).collect::<Vec<_>>(),
            same_cycle.iter().map(|e| e.pro_tx_hash).collect::<Vec<_>>()
        );
        let next_cycle = quorum_at_height(&active, Height(110), &params);
        assert_ne!(
            first.iter().map(|e| e.pro_tx_hash).collect::<Vec<_>>(),
            next_cycle.iter().map(|e| e.pro_tx_hash).collect::<Vec<_>>()
        );
    }

    #[test]
    fn finality_beats_work() {
        bathron_test::init();

        // S6: tip A finalized with less work, tip B heavier but
        // unfinalized.
        let a = TipCandidate::finalized_at(
            Height(500),
            PartialCumulativeWork::default() + Work(100),
        );
        let b = TipCandidate::unfinalized(PartialCumulativeWork::default() + Work(1_000_000));
        assert!(a > b);
    }

    #[test]
    fn deeper_finality_wins_then_work() {
        bathron_test::init();

        let shallow = TipCandidate::finalized_at(
            Height(400),
            PartialCumulativeWork::default() + Work(1_000_000),
        );
        let deep =
            TipCandidate::finalized_at(Height(500), PartialCumulativeWork::default() + Work(100));
        assert!(deep > shallow);

        let light =
            TipCandidate::finalized_at(Height(500), PartialCumulativeWork::default() + Work(100));
        let heavy =
            TipCandidate::finalized_at(Height(500), PartialCumulativeWork::default() + Work(200));
        assert!(heavy > light);
    }

    #[test]
    fn finalized_blocks_never_unwind() {
        bathron_test::init();

        assert!(reorg_allowed(Height(10), None));
        assert!(reorg_allowed(Height(500), Some(Height(500))));
        assert!(!reorg_allowed(Height(499), Some(Height(500))));
    }
}
