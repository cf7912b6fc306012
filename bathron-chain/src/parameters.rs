//! Consensus parameters.

mod network;

pub use network::Network;

use crate::block;

/// The previous block hash of the genesis block: all zeroes.
pub const GENESIS_PREVIOUS_BLOCK_HASH: block::Hash = block::Hash([0u8; 32]);

/// The minimum burn a mint output may carry, in satoshis.
pub const MIN_BURN_SATS: u64 = 1_000;

/// The maximum number of burn claims finalized by one mint transaction.
pub const MAX_MINT_CLAIMS_PER_BLOCK: usize = 100;

/// The maximum number of `TX_BURN_CLAIM` transactions in one block.
pub const MAX_BURN_CLAIMS_PER_BLOCK: usize = 50;

/// The maximum number of siblings in a burn claim's merkle proof.
pub const MAX_MERKLE_PROOF_DEPTH: usize = 40;

/// The consensus ceiling on an embedded BTC transaction, in bytes.
pub const MAX_BTC_TX_CONSENSUS_BYTES: usize = 10_000;

/// The sanity ceiling applied before any parsing of an embedded BTC
/// transaction, in bytes.
pub const MAX_BTC_TX_SANITY_BYTES: usize = 200_000;

/// The maximum number of outputs in an embedded BTC transaction.
pub const MAX_BTC_TX_OUTPUTS: usize = 100;

/// The maximum number of 80-byte headers in one `TX_BTC_HEADERS` payload.
pub const BTCHEADERS_GENESIS_MAX_COUNT: usize = 2_000;

/// The hard bound on block timestamps relative to local wall clock, in
/// seconds.
pub const MAX_FUTURE_BLOCK_TIME_SECS: i64 = 120;

/// Per-network consensus constants.
///
/// Every value here is part of consensus: two nodes with different
/// parameters are on different networks.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NetworkParameters {
    /// BATHRON blocks between a PENDING claim and mint eligibility.
    pub k_finality: u32,
    /// Bitcoin confirmations required before a burn may finalize.
    pub k_confirmations: u32,
    /// Number of masternodes in a finality quorum.
    pub quorum_size: usize,
    /// Distinct valid signers required for finality: ceil(2 * quorum / 3).
    pub finality_threshold: usize,
    /// Blocks per quorum rotation cycle.
    pub rotation_blocks: u32,
    /// Heights at or below this skip producer-slot election and finality.
    pub dmm_bootstrap_height: block::Height,
    /// Seconds the slot-0 leader has before fallback producers may step in.
    pub leader_timeout_secs: i64,
    /// Seconds per fallback producer slot after the leader timeout.
    pub fallback_recovery_secs: i64,
    /// Block timestamps must round to this slot width, in seconds.
    pub block_time_slot_secs: i64,
}

impl NetworkParameters {
    pub fn for_network(network: Network) -> NetworkParameters {
        match network {
            Network::Mainnet => NetworkParameters {
                k_finality: 100,
                k_confirmations: 24,
                quorum_size: 12,
                finality_threshold: 8,
                rotation_blocks: 20,
                dmm_bootstrap_height: block::Height(250),
                leader_timeout_secs: 45,
                fallback_recovery_secs: 15,
                block_time_slot_secs: 15,
            },
            Network::Testnet => NetworkParameters {
                k_finality: 20,
                k_confirmations: 6,
                quorum_size: 3,
                finality_threshold: 2,
                rotation_blocks: 10,
                dmm_bootstrap_height: block::Height(50),
                leader_timeout_secs: 45,
                fallback_recovery_secs: 15,
                block_time_slot_secs: 15,
            },
            Network::Regtest => NetworkParameters {
                k_finality: 2,
                k_confirmations: 1,
                quorum_size: 1,
                finality_threshold: 1,
                rotation_blocks: 2,
                dmm_bootstrap_height: block::Height(10),
                leader_timeout_secs: 45,
                fallback_recovery_secs: 2,
                block_time_slot_secs: 15,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_two_thirds_ceil() {
        for network in &[Network::Mainnet, Network::Testnet, Network::Regtest] {
            let params = NetworkParameters::for_network(*network);
            let expected = (2 * params.quorum_size + 2) / 3;
            assert_eq!(params.finality_threshold, expected, "{:?}", network);
        }
    }
}
