//! Block difficulty data structures and calculations.
//!
//! The block difficulty "target threshold" is stored in the compact nBits
//! format; hashes are compared to targets as 256-bit little-endian integers.

use std::{cmp, fmt};

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::serialization::{BathronDeserialize, BathronSerialize, SerializationError};
use crate::{block, parameters::Network};

/// A difficulty threshold in the compact nBits floating-point format.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CompactDifficulty(pub u32);

impl fmt::Debug for CompactDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("CompactDifficulty")
            .field(&format_args!("{:#010x}", self.0))
            .finish()
    }
}

/// A 256-bit expanded difficulty target.
///
/// Greater values represent *less* work.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct ExpandedDifficulty(U256);

/// The work of a single block: floor(2^256 / (target + 1)).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct Work(pub u128);

/// Accumulated work along a chain, used by the chainwork tie-break of fork
/// choice.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PartialCumulativeWork(u128);

impl CompactDifficulty {
    /// The exponent offset in the nBits encoding.
    const OFFSET: i32 = 3;
    /// The sign bit of the nBits mantissa; negative thresholds are invalid.
    const SIGN_BIT: u32 = 0x0080_0000;

    /// Expand this compact value into a 256-bit target.
    ///
    /// Returns `None` for zero, negative, and overflowing encodings, which
    /// are all invalid in headers.
    pub fn to_expanded(self) -> Option<ExpandedDifficulty> {
        let exponent = (self.0 >> 24) as i32;
        let mantissa = self.0 & 0x007f_ffff;

        if mantissa == 0 || self.0 & Self::SIGN_BIT != 0 {
            return None;
        }

        let result = if exponent <= Self::OFFSET {
            // Shift right: the mantissa's low bytes are dropped.
            U256::from(mantissa >> (8 * (Self::OFFSET - exponent)))
        } else {
            let shift = 8 * (exponent - Self::OFFSET) as usize;
            if shift > 255 {
                return None;
            }
            let value = U256::from(mantissa) << shift;
            // Reject encodings whose shift lost high bits.
            if value >> shift != U256::from(mantissa) {
                return None;
            }
            value
        };

        if result.is_zero() {
            None
        } else {
            Some(ExpandedDifficulty(result))
        }
    }
}

impl ExpandedDifficulty {
    /// The easiest target this network accepts (the "PoW limit").
    pub fn target_difficulty_limit(network: Network) -> ExpandedDifficulty {
        let limit = match network {
            // 0x1d00ffff, the Bitcoin mainnet limit.
            Network::Mainnet => U256::from(0xffffu64) << (8 * (0x1d - 3)),
            // 0x207fffff, the permissive limit used off-mainnet.
            Network::Testnet | Network::Regtest => U256::from(0x7f_ffffu64) << (8 * (0x20 - 3)),
        };
        ExpandedDifficulty(limit)
    }

    /// The work represented by meeting this target.
    ///
    /// Returns `None` when the work would not fit 128 bits; targets at or
    /// above the network limit always fit.
    pub fn to_work(self) -> Option<Work> {
        let target = self.0;
        // work = floor(2^256 / (target + 1)), computed without 2^256:
        // (!target) / (target + 1) + 1
        let work = (!target) / (target.checked_add(U256::one())?) + U256::one();
        if work.bits() > 128 {
            return None;
        }
        Some(Work(work.low_u128()))
    }
}

impl fmt::Debug for ExpandedDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        f.debug_tuple("ExpandedDifficulty")
            .field(&hex::encode(bytes))
            .finish()
    }
}

impl cmp::PartialEq<ExpandedDifficulty> for block::Hash {
    fn eq(&self, other: &ExpandedDifficulty) -> bool {
        U256::from_little_endian(&self.0) == other.0
    }
}

impl cmp::PartialOrd<ExpandedDifficulty> for block::Hash {
    /// Compare a block hash to a target, both as 256-bit little-endian
    /// integers (the Bitcoin hash-as-number convention).
    fn partial_cmp(&self, other: &ExpandedDifficulty) -> Option<cmp::Ordering> {
        U256::from_little_endian(&self.0).partial_cmp(&other.0)
    }
}

impl std::ops::Add<Work> for PartialCumulativeWork {
    type Output = PartialCumulativeWork;

    fn add(self, rhs: Work) -> Self::Output {
        // Saturating: cumulative work is a comparison key, and a chain that
        // saturates u128 has long since won every tie-break.
        PartialCumulativeWork(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign<Work> for PartialCumulativeWork {
    fn add_assign(&mut self, rhs: Work) {
        *self = *self + rhs;
    }
}

impl BathronSerialize for CompactDifficulty {
    fn bathron_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        self.0.bathron_serialize(writer)
    }
}

impl BathronDeserialize for CompactDifficulty {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(CompactDifficulty(u32::bathron_deserialize(&mut reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_bitcoin_limit() {
        let limit = CompactDifficulty(0x1d00_ffff).to_expanded().unwrap();
        assert_eq!(
            limit,
            ExpandedDifficulty::target_difficulty_limit(Network::Mainnet)
        );
    }

    #[test]
    fn invalid_encodings_do_not_expand() {
        // Zero mantissa and negative mantissa are both invalid.
        assert!(CompactDifficulty(0x0000_0000).to_expanded().is_none());
        assert!(CompactDifficulty(0x1d80_0000).to_expanded().is_none());
    }

    #[test]
    fn work_is_monotonic_in_difficulty() {
        let easy = CompactDifficulty(0x207f_ffff)
            .to_expanded()
            .unwrap()
            .to_work()
            .unwrap();
        let hard = CompactDifficulty(0x1d00_ffff)
            .to_expanded()
            .unwrap()
            .to_work()
            .unwrap();
        assert!(hard > easy);
    }

    #[test]
    fn cumulative_work_accumulates() {
        let mut total = PartialCumulativeWork::default();
        total += Work(10);
        total += Work(5);
        assert_eq!(total, PartialCumulativeWork::default() + Work(15));
    }
}
