use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::block;
use crate::serialization::{BathronDeserialize, BathronSerialize, SerializationError};

/// The locktime threshold below which the raw value is a block height.
const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// A transaction locktime: a block height or a unix time, split at
/// 500_000_000 per the Bitcoin convention.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LockTime {
    Height(block::Height),
    Time(DateTime<Utc>),
}

impl LockTime {
    /// The unlocked locktime: height zero.
    pub fn unlocked() -> LockTime {
        LockTime::Height(block::Height(0))
    }
}

impl BathronSerialize for LockTime {
    fn bathron_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        match self {
            LockTime::Height(height) => height.0.bathron_serialize(writer),
            LockTime::Time(time) => time.bathron_serialize(writer),
        }
    }
}

impl BathronDeserialize for LockTime {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let raw = u32::bathron_deserialize(&mut reader)?;
        if raw < LOCKTIME_THRESHOLD {
            Ok(LockTime::Height(block::Height(raw)))
        } else {
            Ok(LockTime::Time(Utc.timestamp(raw as i64, 0)))
        }
    }
}
