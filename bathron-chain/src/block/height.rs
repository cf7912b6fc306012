use serde::{Deserialize, Serialize};

use crate::serialization::{BathronDeserialize, BathronSerialize, SerializationError};

/// The height of a block is the length of the chain back to the genesis
/// block.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Height(pub u32);

impl Height {
    /// The minimum (genesis) height.
    pub const MIN: Height = Height(0);

    /// The maximum representable height, kept below the locktime
    /// height/time split.
    pub const MAX: Height = Height(499_999_999);

    /// The next block's height, saturating at [`Height::MAX`].
    pub fn next(self) -> Height {
        Height(std::cmp::min(self.0.saturating_add(1), Height::MAX.0))
    }
}

impl BathronSerialize for Height {
    fn bathron_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        self.0.bathron_serialize(writer)
    }
}

impl BathronDeserialize for Height {
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let height = u32::bathron_deserialize(&mut reader)?;
        if height > Height::MAX.0 {
            return Err(SerializationError::Parse("height above maximum"));
        }
        Ok(Height(height))
    }
}
