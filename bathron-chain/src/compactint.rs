use crate::{BathronDeserialize, BathronSerialize, SerializationError};
use byteorder::{LittleEndian, WriteBytesExt};

/// The Bitcoin-inherited variable-length integer ("compact size").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactInt(u64);

impl CompactInt {
    pub fn new() -> CompactInt {
        CompactInt(0)
    }

    pub fn from(value: usize) -> CompactInt {
        CompactInt(value as u64)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Serialized length (in bytes) of a compact int holding `value`.
    pub fn size(value: usize) -> usize {
        if value < 253 {
            1
        } else if value <= std::u16::MAX as usize {
            3
        } else if value <= std::u32::MAX as usize {
            5
        } else {
            9
        }
    }
}

impl BathronSerialize for CompactInt {
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        if self.value() < 253 {
            target.write_all(&[self.value() as u8])
        } else if self.value() <= std::u16::MAX as u64 {
            target.write_all(&[253])?;
            target.write_u16::<LittleEndian>(self.value() as u16)
        } else if self.value() <= std::u32::MAX as u64 {
            target.write_all(&[254])?;
            target.write_u32::<LittleEndian>(self.value() as u32)
        } else {
            target.write_all(&[255])?;
            target.write_u64::<LittleEndian>(self.value())
        }
    }
}

impl BathronDeserialize for CompactInt {
    fn bathron_deserialize<R: std::io::Read>(
        mut target: R,
    ) -> Result<CompactInt, SerializationError> {
        let first = u8::bathron_deserialize(&mut target)?;
        if first < 253 {
            Ok(CompactInt::from(first as usize))
        } else if first == 253 {
            Ok(CompactInt::from(
                u16::bathron_deserialize(&mut target)? as usize
            ))
        } else if first == 254 {
            Ok(CompactInt::from(
                u32::bathron_deserialize(&mut target)? as usize
            ))
        } else {
            Ok(CompactInt(u64::bathron_deserialize(&mut target)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_widths() {
        for (value, expected_len) in &[
            (0usize, 1usize),
            (252, 1),
            (253, 3),
            (65_535, 3),
            (65_536, 5),
            (4_294_967_295, 5),
        ] {
            let bytes = CompactInt::from(*value).bathron_serialize_to_vec().unwrap();
            assert_eq!(bytes.len(), *expected_len, "width for {}", value);
            assert_eq!(CompactInt::size(*value), *expected_len);
            let round = CompactInt::bathron_deserialize(&bytes[..]).unwrap();
            assert_eq!(round.value(), *value as u64);
        }
    }
}
