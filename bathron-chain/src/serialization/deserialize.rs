use super::CompactInt;
use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, TimeZone, Utc};
use std::io;

use super::SerializationError;

type Result<R> = std::result::Result<R, SerializationError>;

pub trait BathronDeserialize {
    fn bathron_deserialize<R: io::Read>(reader: R) -> Result<Self>
    where
        Self: Sized;
}

/// Helper for deserializing more succinctly via type inference
pub trait BathronDeserializeInto {
    /// Deserialize based on type inference
    fn bathron_deserialize_into<T>(self) -> Result<T>
    where
        T: BathronDeserialize;
}

impl<R: io::Read> BathronDeserializeInto for R {
    fn bathron_deserialize_into<T>(self) -> Result<T>
    where
        T: BathronDeserialize,
    {
        T::bathron_deserialize(self)
    }
}

impl BathronDeserialize for bool {
    fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<bool> {
        let value = reader.read_u8()?;
        match value {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SerializationError::Parse("Invalid bool")),
        }
    }
}

impl BathronDeserialize for u8 {
    fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<u8> {
        Ok(reader.read_u8()?)
    }
}

impl BathronDeserialize for u16 {
    fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<u16> {
        Ok(reader.read_u16::<LittleEndian>()?)
    }
}

impl BathronDeserialize for u32 {
    fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<u32> {
        Ok(reader.read_u32::<LittleEndian>()?)
    }
}

impl BathronDeserialize for u64 {
    fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<u64> {
        Ok(reader.read_u64::<LittleEndian>()?)
    }
}

impl BathronDeserialize for i32 {
    fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<i32> {
        Ok(reader.read_i32::<LittleEndian>()?)
    }
}

impl BathronDeserialize for i64 {
    fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<i64> {
        Ok(reader.read_i64::<LittleEndian>()?)
    }
}

impl BathronDeserialize for DateTime<Utc> {
    fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<DateTime<Utc>> {
        Ok(Utc.timestamp(reader.read_u32::<LittleEndian>()? as i64, 0))
    }
}

impl<T> BathronDeserialize for Vec<T>
where
    T: BathronDeserialize,
{
    fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<Vec<T>> {
        let len = CompactInt::bathron_deserialize(&mut reader)?.value() as usize;
        // Limit preallocation to about 1000 items since blind preallocation
        // is a DOS vulnerability.
        let blind_alloc_limit = 1024;
        let mut result: Vec<T> = Vec::with_capacity(std::cmp::min(len, blind_alloc_limit));
        for _ in 0..len {
            result.push(T::bathron_deserialize(&mut reader)?);
        }
        Ok(result)
    }
}

impl<T: Sized + BathronDeserialize> BathronDeserialize for Option<T> {
    fn bathron_deserialize<R: io::Read>(reader: R) -> Result<Option<T>> {
        Ok(Some(T::bathron_deserialize(reader)?))
    }
}

impl<T> BathronDeserialize for std::sync::Arc<T>
where
    T: BathronDeserialize,
{
    fn bathron_deserialize<R: io::Read>(reader: R) -> Result<Self> {
        Ok(std::sync::Arc::new(T::bathron_deserialize(reader)?))
    }
}

// TODO: Replace when const generics stabilize
macro_rules! impl_deserializable_byte_array {
    ($size:expr) => {
        impl BathronDeserialize for [u8; $size] {
            fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<[u8; $size]> {
                let mut result = [0u8; $size];
                reader.read_exact(&mut result)?;
                Ok(result)
            }
        }
    };
}

impl_deserializable_byte_array!(20);
impl_deserializable_byte_array!(32);
impl_deserializable_byte_array!(80);
