//! Consensus-critical serialization.
//!
//! This module contains the `BathronSerialize` and `BathronDeserialize`
//! traits, analogs of the Serde `Serialize` and `Deserialize` traits but
//! intended for BATHRON's consensus byte formats (which follow Bitcoin's
//! little-endian / compact-size conventions), together with blanket impls
//! for the primitive types that consensus structures are built from.

mod deserialize;
mod error;

pub mod sha256d;

use std::convert::TryFrom;

use chrono::{DateTime, Utc};
pub use deserialize::{BathronDeserialize, BathronDeserializeInto};
pub use error::SerializationError;

use crate::compactint::CompactInt;
use byteorder::{LittleEndian, WriteBytesExt};

pub trait BathronSerialize {
    fn bathron_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error>;

    fn bathron_serialize_to_vec(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut data = Vec::new();
        self.bathron_serialize(&mut data)?;
        Ok(data)
    }
}

impl BathronSerialize for bool {
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[*self as u8])
    }
}

impl BathronSerialize for &u8 {
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[**self])
    }
}

impl BathronSerialize for u16 {
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u16::<LittleEndian>(*self)
    }
}

impl BathronSerialize for u32 {
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u32::<LittleEndian>(*self)
    }
}

impl BathronSerialize for u64 {
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u64::<LittleEndian>(*self)
    }
}

impl BathronSerialize for i32 {
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i32::<LittleEndian>(*self)
    }
}

impl BathronSerialize for i64 {
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i64::<LittleEndian>(*self)
    }
}

impl BathronSerialize for DateTime<Utc> {
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        // Truncating: u32 times are valid until 2106, and block time
        // validation rejects anything near that horizon long before.
        let time_u32 = u32::try_from(self.timestamp()).unwrap_or(std::u32::MAX);
        target.write_u32::<LittleEndian>(time_u32)
    }
}

// TODO: impl for u8 when specialization stabilizes; until then the
// specialized Vec<u8> impl below would conflict with the generic Vec<T>.

impl BathronSerialize for &[u8] {
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl BathronSerialize for [u8; 20] {
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl BathronSerialize for [u8; 32] {
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl BathronSerialize for [u8; 80] {
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl BathronSerialize for Vec<u8> {
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).bathron_serialize(&mut target)?;
        target.write_all(self)?;
        Ok(())
    }
}

impl<T> BathronSerialize for Vec<T>
where
    T: BathronSerialize,
{
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).bathron_serialize(&mut target)?;
        for item in self.iter() {
            item.bathron_serialize(&mut target)?
        }
        Ok(())
    }
}

impl<T: BathronSerialize> BathronSerialize for Option<T> {
    fn bathron_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        match self {
            Some(contents) => contents.bathron_serialize(&mut target),
            None => Ok(()),
        }
    }
}

impl<T> BathronSerialize for std::sync::Arc<T>
where
    T: BathronSerialize,
{
    fn bathron_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        T::bathron_serialize(self, writer)
    }
}
