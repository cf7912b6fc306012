//! Strongly-typed satoshi amounts.
//!
//! All consensus arithmetic on amounts goes through a 128-bit intermediate
//! and fails closed on any result outside the money range. No floating point
//! exists anywhere in this module or its consumers.

use std::{
    cmp::Ordering,
    convert::TryFrom,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    ops::RangeInclusive,
};

use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};

use crate::{BathronDeserialize, BathronSerialize, SerializationError};

/// One coin, in satoshis.
pub const COIN: i64 = 100_000_000;

/// The monetary cap, in satoshis.
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// An amount of satoshis, parameterized by its constraint.
///
/// The constraint is checked on construction and on every arithmetic result,
/// so a held `Amount` is always in range.
#[derive(Serialize, Deserialize)]
#[serde(try_from = "i64")]
#[serde(into = "i64")]
#[serde(bound = "C: Constraint + Clone")]
pub struct Amount<C = NegativeAllowed>(i64, PhantomData<C>);

impl<C> Amount<C>
where
    C: Constraint,
{
    /// The zero amount, valid under every constraint.
    pub fn zero() -> Self {
        Amount(0, PhantomData)
    }

    /// The raw satoshi value.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Re-check this amount under another constraint.
    pub fn constrain<C2: Constraint>(self) -> Result<Amount<C2>, AmountError> {
        Amount::<C2>::try_from(self.0)
    }
}

impl<C> Clone for Amount<C> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<C> Copy for Amount<C> {}

impl<C> PartialEq for Amount<C> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl<C> Eq for Amount<C> {}

impl<C> PartialOrd for Amount<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<C> Ord for Amount<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}
impl<C> Hash for Amount<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl<C> fmt::Debug for Amount<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Amount").field(&self.0).finish()
    }
}

impl<C> fmt::Display for Amount<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<C> From<Amount<C>> for i64 {
    fn from(amount: Amount<C>) -> i64 {
        amount.0
    }
}

impl From<Amount<NonNegative>> for Amount<NegativeAllowed> {
    fn from(amount: Amount<NonNegative>) -> Self {
        // NonNegative is a strict subrange of NegativeAllowed.
        Amount(amount.0, PhantomData)
    }
}

impl<C> TryFrom<i64> for Amount<C>
where
    C: Constraint,
{
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if C::valid_range().contains(&value) {
            Ok(Amount(value, PhantomData))
        } else {
            Err(AmountError {
                value: value as i128,
                constraint: C::NAME,
            })
        }
    }
}

impl<C> TryFrom<i128> for Amount<C>
where
    C: Constraint,
{
    type Error = AmountError;

    fn try_from(value: i128) -> Result<Self, Self::Error> {
        let as_i64 = i64::try_from(value).map_err(|_| AmountError {
            value,
            constraint: C::NAME,
        })?;
        Amount::try_from(as_i64)
    }
}

impl<C> std::ops::Add<Amount<C>> for Amount<C>
where
    C: Constraint,
{
    type Output = Result<Amount<C>, AmountError>;

    fn add(self, rhs: Amount<C>) -> Self::Output {
        Amount::try_from(self.0 as i128 + rhs.0 as i128)
    }
}

impl<C> std::ops::Add<Amount<C>> for Result<Amount<C>, AmountError>
where
    C: Constraint,
{
    type Output = Result<Amount<C>, AmountError>;

    fn add(self, rhs: Amount<C>) -> Self::Output {
        self? + rhs
    }
}

impl<C> std::ops::Sub<Amount<C>> for Amount<C>
where
    C: Constraint,
{
    type Output = Result<Amount<C>, AmountError>;

    fn sub(self, rhs: Amount<C>) -> Self::Output {
        Amount::try_from(self.0 as i128 - rhs.0 as i128)
    }
}

impl<C> std::ops::Sub<Amount<C>> for Result<Amount<C>, AmountError>
where
    C: Constraint,
{
    type Output = Result<Amount<C>, AmountError>;

    fn sub(self, rhs: Amount<C>) -> Self::Output {
        self? - rhs
    }
}

/// A satoshi value outside the range its constraint allows.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("amount {value} is outside the valid {constraint} range")]
pub struct AmountError {
    value: i128,
    constraint: &'static str,
}

/// A marker type for amount constraints.
pub trait Constraint {
    /// Human-readable constraint name, used in errors.
    const NAME: &'static str;

    /// The range of values this constraint admits.
    fn valid_range() -> RangeInclusive<i64>;
}

/// Allows negative values down to -MAX_MONEY.
///
/// Useful for intermediate values like fees-in-flight and supply deltas.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NegativeAllowed;

impl Constraint for NegativeAllowed {
    const NAME: &'static str = "NegativeAllowed";

    fn valid_range() -> RangeInclusive<i64> {
        -MAX_MONEY..=MAX_MONEY
    }
}

/// Only allows values of zero or greater; the constraint on outputs and on
/// every persisted settlement entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NonNegative;

impl Constraint for NonNegative {
    const NAME: &'static str = "NonNegative";

    fn valid_range() -> RangeInclusive<i64> {
        0..=MAX_MONEY
    }
}

/// Adds two raw satoshi values in a 128-bit intermediate.
///
/// Fails on any result outside the money range instead of wrapping. Every
/// accumulation loop in consensus goes through this helper.
pub fn add_no_overflow(a: i64, b: i64) -> Result<i64, AmountError> {
    let wide = a as i128 + b as i128;
    if wide > MAX_MONEY as i128 || wide < -(MAX_MONEY as i128) {
        return Err(AmountError {
            value: wide,
            constraint: "money range",
        });
    }
    Ok(wide as i64)
}

#[cfg(any(test, feature = "proptest-impl"))]
impl<C> proptest::arbitrary::Arbitrary for Amount<C>
where
    C: Constraint + std::fmt::Debug + 'static,
{
    type Parameters = ();
    type Strategy = proptest::strategy::BoxedStrategy<Self>;

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        use proptest::prelude::*;
        C::valid_range()
            .prop_map(|value| Amount(value, PhantomData))
            .boxed()
    }
}

impl<C> BathronSerialize for Amount<C> {
    fn bathron_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.bathron_serialize(target)
    }
}

impl<C> BathronDeserialize for Amount<C>
where
    C: Constraint,
{
    fn bathron_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let value = reader.read_i64::<LittleEndian>()?;
        Amount::try_from(value).map_err(|_| SerializationError::Parse("amount out of range"))
    }
}
