//! # Flag Words
//!
//! The width abstraction for the registry.
//!
//! A [`FlagWord`] is an unsigned integer paired with its atomic counterpart.
//! The registry is generic over it so the same code serves 32-bit and 64-bit
//! flag sets. The trait is sealed: only `u32` and `u64` implement it.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::num::ParseIntError;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

mod sealed {
    pub trait Sealed {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
}

/// An unsigned word usable as flag storage.
///
/// All atomic helpers use `AcqRel` for read-modify-write and `Acquire` for
/// loads, so a completed `fetch_or`/`fetch_and_not` is visible to every later
/// reader.
pub trait FlagWord:
    sealed::Sealed
    + Copy
    + Eq
    + Default
    + fmt::Debug
    + fmt::Display
    + fmt::UpperHex
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Atomic cell holding one word.
    type Atomic: fmt::Debug + Send + Sync;

    /// Number of addressable flags.
    const BITS: u32;

    /// The all-clear word.
    const ZERO: Self;

    /// `1 << index`. `index` must be below `BITS`.
    fn bit(index: u32) -> Self;

    /// Bitwise AND.
    fn and(self, other: Self) -> Self;

    /// Bitwise OR.
    fn or(self, other: Self) -> Self;

    fn count_ones(self) -> u32;

    fn trailing_zeros(self) -> u32;

    fn from_str_radix(text: &str, radix: u32) -> Result<Self, ParseIntError>;

    fn new_atomic(value: Self) -> Self::Atomic;

    fn load(cell: &Self::Atomic) -> Self;

    /// Atomically `cell |= value`, returning the previous word.
    fn fetch_or(cell: &Self::Atomic, value: Self) -> Self;

    /// Atomically `cell &= !value`, returning the previous word.
    fn fetch_and_not(cell: &Self::Atomic, value: Self) -> Self;

    fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

macro_rules! impl_flag_word {
    ($word:ty, $atomic:ty) => {
        impl FlagWord for $word {
            type Atomic = $atomic;

            const BITS: u32 = <$word>::BITS;
            const ZERO: Self = 0;

            #[inline]
            fn bit(index: u32) -> Self {
                (1 as $word) << index
            }

            #[inline]
            fn and(self, other: Self) -> Self {
                self & other
            }

            #[inline]
            fn or(self, other: Self) -> Self {
                self | other
            }

            #[inline]
            fn count_ones(self) -> u32 {
                <$word>::count_ones(self)
            }

            #[inline]
            fn trailing_zeros(self) -> u32 {
                <$word>::trailing_zeros(self)
            }

            fn from_str_radix(text: &str, radix: u32) -> Result<Self, ParseIntError> {
                <$word>::from_str_radix(text, radix)
            }

            fn new_atomic(value: Self) -> Self::Atomic {
                <$atomic>::new(value)
            }

            #[inline]
            fn load(cell: &Self::Atomic) -> Self {
                cell.load(Ordering::Acquire)
            }

            #[inline]
            fn fetch_or(cell: &Self::Atomic, value: Self) -> Self {
                cell.fetch_or(value, Ordering::AcqRel)
            }

            #[inline]
            fn fetch_and_not(cell: &Self::Atomic, value: Self) -> Self {
                cell.fetch_and(!value, Ordering::AcqRel)
            }
        }
    };
}

impl_flag_word!(u32, AtomicU32);
impl_flag_word!(u64, AtomicU64);

// =============================================================================
// TESTS
// =============================================================================
