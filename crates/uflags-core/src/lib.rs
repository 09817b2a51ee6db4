//! # uflags-core
//!
//! A shared bitmask of user flags with atomic set/reset/test.
//!
//! This crate is THE LOGIC of uflags:
//! - [`FlagRegistry`]: one atomic word, allocated once and shared by handle
//! - [`RegistryCell`]: the init/destroy lifecycle around it
//! - [`script`]: route actions with load-time fixup
//! - [`mi`]: management commands and their reply trees
//!
//! The crate is synchronous and free of I/O. Transports, logging and
//! configuration files live in the app layer.

pub mod config;
pub mod mi;
pub mod registry;
pub mod script;
pub mod word;

pub use config::ModuleParams;
pub use registry::{FlagRegistry, FlagSnapshot, RegistryCell};
pub use word::FlagWord;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use thiserror::Error;

// =============================================================================
// ERRORS
// =============================================================================

/// Errors raised by the registry and its callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    /// A flag index outside `[0, width)`.
    #[error("flag <{index}> out of range [0..{}]", .width - 1)]
    OutOfRange { index: i64, width: u32 },

    /// A flag index that is not a plain decimal number.
    #[error("bad number <{text}>")]
    BadNumber { text: String },

    /// A module parameter name that the module does not export.
    #[error("unknown module parameter <{name}>")]
    UnknownParameter { name: String },

    /// Backing storage for the flag word could not be reserved.
    #[error("no memory for {bytes}-byte flag word: {reason}")]
    Allocation { bytes: usize, reason: String },

    #[error("flag registry already initialized")]
    AlreadyInitialized,

    #[error("flag registry not initialized")]
    NotInitialized,
}

impl FlagError {
    /// Coarse classification used for reporting.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OutOfRange { .. } | Self::BadNumber { .. } | Self::UnknownParameter { .. } => {
                ErrorKind::Configuration
            }
            Self::Allocation { .. } => ErrorKind::Allocation,
            Self::AlreadyInitialized | Self::NotInitialized => ErrorKind::Lifecycle,
        }
    }
}

/// Error taxonomy.
///
/// - `Configuration`: fatal to loading a configuration, not to the process.
/// - `Allocation`: fatal at startup.
/// - `Lifecycle`: the registry was used outside its init/destroy window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Allocation,
    Lifecycle,
}

/// A rejected management command argument.
///
/// Reported to the caller of the command and never fatal, so it stays apart
/// from [`FlagError`]. The display strings are the standard management reply
/// reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("Too few or too many arguments")]
    MissingParameter,

    #[error("Bad parameter")]
    BadParameter { value: String },
}

// =============================================================================
// FLAG MASK
// =============================================================================

/// A pre-shifted set of flags.
///
/// Route actions hold a single-bit mask computed once at fixup. Management
/// commands may carry any non-zero mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent, bound(deserialize = ""))]
pub struct FlagMask<W: FlagWord = u32>(W);

impl<W: FlagWord> FlagMask<W> {
    /// Validate a flag index and shift it into a single-bit mask.
    ///
    /// This is the load-time check: callers run it once and keep the mask.
    /// Fails with [`FlagError::OutOfRange`] when `index < 0` or
    /// `index >= W::BITS`.
    pub fn from_index(index: i64) -> Result<Self, FlagError> {
        match u32::try_from(index) {
            Ok(bit) if bit < W::BITS => Ok(Self(W::bit(bit))),
            _ => Err(FlagError::OutOfRange {
                index,
                width: W::BITS,
            }),
        }
    }

    /// Wrap an already-shifted mask.
    #[must_use]
    pub fn from_bits(bits: W) -> Self {
        Self(bits)
    }

    #[must_use]
    pub fn bits(self) -> W {
        self.0
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0.is_zero()
    }

    /// True when exactly one flag is selected.
    #[must_use]
    pub fn is_single(self) -> bool {
        self.0.count_ones() == 1
    }

    /// The flag index of a single-bit mask.
    #[must_use]
    pub fn index(self) -> Option<u32> {
        self.is_single().then(|| self.0.trailing_zeros())
    }
}

impl<W: FlagWord> BitOr for FlagMask<W> {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0.or(rhs.0))
    }
}

impl<W: FlagWord> fmt::Display for FlagMask<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

// =============================================================================
// TESTS
// =============================================================================
