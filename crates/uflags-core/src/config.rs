//! # Module Parameters
//!
//! Startup options applied once when the registry is allocated.

use crate::{FlagError, FlagWord};
use serde::{Deserialize, Serialize};

/// Parameters of the flag module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, bound(deserialize = ""))]
pub struct ModuleParams<W: FlagWord = u32> {
    /// Value of the word right after allocation.
    pub initial: W,
}

impl<W: FlagWord> ModuleParams<W> {
    #[must_use]
    pub fn with_initial(initial: W) -> Self {
        Self { initial }
    }

    /// Set a parameter by name, as a host config line `modparam("uflags", name, value)`.
    ///
    /// `initial` takes an unsigned decimal number.
    pub fn apply(&mut self, name: &str, value: &str) -> Result<(), FlagError> {
        match name {
            "initial" => {
                self.initial = parse_decimal(value)?;
                Ok(())
            }
            _ => Err(FlagError::UnknownParameter {
                name: name.to_string(),
            }),
        }
    }
}

/// Parse a plain unsigned decimal: digits only, no sign, no whitespace.
pub(crate) fn parse_decimal<W: FlagWord>(text: &str) -> Result<W, FlagError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FlagError::BadNumber {
            text: text.to_string(),
        });
    }
    W::from_str_radix(text, 10).map_err(|_| FlagError::BadNumber {
        text: text.to_string(),
    })
}

// =============================================================================
// TESTS
// =============================================================================
