//! # Flag Registry
//!
//! One word of user flags, mutated atomically from any thread.
//!
//! The registry is constructed explicitly and shared by handle. The service
//! keeps exactly one live instance in a [`RegistryCell`], which enforces the
//! init-once / destroy-at-shutdown lifecycle.

use crate::{FlagError, FlagMask, FlagWord, ModuleParams};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

// =============================================================================
// REGISTRY
// =============================================================================

/// The shared bitmask.
///
/// Every operation is a single atomic load or read-modify-write on the word,
/// so concurrent `set`/`reset` calls never lose updates.
#[derive(Debug)]
pub struct FlagRegistry<W: FlagWord = u32> {
    word: Box<[W::Atomic; 1]>,
}

impl<W: FlagWord> FlagRegistry<W> {
    /// Number of addressable flags.
    pub const WIDTH: u32 = W::BITS;

    /// Allocate the word and set it to `initial`.
    ///
    /// Fails with [`FlagError::Allocation`] if the storage cannot be reserved.
    pub fn initialize(initial: W) -> Result<Self, FlagError> {
        let word = allocate_word(W::new_atomic(initial))?;
        Ok(Self { word })
    }

    /// Allocate the word from module parameters.
    pub fn from_params(params: &ModuleParams<W>) -> Result<Self, FlagError> {
        Self::initialize(params.initial)
    }

    fn cell(&self) -> &W::Atomic {
        let [cell] = &*self.word;
        cell
    }

    /// `bits |= mask`
    pub fn set(&self, mask: FlagMask<W>) {
        W::fetch_or(self.cell(), mask.bits());
    }

    /// `bits &= !mask`
    pub fn reset(&self, mask: FlagMask<W>) {
        W::fetch_and_not(self.cell(), mask.bits());
    }

    /// True when any flag of `mask` is set.
    ///
    /// Route-action semantics; identical to [`contains_all`](Self::contains_all)
    /// for the single-bit masks produced by fixup.
    #[must_use]
    pub fn contains_any(&self, mask: FlagMask<W>) -> bool {
        !self.get_all().and(mask.bits()).is_zero()
    }

    /// True when every flag of `mask` is set.
    ///
    /// Management-command semantics.
    #[must_use]
    pub fn contains_all(&self, mask: FlagMask<W>) -> bool {
        self.get_all().and(mask.bits()) == mask.bits()
    }

    /// The whole word.
    #[must_use]
    pub fn get_all(&self) -> W {
        W::load(self.cell())
    }

    /// The whole word, ready for reporting.
    #[must_use]
    pub fn snapshot(&self) -> FlagSnapshot<W> {
        FlagSnapshot {
            bits: self.get_all(),
        }
    }
}

fn allocate_word<A>(value: A) -> Result<Box<[A; 1]>, FlagError> {
    let bytes = size_of::<A>();
    let mut storage = Vec::new();
    storage
        .try_reserve_exact(1)
        .map_err(|err| FlagError::Allocation {
            bytes,
            reason: err.to_string(),
        })?;
    storage.push(value);
    storage
        .into_boxed_slice()
        .try_into()
        .map_err(|_| FlagError::Allocation {
            bytes,
            reason: "unexpected storage length".to_string(),
        })
}

/// A point-in-time copy of the word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = ""))]
pub struct FlagSnapshot<W: FlagWord = u32> {
    pub bits: W,
}

impl<W: FlagWord> FlagSnapshot<W> {
    /// Uppercase hexadecimal with a `0x` prefix.
    #[must_use]
    pub fn hex(&self) -> String {
        format!("0x{:X}", self.bits)
    }

    /// Unsigned decimal.
    #[must_use]
    pub fn decimal(&self) -> String {
        self.bits.to_string()
    }
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[derive(Debug)]
enum Slot<W: FlagWord> {
    Empty,
    Live(Arc<FlagRegistry<W>>),
    Destroyed,
}

/// Holder of the service's single registry.
///
/// `init` succeeds once; a second call is rejected with
/// [`FlagError::AlreadyInitialized`], including after `destroy`.
#[derive(Debug)]
pub struct RegistryCell<W: FlagWord = u32> {
    slot: RwLock<Slot<W>>,
}

impl<W: FlagWord> Default for RegistryCell<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: FlagWord> RegistryCell<W> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Slot::Empty),
        }
    }

    /// Allocate the registry from module parameters.
    pub fn init(&self, params: &ModuleParams<W>) -> Result<Arc<FlagRegistry<W>>, FlagError> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        match *slot {
            Slot::Empty => {
                let registry = Arc::new(FlagRegistry::from_params(params)?);
                *slot = Slot::Live(Arc::clone(&registry));
                Ok(registry)
            }
            Slot::Live(_) | Slot::Destroyed => Err(FlagError::AlreadyInitialized),
        }
    }

    /// Handle to the live registry.
    pub fn get(&self) -> Result<Arc<FlagRegistry<W>>, FlagError> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        match &*slot {
            Slot::Live(registry) => Ok(Arc::clone(registry)),
            Slot::Empty | Slot::Destroyed => Err(FlagError::NotInitialized),
        }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.get().is_ok()
    }

    /// Release the registry. Outstanding handles stay valid until dropped.
    ///
    /// Returns false if there was nothing to release.
    pub fn destroy(&self) -> bool {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        let was_live = matches!(*slot, Slot::Live(_));
        if was_live {
            *slot = Slot::Destroyed;
        }
        was_live
    }
}

// =============================================================================
// TESTS
// =============================================================================
