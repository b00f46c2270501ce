//! The packed handle handed out by [`GenerationalPool`](super::GenerationalPool).
//!
//! A handle is one `u32`:
//!
//! ```text
//!  31          30 .. INDEX_BITS        INDEX_BITS-1 .. 0
//! +-----------+----------------------+--------------------+
//! | allocated |     generation       |  slot (1-based)    |
//! +-----------+----------------------+--------------------+
//! ```
//!
//! The pool stores the same layout in each slot's link record, where the low
//! bits point at the next slot of whichever list the slot is on. Slot 0 means
//! "no slot", so the all-zero word is the null handle.

use core::fmt;
use serde::{Deserialize, Serialize};

/// A generational handle to a pool element.
///
/// `INDEX_BITS` trades slot count for generation width: a pool can hold up to
/// `2^INDEX_BITS - 1` elements and detects reuse of a slot until its
/// generation wraps after `2^(31 - INDEX_BITS)` frees.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId<const INDEX_BITS: u32 = 20>(u32);

impl<const INDEX_BITS: u32> ElementId<INDEX_BITS> {
    pub(crate) const CHECK_BITS: () = assert!(
        INDEX_BITS >= 1 && INDEX_BITS <= 30,
        "INDEX_BITS must leave room for the allocated bit and at least one generation bit"
    );

    /// Bits holding the 1-based slot number.
    pub const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
    /// Set while the slot is allocated.
    pub const ALLOCATED_BIT: u32 = 1 << 31;
    /// Bits holding the generation counter.
    pub const COUNTER_MASK: u32 = !(Self::INDEX_MASK | Self::ALLOCATED_BIT);
    /// Largest generation before it wraps to zero.
    pub const GENERATION_MAX: u32 = Self::COUNTER_MASK >> INDEX_BITS;
    /// Largest slot number, which is also the most elements a pool can hold.
    pub const INDEX_MAX: u32 = Self::INDEX_MASK;

    /// The handle that refers to nothing.
    pub const NULL: Self = Self(0);

    /// Builds an allocated handle. `slot` is 1-based.
    #[inline]
    pub const fn new(generation: u32, slot: u32) -> Self {
        Self(pack::<INDEX_BITS>(true, generation, slot))
    }

    /// Reinterprets a raw word, e.g. one read back from storage.
    ///
    /// No validation happens here; the pool checks handles on use.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The packed word.
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// The 1-based slot number, `0` for the null handle.
    #[inline]
    pub const fn slot(self) -> u32 {
        self.0 & Self::INDEX_MASK
    }

    /// The generation the slot had when this handle was issued.
    #[inline]
    pub const fn generation(self) -> u32 {
        (self.0 & Self::COUNTER_MASK) >> INDEX_BITS
    }

    /// Whether the allocated bit is set. Every handle issued by a pool has it.
    #[inline]
    pub const fn is_allocated_bit(self) -> bool {
        self.0 & Self::ALLOCATED_BIT != 0
    }

    /// Whether this handle names no slot.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.slot() == 0
    }

    /// The same slot at another generation.
    #[inline]
    pub const fn with_generation(self, generation: u32) -> Self {
        Self(pack::<INDEX_BITS>(self.is_allocated_bit(), generation, self.slot()))
    }

    /// The handle the slot had one allocation earlier, wrapping below zero.
    #[inline]
    pub const fn prev_generation(self) -> Self {
        let generation = self.generation();
        let prev = if generation == 0 { Self::GENERATION_MAX } else { generation - 1 };
        self.with_generation(prev)
    }
}

impl<const INDEX_BITS: u32> fmt::Debug for ElementId<INDEX_BITS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("ElementId(null)");
        }
        write!(f, "ElementId({}v{}", self.slot(), self.generation())?;
        if !self.is_allocated_bit() {
            f.write_str(", unallocated")?;
        }
        f.write_str(")")
    }
}

/// Packs the three fields. Out-of-range values are masked.
#[inline]
pub(crate) const fn pack<const INDEX_BITS: u32>(allocated: bool, generation: u32, slot: u32) -> u32 {
    let bit = if allocated { ElementId::<INDEX_BITS>::ALLOCATED_BIT } else { 0 };
    bit | ((generation << INDEX_BITS) & ElementId::<INDEX_BITS>::COUNTER_MASK)
        | (slot & ElementId::<INDEX_BITS>::INDEX_MASK)
}

/// Next generation after a free, wrapping at the counter width.
#[inline]
pub(crate) const fn next_generation<const INDEX_BITS: u32>(generation: u32) -> u32 {
    if generation >= ElementId::<INDEX_BITS>::GENERATION_MAX {
        0
    } else {
        generation + 1
    }
}
