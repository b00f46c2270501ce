//! Construction parameters for the pool and the arena.
//!
//! Both are plain `serde` structs so they can be embedded in a host
//! application's configuration file. Missing fields fall back to the defaults.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Default reserved arena size (64 MiB).
pub const DEFAULT_ARENA_RESERVE: usize = 64 * 1024 * 1024;
/// Default arena commit step (64 KiB).
pub const DEFAULT_ARENA_GROW: usize = 64 * 1024;
/// Default number of slots a pool reserves.
pub const DEFAULT_POOL_RESERVE: u32 = 1 << 16;
/// Default number of slots committed per pool growth step.
pub const DEFAULT_POOL_GROW: u32 = 256;

/// Where `deallocate` puts a freed slot on the free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeListOrder {
    /// Push on the head. O(1); reuse order is most-recently-freed first.
    #[default]
    Lifo,
    /// Keep the list sorted by slot. O(free slots) per free; reuse always
    /// picks the lowest free slot, which keeps live elements packed.
    AddressOrdered,
}

/// Rejected configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A size or count was zero.
    Zero(&'static str),
    /// The reserved slot count does not fit the handle's index bits.
    TooManySlots {
        /// Requested slot count.
        requested: u32,
        /// Largest count the handle can address.
        max: u32,
    },
    /// The byte size of the reservation overflowed `usize`.
    Overflow,
    /// The element type is aligned beyond the page size.
    OverAligned {
        /// Alignment of the element type.
        align: usize,
        /// Page size.
        page_size: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero(field) => write!(f, "`{field}` must be greater than zero"),
            Self::TooManySlots { requested, max } => {
                write!(f, "{requested} slots requested but handles can address at most {max}")
            }
            Self::Overflow => f.write_str("reservation size overflows the address space"),
            Self::OverAligned { align, page_size } => {
                write!(f, "element alignment {align} exceeds the page size {page_size}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parameters of a [`GenerationalPool`](crate::GenerationalPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Most elements the pool will ever hold. Address space for all of them
    /// is reserved up front.
    pub reserved_count: u32,
    /// Slots committed at a time once the committed ones are used up.
    pub grow_count: u32,
    /// Free list policy, fixed for the lifetime of the pool.
    pub free_list_order: FreeListOrder,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            reserved_count: DEFAULT_POOL_RESERVE,
            grow_count: DEFAULT_POOL_GROW,
            free_list_order: FreeListOrder::Lifo,
        }
    }
}

impl PoolConfig {
    /// A config with the given capacities and the default free list order.
    pub fn new(reserved_count: u32, grow_count: u32) -> Self {
        Self {
            reserved_count,
            grow_count,
            ..Self::default()
        }
    }

    /// Sets the reserved slot count.
    #[must_use]
    pub fn with_reserved_count(mut self, reserved_count: u32) -> Self {
        self.reserved_count = reserved_count;
        self
    }

    /// Sets the growth step.
    #[must_use]
    pub fn with_grow_count(mut self, grow_count: u32) -> Self {
        self.grow_count = grow_count;
        self
    }

    /// Sets the free list policy.
    #[must_use]
    pub fn with_free_list_order(mut self, order: FreeListOrder) -> Self {
        self.free_list_order = order;
        self
    }

    /// Checks the counts against a handle able to address `max_slots`.
    pub fn validate(&self, max_slots: u32) -> Result<(), ConfigError> {
        if self.reserved_count == 0 {
            return Err(ConfigError::Zero("reserved_count"));
        }
        if self.grow_count == 0 {
            return Err(ConfigError::Zero("grow_count"));
        }
        if self.reserved_count > max_slots {
            return Err(ConfigError::TooManySlots {
                requested: self.reserved_count,
                max: max_slots,
            });
        }
        Ok(())
    }
}

/// Parameters of a [`VirtualArena`](crate::VirtualArena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Bytes of address space reserved up front.
    pub max_size: usize,
    /// Bytes committed at a time.
    pub grow_size: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_ARENA_RESERVE,
            grow_size: DEFAULT_ARENA_GROW,
        }
    }
}

impl ArenaConfig {
    /// A config with the given sizes.
    pub fn new(max_size: usize, grow_size: usize) -> Self {
        Self { max_size, grow_size }
    }

    /// Checks that neither size is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::Zero("max_size"));
        }
        if self.grow_size == 0 {
            return Err(ConfigError::Zero("grow_size"));
        }
        Ok(())
    }
}
