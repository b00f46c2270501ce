//! # `vmpool` - Address-Stable Allocators over Virtual Memory
//!
//! Allocators that reserve their whole address range up front and commit
//! pages as they fill, so nothing they hand out ever moves.
//!
//! ## Key Features
//!
//! - **Generational pool**: fixed-stride slots addressed by packed 32-bit
//!   handles. Freed slots are recycled, and every free bumps a per-slot
//!   generation so stale handles are rejected instead of aliasing.
//! - **Virtual arena**: a bump allocator with in-place growth of the most
//!   recent allocation and a reset that decommits everything.
//! - **Pluggable backends**: the pool, the arena and the process heap all
//!   implement [`RawAlloc`], passed explicitly to whoever needs memory.
//! - **Virtual memory seam**: both allocators are generic over
//!   [`VirtualMemory`], with [`SystemVm`] covering Unix and Windows.
//!
//! ## Architecture
//!
//! ```text
//! GenerationalPool ─┐
//!                   ├─ Reservation + CommitRegion ─ VirtualMemory (SystemVm)
//! VirtualArena ─────┘
//! ```
//!
//! A [`Reservation`] owns a range of address space and releases it on drop.
//! A [`CommitRegion`] tracks how much of a window of it is backed and grows
//! that in whole steps. The pool keeps two windows (elements and link
//! records); the arena keeps one.
//!
//! ## Threading
//!
//! Nothing here locks. Pools and arenas are `Send` but not `Sync`; share one
//! across threads behind a mutex, or give each worker its own.
//!
//! ## Example
//!
//! ```rust
//! use vmpool::{ElementId, GenerationalPool, VirtualArena};
//!
//! #[derive(Clone, Copy, zerocopy::FromZeroes)]
//! struct Particle {
//!     pos: [f32; 2],
//!     vel: [f32; 2],
//! }
//!
//! let mut pool: GenerationalPool<Particle> = GenerationalPool::new(1 << 16, 256).unwrap();
//! let id: ElementId = pool.insert(Particle { pos: [0.0; 2], vel: [1.0, 0.5] }).unwrap();
//! for (_, p) in pool.iter_mut() {
//!     p.pos[0] += p.vel[0];
//! }
//! assert_eq!(pool[id].pos[0], 1.0);
//!
//! let mut arena = VirtualArena::new(1 << 20, 1 << 16).unwrap();
//! let name = arena.alloc_str("scratch").unwrap();
//! assert_eq!(name, "scratch");
//! arena.reset().unwrap();
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

mod log;

pub mod alloc;
pub mod config;
pub mod vm;

pub use alloc::{
    AllocError, ArenaStats, ElementId, GenerationalPool, HandleFault, InvalidHandle, PoolStats, RawAlloc,
    SystemAlloc, VirtualArena,
};
pub use config::{ArenaConfig, ConfigError, FreeListOrder, PoolConfig};
pub use vm::{CommitRegion, MappedFile, PageSize, Protection, Reservation, SystemVm, VirtualMemory, VmError};

// Compile-time assertions for layout claims
const _: () = {
    use core::mem;

    // Handles are plain words.
    assert!(mem::size_of::<ElementId>() == 4);
    assert!(mem::size_of::<Option<ElementId>>() == 8);

    // The default handle splits 20 index bits / 11 generation bits.
    assert!(ElementId::<20>::INDEX_MAX == (1 << 20) - 1);
    assert!(ElementId::<20>::GENERATION_MAX == (1 << 11) - 1);

    // Stateless backends are ZSTs.
    assert!(mem::size_of::<SystemVm>() == 0);
    assert!(mem::size_of::<SystemAlloc>() == 0);
};
