//! Allocators built on reserved virtual memory, plus the plugin trait they share.

pub mod allocator;
pub mod arena;
pub mod generational_pool;
pub mod id;
pub mod page;
pub mod stats;
pub mod system;

pub use allocator::{AllocError, RawAlloc};
pub use arena::VirtualArena;
pub use generational_pool::{GenerationalPool, HandleFault, InvalidHandle, Iter, IterMut};
pub use id::ElementId;
pub use stats::{ArenaStats, PoolStats};
pub use system::SystemAlloc;
