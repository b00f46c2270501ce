//! Serializable usage snapshots for the arena and the pool.

use serde::Serialize;

/// Point-in-time usage of a [`VirtualArena`](super::VirtualArena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArenaStats {
    /// Bytes handed out since the last reset, including alignment padding.
    pub used_bytes: usize,
    /// Bytes currently backed by physical pages.
    pub committed_bytes: usize,
    /// Bytes of address space reserved.
    pub reserved_bytes: usize,
}

/// Point-in-time usage of a [`GenerationalPool`](super::GenerationalPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Live elements.
    pub len: u32,
    /// Slots ever used since the last reset.
    pub capacity: u32,
    /// Slots backed by physical pages.
    pub committed_capacity: u32,
    /// Slots the reservation can hold.
    pub reserved_capacity: u32,
    /// Bytes backed by physical pages, elements and link records together.
    pub committed_bytes: usize,
    /// Bytes of address space reserved.
    pub reserved_bytes: usize,
}

impl PoolStats {
    /// Slots on the free list.
    pub fn free(&self) -> u32 {
        self.capacity - self.len
    }
}
