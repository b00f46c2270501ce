//! A bump allocator over one reservation.
//!
//! The arena reserves its maximum size up front and commits pages in
//! grow-size chunks as the cursor advances, so the base address never moves
//! and growth never copies. Individual allocations are not freed; `reset`
//! decommits everything and starts again at offset zero.

use super::allocator::{AllocError, RawAlloc};
use super::page::{align_up, is_power_of_two};
use super::stats::ArenaStats;
use crate::config::ArenaConfig;
use crate::log::{vm_debug, vm_trace};
use crate::vm::{CommitRegion, Reservation, SystemVm, VirtualMemory, VmError};
use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::{self, NonNull};
use zerocopy::FromZeroes;

/// A bump allocator backed by reserved virtual memory.
///
/// Allocation takes `&self`, so many references can be handed out at once;
/// [`reset`](Self::reset) takes `&mut self` and therefore cannot run while
/// any of them is alive.
///
/// # Examples
///
/// ```rust
/// use vmpool::VirtualArena;
///
/// let mut arena = VirtualArena::new(1 << 20, 4096).unwrap();
/// let x = arena.alloc(41u64).unwrap();
/// *x += 1;
/// assert_eq!(*x, 42);
///
/// let s = arena.alloc_str("hello").unwrap();
/// assert_eq!(s, "hello");
///
/// arena.reset().unwrap();
/// assert_eq!(arena.used(), 0);
/// ```
pub struct VirtualArena<V: VirtualMemory = SystemVm> {
    reservation: Reservation<V>,
    region: Cell<CommitRegion>,
    cursor: Cell<usize>,
}

// The arena exclusively owns its reservation. Not Sync: Cell.
unsafe impl<V: VirtualMemory + Send> Send for VirtualArena<V> {}

impl VirtualArena<SystemVm> {
    /// Reserves `max_size` bytes, committing `grow_size` bytes at a time.
    pub fn new(max_size: usize, grow_size: usize) -> Result<Self, AllocError> {
        Self::with_config(&ArenaConfig::new(max_size, grow_size))
    }

    /// Creates an arena from a config.
    pub fn with_config(config: &ArenaConfig) -> Result<Self, AllocError> {
        Self::with_vm(SystemVm, config)
    }
}

impl<V: VirtualMemory> VirtualArena<V> {
    /// Creates an arena on a custom virtual memory provider.
    pub fn with_vm(vm: V, config: &ArenaConfig) -> Result<Self, AllocError> {
        config.validate()?;
        let reservation = Reservation::with_vm(vm, config.max_size)?;
        let region = CommitRegion::new(0, reservation.len(), config.grow_size, reservation.page_size());
        vm_debug!(
            reserved = reservation.len(),
            grow = region.grow_size(),
            "arena created"
        );
        Ok(Self {
            reservation,
            region: Cell::new(region),
            cursor: Cell::new(0),
        })
    }

    /// First byte of the arena. Stable across growth and resets.
    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.reservation.base()
    }

    /// Bytes handed out since the last reset, padding included.
    #[inline]
    pub fn used(&self) -> usize {
        self.cursor.get()
    }

    /// Bytes currently committed.
    #[inline]
    pub fn committed(&self) -> usize {
        self.region.get().committed()
    }

    /// Bytes reserved; the most the arena can ever hand out.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.reservation.len()
    }

    /// Bytes that can still be handed out, ignoring alignment padding.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.used()
    }

    /// Current usage.
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            used_bytes: self.used(),
            committed_bytes: self.committed(),
            reserved_bytes: self.capacity(),
        }
    }

    /// Whether `ptr` lies in the part of the arena handed out so far.
    pub fn owns(&self, ptr: *const u8) -> bool {
        let start = self.base().as_ptr() as usize;
        let addr = ptr as usize;
        addr >= start && addr - start < self.used()
    }

    /// Commits enough pages for the cursor to reach `end`.
    fn ensure_committed(&self, end: usize) -> Result<(), AllocError> {
        let mut region = self.region.get();
        if end > region.committed() {
            let before = region.committed();
            region.ensure(&self.reservation, end)?;
            vm_trace!(from = before, to = region.committed(), "arena grew");
            self.region.set(region);
        }
        Ok(())
    }

    /// Bumps the cursor for `size` bytes aligned to `align`.
    ///
    /// The returned memory is zero if it has not been handed out since the
    /// last reset, otherwise it holds whatever was written there.
    pub fn alloc_raw(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        if !is_power_of_two(align) {
            return Err(AllocError::InvalidLayout);
        }
        let base = self.base().as_ptr() as usize;
        let exhausted = AllocError::Exhausted {
            requested: size,
            available: self.remaining(),
        };
        let start = align_up(base + self.cursor.get(), align).ok_or(AllocError::InvalidLayout)? - base;
        let end = match start.checked_add(size) {
            Some(end) if end <= self.capacity() => end,
            _ => return Err(exhausted),
        };
        self.ensure_committed(end)?;
        self.cursor.set(end);
        // SAFETY: start < capacity, inside the reservation.
        Ok(unsafe { NonNull::new_unchecked(self.base().as_ptr().add(start)) })
    }

    /// Bumps the cursor for `layout`.
    #[inline]
    pub fn alloc_layout(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.alloc_raw(layout.size(), layout.align())
    }

    /// Moves `value` into the arena.
    pub fn alloc<T>(&self, value: T) -> Result<&mut T, AllocError> {
        let ptr = self.alloc_layout(Layout::new::<T>())?.cast::<T>();
        // SAFETY: fresh, aligned, committed and exclusively ours.
        unsafe {
            ptr.as_ptr().write(value);
            Ok(&mut *ptr.as_ptr())
        }
    }

    /// Allocates a zeroed slice of `len` elements.
    pub fn alloc_zeroed_slice<T: FromZeroes>(&self, len: usize) -> Result<&mut [T], AllocError> {
        let layout = Layout::array::<T>(len).map_err(|_| AllocError::InvalidLayout)?;
        let ptr = self.alloc_layout(layout)?.cast::<T>();
        // SAFETY: fresh allocation of len Ts; all-zero is a valid T.
        unsafe {
            ptr.as_ptr().write_bytes(0, len);
            Ok(core::slice::from_raw_parts_mut(ptr.as_ptr(), len))
        }
    }

    /// Copies a slice into the arena.
    pub fn alloc_slice_copy<T: Copy>(&self, slice: &[T]) -> Result<&mut [T], AllocError> {
        let ptr = self.alloc_layout(Layout::for_value(slice))?.cast::<T>();
        // SAFETY: fresh allocation sized for the slice.
        unsafe {
            ptr::copy_nonoverlapping(slice.as_ptr(), ptr.as_ptr(), slice.len());
            Ok(core::slice::from_raw_parts_mut(ptr.as_ptr(), slice.len()))
        }
    }

    /// Copies a string slice into the arena.
    pub fn alloc_str(&self, s: &str) -> Result<&mut str, AllocError> {
        let bytes = self.alloc_slice_copy(s.as_bytes())?;
        // SAFETY: copied from a valid str.
        Ok(unsafe { core::str::from_utf8_unchecked_mut(bytes) })
    }

    /// Resizes an allocation, in place when it is the most recent one.
    ///
    /// Only the allocation ending at the cursor can change size in place (in
    /// either direction). Any other block is copied into a fresh allocation;
    /// the old block is simply abandoned.
    ///
    /// # Safety
    /// `ptr` must have been returned by this arena since the last reset, for
    /// a block of `old_size` bytes.
    pub unsafe fn realloc_in_place(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
        align: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        if !is_power_of_two(align) {
            return Err(AllocError::InvalidLayout);
        }
        let offset = ptr.as_ptr() as usize - self.base().as_ptr() as usize;
        let cursor = self.cursor.get();
        let is_last = cursor.checked_sub(old_size) == Some(offset);
        if is_last && ptr.as_ptr() as usize % align == 0 {
            let end = match offset.checked_add(new_size) {
                Some(end) if end <= self.capacity() => end,
                _ => {
                    return Err(AllocError::Exhausted {
                        requested: new_size,
                        available: self.capacity() - offset,
                    })
                }
            };
            self.ensure_committed(end)?;
            self.cursor.set(end);
            return Ok(ptr);
        }

        let new_ptr = self.alloc_raw(new_size, align)?;
        ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), old_size.min(new_size));
        Ok(new_ptr)
    }

    /// Decommits every page and rewinds to offset zero.
    ///
    /// The next allocations reuse the same addresses and read as zero.
    pub fn reset(&mut self) -> Result<(), VmError> {
        let mut region = self.region.get();
        vm_debug!(used = self.used(), committed = region.committed(), "arena reset");
        self.cursor.set(0);
        let res = region.decommit_all(&self.reservation);
        self.region.set(region);
        res
    }

    /// Releases the reservation, reporting failure instead of logging it.
    pub fn release(self) -> Result<(), VmError> {
        self.reservation.release()
    }
}

unsafe impl<V: VirtualMemory> RawAlloc for VirtualArena<V> {
    fn allocate(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.alloc_layout(layout)
    }

    unsafe fn grow(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        self.realloc_in_place(ptr, old_layout.size(), new_layout.size(), new_layout.align())
    }

    unsafe fn shrink(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        self.realloc_in_place(ptr, old_layout.size(), new_layout.size(), new_layout.align())
    }

    unsafe fn deallocate(&mut self, _ptr: NonNull<u8>, _layout: Layout) {
        // No-op: memory comes back on reset
    }

    fn reset(&mut self) -> Result<(), AllocError> {
        VirtualArena::reset(self).map_err(AllocError::from)
    }
}

impl<V: VirtualMemory> core::fmt::Debug for VirtualArena<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VirtualArena")
            .field("base", &self.base())
            .field("used", &self.used())
            .field("committed", &self.committed())
            .field("capacity", &self.capacity())
            .finish()
    }
}
