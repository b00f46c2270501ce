use super::{PageSize, Protection, SystemVm, VirtualMemory, VmError};
use crate::alloc::page::{align_up, round_up_multiple};
use crate::alloc::AllocError;
use crate::log::{vm_debug, vm_trace, vm_warn};
use core::mem::ManuallyDrop;
use core::ptr::{self, NonNull};

/// A contiguous range of address space that never moves.
///
/// Pages are committed and decommitted through offsets relative to
/// [`base`](Self::base). The range is released on drop.
pub struct Reservation<V: VirtualMemory = SystemVm> {
    base: NonNull<u8>,
    len: usize,
    geometry: PageSize,
    vm: V,
}

// The reservation exclusively owns its range.
unsafe impl<V: VirtualMemory + Send> Send for Reservation<V> {}

impl Reservation<SystemVm> {
    /// Reserves at least `size` bytes from the operating system.
    pub fn new(size: usize) -> Result<Self, VmError> {
        Self::with_vm(SystemVm, size)
    }
}

impl<V: VirtualMemory> Reservation<V> {
    /// Reserves at least `size` bytes from `vm`, rounded up to its
    /// reservation alignment. A zero size still reserves one unit.
    pub fn with_vm(vm: V, size: usize) -> Result<Self, VmError> {
        let geometry = vm.page_size()?;
        let len = align_up(size.max(1), geometry.reserve_align).ok_or(VmError::Misaligned {
            value: size,
            align: geometry.reserve_align,
        })?;
        // SAFETY: len is a non-zero multiple of reserve_align.
        let base = unsafe { vm.reserve(ptr::null_mut(), len)? };
        vm_debug!(base = ?base, len, "reserved address space");
        Ok(Self { base, len, geometry, vm })
    }

    /// First byte of the range.
    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Reserved size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`; reservations are at least one unit long.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Page geometry captured at reservation time.
    #[inline]
    pub fn geometry(&self) -> PageSize {
        self.geometry
    }

    /// Commit granularity.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.geometry.page_size
    }

    /// The provider backing this reservation.
    pub fn vm(&self) -> &V {
        &self.vm
    }

    /// Whether `addr` points into the range.
    pub fn contains(&self, addr: *const u8) -> bool {
        let start = self.base.as_ptr() as usize;
        let addr = addr as usize;
        addr >= start && addr - start < self.len
    }

    fn range(&self, offset: usize, len: usize) -> Result<NonNull<u8>, VmError> {
        let page = self.geometry.page_size;
        if offset % page != 0 {
            return Err(VmError::Misaligned { value: offset, align: page });
        }
        if len % page != 0 {
            return Err(VmError::Misaligned { value: len, align: page });
        }
        match offset.checked_add(len) {
            Some(end) if end <= self.len => {}
            _ => {
                return Err(VmError::OutOfRange {
                    offset,
                    len,
                    reserved: self.len,
                })
            }
        }
        // SAFETY: offset is within the reservation.
        Ok(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) })
    }

    /// Commits `len` bytes at `offset`. Both must be page aligned.
    pub fn commit(&self, offset: usize, len: usize, prot: Protection) -> Result<(), VmError> {
        let addr = self.range(offset, len)?;
        if len == 0 {
            return Ok(());
        }
        vm_trace!(offset, len, ?prot, "commit");
        // SAFETY: range() checked bounds and alignment.
        unsafe { self.vm.commit(addr, len, prot) }
    }

    /// Decommits `len` bytes at `offset`; they read as zero once recommitted.
    pub fn decommit(&self, offset: usize, len: usize) -> Result<(), VmError> {
        let addr = self.range(offset, len)?;
        if len == 0 {
            return Ok(());
        }
        vm_trace!(offset, len, "decommit");
        // SAFETY: range() checked bounds and alignment.
        unsafe { self.vm.decommit(addr, len) }
    }

    /// Changes the protection of committed pages.
    pub fn protect(&self, offset: usize, len: usize, prot: Protection) -> Result<(), VmError> {
        let addr = self.range(offset, len)?;
        if len == 0 {
            return Ok(());
        }
        vm_trace!(offset, len, ?prot, "protect");
        // SAFETY: range() checked bounds and alignment.
        unsafe { self.vm.protect(addr, len, prot) }
    }

    /// Releases the range, reporting failure instead of logging it.
    pub fn release(self) -> Result<(), VmError> {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never used again and `vm` is moved out exactly once.
        let vm = unsafe { ptr::read(&this.vm) };
        vm_debug!(base = ?this.base, len = this.len, "releasing address space");
        // SAFETY: base/len describe the whole reservation.
        unsafe { vm.release(this.base, this.len) }
    }
}

impl<V: VirtualMemory> Drop for Reservation<V> {
    fn drop(&mut self) {
        // SAFETY: base/len describe the whole reservation, which nothing uses after drop.
        if let Err(_err) = unsafe { self.vm.release(self.base, self.len) } {
            vm_warn!(err = %_err, base = ?self.base, "failed to release reservation");
        }
    }
}

impl<V: VirtualMemory> core::fmt::Debug for Reservation<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reservation")
            .field("base", &self.base)
            .field("len", &self.len)
            .field("page_size", &self.geometry.page_size)
            .finish()
    }
}

/// A page-aligned window of a [`Reservation`] committed front to back.
///
/// Tracks how much of the window is committed and grows it in whole steps.
/// Invariant: `committed <= len`, both multiples of the page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitRegion {
    offset: usize,
    len: usize,
    committed: usize,
    grow: usize,
}

impl CommitRegion {
    /// A window of `len` bytes at `offset` growing `grow` bytes at a time.
    ///
    /// `grow` is rounded up to `page_size` and is at least one page.
    pub fn new(offset: usize, len: usize, grow: usize, page_size: usize) -> Self {
        let grow = align_up(grow.max(1), page_size).unwrap_or(len);
        Self {
            offset,
            len,
            committed: 0,
            grow,
        }
    }

    /// Start of the window, relative to the reservation base.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the window.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the window has zero size.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Committed bytes from the window start.
    #[inline]
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Commit step in bytes.
    #[inline]
    pub fn grow_size(&self) -> usize {
        self.grow
    }

    /// Commits whole grow steps until the first `bytes` bytes are backed.
    ///
    /// Fails with [`AllocError::Exhausted`] when `bytes` exceeds the window.
    pub fn ensure<V: VirtualMemory>(&mut self, res: &Reservation<V>, bytes: usize) -> Result<(), AllocError> {
        if bytes <= self.committed {
            return Ok(());
        }
        if bytes > self.len {
            return Err(AllocError::Exhausted {
                requested: bytes,
                available: self.len,
            });
        }
        let needed = bytes - self.committed;
        let step = round_up_multiple(needed, self.grow).unwrap_or(self.len);
        let target = self.committed.saturating_add(step).min(self.len);
        let target = align_up(target, res.page_size()).unwrap_or(self.len).min(self.len);

        res.commit(self.offset + self.committed, target - self.committed, Protection::ReadWrite)?;
        self.committed = target;
        Ok(())
    }

    /// Decommits everything and returns the watermark to zero.
    pub fn decommit_all<V: VirtualMemory>(&mut self, res: &Reservation<V>) -> Result<(), VmError> {
        let committed = self.committed;
        self.committed = 0;
        res.decommit(self.offset, committed)
    }
}
