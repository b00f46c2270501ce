//! Virtual memory: reserve address space once, commit pages on demand.
//!
//! [`VirtualMemory`] is the seam the allocators are built on. [`SystemVm`]
//! forwards to `mmap`/`mprotect`/`madvise` on Unix and
//! `VirtualAlloc`/`VirtualFree` on Windows; tests substitute their own
//! provider to inject failures.

mod error;
mod mapped_file;
mod protection;
mod reservation;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as sys;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as sys;

pub use error::VmError;
pub use mapped_file::MappedFile;
pub use protection::Protection;
pub use reservation::{CommitRegion, Reservation};

use core::ptr::NonNull;

/// Page geometry of the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSize {
    /// Granularity of commit, decommit and protection changes.
    pub page_size: usize,
    /// Granularity of reservations. A multiple of `page_size`; larger than it
    /// on Windows (the allocation granularity).
    pub reserve_align: usize,
}

/// The four primitives the allocators consume, plus protection changes.
///
/// # Safety
///
/// Implementations must uphold the contracts documented on each method, in
/// particular that freshly committed memory reads as zero, including memory
/// that was committed, decommitted and committed again.
pub unsafe trait VirtualMemory {
    /// Queries the page geometry.
    fn page_size(&self) -> Result<PageSize, VmError>;

    /// Reserves `size` bytes of address space without backing it.
    ///
    /// `hint` is a preferred start address or null. Nothing in the range is
    /// accessible until committed.
    ///
    /// # Safety
    /// `size` must be a non-zero multiple of `reserve_align`.
    unsafe fn reserve(&self, hint: *mut u8, size: usize) -> Result<NonNull<u8>, VmError>;

    /// Makes a page-aligned sub-range of a reservation accessible and zeroed.
    ///
    /// # Safety
    /// `addr..addr + size` must lie inside a live reservation and be page aligned.
    unsafe fn commit(&self, addr: NonNull<u8>, size: usize, prot: Protection) -> Result<(), VmError>;

    /// Changes the protection of committed pages.
    ///
    /// # Safety
    /// Same range requirements as [`commit`](Self::commit). Windows only
    /// accepts pages that came from a single reservation.
    unsafe fn protect(&self, addr: NonNull<u8>, size: usize, prot: Protection) -> Result<(), VmError>;

    /// Returns the physical pages, keeping the range reserved.
    ///
    /// # Safety
    /// Same range requirements as [`commit`](Self::commit). No references into
    /// the range may be used afterwards.
    unsafe fn decommit(&self, addr: NonNull<u8>, size: usize) -> Result<(), VmError>;

    /// Releases a reservation.
    ///
    /// Some platforms cannot release part of a reservation and ignore `size`,
    /// so callers must always pass the whole reservation.
    ///
    /// # Safety
    /// `addr` must be the start of a reservation that is not used afterwards.
    unsafe fn release(&self, addr: NonNull<u8>, size: usize) -> Result<(), VmError>;
}

/// The operating system's virtual memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemVm;

unsafe impl VirtualMemory for SystemVm {
    fn page_size(&self) -> Result<PageSize, VmError> {
        sys::page_size()
    }

    unsafe fn reserve(&self, hint: *mut u8, size: usize) -> Result<NonNull<u8>, VmError> {
        sys::reserve(hint, size)
    }

    unsafe fn commit(&self, addr: NonNull<u8>, size: usize, prot: Protection) -> Result<(), VmError> {
        sys::commit(addr, size, prot)
    }

    unsafe fn protect(&self, addr: NonNull<u8>, size: usize, prot: Protection) -> Result<(), VmError> {
        sys::protect(addr, size, prot)
    }

    unsafe fn decommit(&self, addr: NonNull<u8>, size: usize) -> Result<(), VmError> {
        sys::decommit(addr, size)
    }

    unsafe fn release(&self, addr: NonNull<u8>, size: usize) -> Result<(), VmError> {
        sys::release(addr, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_geometry() {
        let geometry = SystemVm.page_size().unwrap();
        assert!(geometry.page_size.is_power_of_two());
        assert!(geometry.reserve_align >= geometry.page_size);
        assert_eq!(geometry.reserve_align % geometry.page_size, 0);
    }

    #[test]
    fn test_commit_is_zeroed_after_decommit() {
        let vm = SystemVm;
        let PageSize { page_size, reserve_align } = vm.page_size().unwrap();
        let size = reserve_align.max(page_size * 2);
        unsafe {
            let base = vm.reserve(core::ptr::null_mut(), size).unwrap();
            vm.commit(base, page_size, Protection::ReadWrite).unwrap();
            base.as_ptr().write_bytes(0xAB, page_size);
            assert_eq!(*base.as_ptr(), 0xAB);

            vm.decommit(base, page_size).unwrap();
            vm.commit(base, page_size, Protection::ReadWrite).unwrap();
            let bytes = core::slice::from_raw_parts(base.as_ptr(), page_size);
            assert!(bytes.iter().all(|&b| b == 0));

            vm.release(base, size).unwrap();
        }
    }
}
