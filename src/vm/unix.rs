#![cfg(unix)]

use super::{PageSize, Protection, VmError};
use core::ptr::{self, NonNull};
use libc::c_void;
use std::io;

pub(super) fn page_size() -> Result<PageSize, VmError> {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        return Err(VmError::last_os(VmError::PageSize));
    }
    let size = size as usize;
    Ok(PageSize {
        page_size: size,
        reserve_align: size,
    })
}

/// Maps `size` bytes with no access so nothing is backed until committed.
pub(super) unsafe fn reserve(hint: *mut u8, size: usize) -> Result<NonNull<u8>, VmError> {
    let addr = libc::mmap(
        hint.cast::<c_void>(),
        size,
        libc::PROT_NONE,
        libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_NORESERVE,
        -1,
        0,
    );
    if addr == libc::MAP_FAILED {
        return Err(VmError::Reserve {
            size,
            source: io::Error::last_os_error(),
        });
    }
    NonNull::new(addr.cast::<u8>()).ok_or_else(|| VmError::Reserve {
        size,
        source: io::Error::from(io::ErrorKind::AddrNotAvailable),
    })
}

/// Pages are backed lazily by the kernel, so committing is granting access
/// and hinting that the range is about to be touched.
pub(super) unsafe fn commit(addr: NonNull<u8>, size: usize, prot: Protection) -> Result<(), VmError> {
    let addr = addr.as_ptr().cast::<c_void>();
    if libc::mprotect(addr, size, prot.to_unix()) != 0 {
        return Err(VmError::Commit {
            size,
            source: io::Error::last_os_error(),
        });
    }
    if libc::madvise(addr, size, libc::MADV_WILLNEED) != 0 {
        return Err(VmError::Commit {
            size,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

pub(super) unsafe fn protect(addr: NonNull<u8>, size: usize, prot: Protection) -> Result<(), VmError> {
    if libc::mprotect(addr.as_ptr().cast::<c_void>(), size, prot.to_unix()) != 0 {
        return Err(VmError::last_os(VmError::Protect));
    }
    Ok(())
}

/// `MADV_DONTNEED` on a private anonymous mapping drops the pages; the next
/// access after recommitting sees zero-filled memory.
pub(super) unsafe fn decommit(addr: NonNull<u8>, size: usize) -> Result<(), VmError> {
    let addr = addr.as_ptr().cast::<c_void>();
    if libc::madvise(addr, size, libc::MADV_DONTNEED) != 0 {
        return Err(VmError::last_os(VmError::Decommit));
    }
    if libc::mprotect(addr, size, libc::PROT_NONE) != 0 {
        return Err(VmError::last_os(VmError::Decommit));
    }
    Ok(())
}

pub(super) unsafe fn release(addr: NonNull<u8>, size: usize) -> Result<(), VmError> {
    if libc::munmap(addr.as_ptr().cast::<c_void>(), size) != 0 {
        return Err(VmError::last_os(VmError::Release));
    }
    Ok(())
}

pub(super) unsafe fn map_file(
    file: &std::fs::File,
    prot: Protection,
    aligned_offset: u64,
    size: usize,
) -> Result<NonNull<u8>, VmError> {
    use std::os::unix::io::AsRawFd;

    let offset = libc::off_t::try_from(aligned_offset)
        .map_err(|_| VmError::Map(io::Error::from(io::ErrorKind::InvalidInput)))?;
    let addr = libc::mmap(
        ptr::null_mut(),
        size,
        prot.to_unix(),
        libc::MAP_SHARED,
        file.as_raw_fd(),
        offset,
    );
    if addr == libc::MAP_FAILED {
        return Err(VmError::last_os(VmError::Map));
    }
    NonNull::new(addr.cast::<u8>()).ok_or_else(|| VmError::Map(io::Error::from(io::ErrorKind::AddrNotAvailable)))
}

pub(super) unsafe fn unmap_file(addr: NonNull<u8>, size: usize) -> Result<(), VmError> {
    if libc::munmap(addr.as_ptr().cast::<c_void>(), size) != 0 {
        return Err(VmError::last_os(VmError::Unmap));
    }
    Ok(())
}
