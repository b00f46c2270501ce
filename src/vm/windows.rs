#![cfg(windows)]

use super::{PageSize, Protection, VmError};
use core::ffi::c_void;
use core::ptr::NonNull;
use std::io;
use windows_sys::Win32::Foundation::CloseHandle;
use windows_sys::Win32::System::Memory::{
    CreateFileMappingW, MapViewOfFile, UnmapViewOfFile, VirtualAlloc, VirtualFree, VirtualProtect, FILE_MAP_ALL_ACCESS,
    FILE_MAP_EXECUTE, FILE_MAP_READ, MEMORY_MAPPED_VIEW_ADDRESS, MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE,
    PAGE_NOACCESS,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

pub(super) fn page_size() -> Result<PageSize, VmError> {
    // SAFETY: GetSystemInfo only writes into the provided struct.
    let info = unsafe {
        let mut info: SYSTEM_INFO = core::mem::zeroed();
        GetSystemInfo(&mut info);
        info
    };
    Ok(PageSize {
        page_size: info.dwPageSize as usize,
        reserve_align: info.dwAllocationGranularity as usize,
    })
}

pub(super) unsafe fn reserve(hint: *mut u8, size: usize) -> Result<NonNull<u8>, VmError> {
    let addr = VirtualAlloc(hint.cast::<c_void>(), size, MEM_RESERVE, PAGE_NOACCESS);
    NonNull::new(addr.cast::<u8>()).ok_or_else(|| VmError::Reserve {
        size,
        source: io::Error::last_os_error(),
    })
}

pub(super) unsafe fn commit(addr: NonNull<u8>, size: usize, prot: Protection) -> Result<(), VmError> {
    let res = VirtualAlloc(addr.as_ptr().cast::<c_void>(), size, MEM_COMMIT, prot.to_windows());
    if res.is_null() {
        return Err(VmError::Commit {
            size,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

pub(super) unsafe fn protect(addr: NonNull<u8>, size: usize, prot: Protection) -> Result<(), VmError> {
    let mut old = 0;
    if VirtualProtect(addr.as_ptr().cast::<c_void>(), size, prot.to_windows(), &mut old) == 0 {
        return Err(VmError::last_os(VmError::Protect));
    }
    Ok(())
}

pub(super) unsafe fn decommit(addr: NonNull<u8>, size: usize) -> Result<(), VmError> {
    if VirtualFree(addr.as_ptr().cast::<c_void>(), size, MEM_DECOMMIT) == 0 {
        return Err(VmError::last_os(VmError::Decommit));
    }
    Ok(())
}

/// Windows can only release a whole reservation, so `_size` is ignored.
pub(super) unsafe fn release(addr: NonNull<u8>, _size: usize) -> Result<(), VmError> {
    if VirtualFree(addr.as_ptr().cast::<c_void>(), 0, MEM_RELEASE) == 0 {
        return Err(VmError::last_os(VmError::Release));
    }
    Ok(())
}

/// Returns the view address and the mapping object handle, which has to stay
/// alive until the view is unmapped.
pub(super) unsafe fn map_file(
    file: &std::fs::File,
    prot: Protection,
    aligned_offset: u64,
    size: usize,
) -> Result<(NonNull<u8>, isize), VmError> {
    use std::os::windows::io::AsRawHandle;

    let mapping = CreateFileMappingW(
        file.as_raw_handle() as isize,
        core::ptr::null(),
        prot.to_windows(),
        0,
        0,
        core::ptr::null(),
    );
    if mapping == 0 {
        return Err(VmError::last_os(VmError::Map));
    }

    let access = match prot {
        Protection::None => {
            CloseHandle(mapping);
            return Err(VmError::NoAccess);
        }
        Protection::Read => FILE_MAP_READ,
        Protection::ExecRead => FILE_MAP_READ | FILE_MAP_EXECUTE,
        Protection::ReadWrite => FILE_MAP_ALL_ACCESS,
        Protection::ExecReadWrite => FILE_MAP_ALL_ACCESS | FILE_MAP_EXECUTE,
    };

    let view = MapViewOfFile(
        mapping,
        access,
        (aligned_offset >> 32) as u32,
        aligned_offset as u32,
        size,
    );
    match NonNull::new(view.Value.cast::<u8>()) {
        Some(addr) => Ok((addr, mapping)),
        None => {
            let err = io::Error::last_os_error();
            CloseHandle(mapping);
            Err(VmError::Map(err))
        }
    }
}

pub(super) unsafe fn unmap_file(addr: NonNull<u8>, mapping: isize) -> Result<(), VmError> {
    let view = MEMORY_MAPPED_VIEW_ADDRESS {
        Value: addr.as_ptr().cast::<c_void>(),
    };
    if UnmapViewOfFile(view) == 0 {
        return Err(VmError::last_os(VmError::Unmap));
    }
    if CloseHandle(mapping) == 0 {
        return Err(VmError::last_os(VmError::Unmap));
    }
    Ok(())
}
