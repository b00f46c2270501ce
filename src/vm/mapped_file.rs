use super::{sys, Protection, SystemVm, VirtualMemory, VmError};
use crate::alloc::page::align_up;
use crate::log::{vm_debug, vm_warn};
use core::ptr::NonNull;
use std::fs::File;

/// A file mapped into the address space.
///
/// The requested offset does not have to be aligned: the mapping starts at
/// the offset rounded down to the reservation alignment and the returned view
/// begins at the requested byte. Unmapped on drop.
pub struct MappedFile {
    map_base: NonNull<u8>,
    map_len: usize,
    view_offset: usize,
    len: usize,
    prot: Protection,
    #[cfg(windows)]
    mapping: isize,
}

impl MappedFile {
    /// Maps `len` bytes of `file` starting at `offset`.
    ///
    /// `prot` must agree with how `file` was opened. [`Protection::None`] is
    /// rejected, as is a view reaching past the end of the file. Truncating
    /// the file while it is mapped is not detected.
    pub fn map(file: &File, prot: Protection, offset: u64, len: usize) -> Result<Self, VmError> {
        if prot == Protection::None {
            return Err(VmError::NoAccess);
        }
        let file_len = file.metadata().map_err(VmError::Map)?.len();
        let end = offset.checked_add(len as u64);
        if end.map_or(true, |end| end > file_len) {
            return Err(VmError::OutOfRange {
                offset: usize::try_from(offset).unwrap_or(usize::MAX),
                len,
                reserved: usize::try_from(file_len).unwrap_or(usize::MAX),
            });
        }
        let geometry = SystemVm.page_size()?;
        let reserve_align = geometry.reserve_align as u64;
        let aligned_offset = offset - offset % reserve_align;
        let view_offset = (offset - aligned_offset) as usize;

        let map_len = view_offset
            .checked_add(len.max(1))
            .and_then(|n| align_up(n, geometry.page_size))
            .ok_or(VmError::Misaligned {
                value: len,
                align: geometry.page_size,
            })?;

        // SAFETY: the mapping is fresh and owned by the returned value.
        #[cfg(unix)]
        let map_base = unsafe { sys::map_file(file, prot, aligned_offset, map_len)? };
        #[cfg(windows)]
        let (map_base, mapping) = unsafe { sys::map_file(file, prot, aligned_offset, map_len)? };

        vm_debug!(offset, len, map_len, ?prot, "mapped file");
        Ok(Self {
            map_base,
            map_len,
            view_offset,
            len,
            prot,
            #[cfg(windows)]
            mapping,
        })
    }

    /// Pointer to the byte at the requested offset.
    pub fn as_ptr(&self) -> *const u8 {
        // SAFETY: view_offset < reserve_align <= map_len.
        unsafe { self.map_base.as_ptr().add(self.view_offset) }
    }

    /// Mutable pointer to the byte at the requested offset.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        // SAFETY: see as_ptr.
        unsafe { self.map_base.as_ptr().add(self.view_offset) }
    }

    /// Length of the requested view.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the requested view is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Protection the view was mapped with.
    pub fn protection(&self) -> Protection {
        self.prot
    }

    /// The mapped bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: readable by construction (None is rejected in map) and
        // `len` bytes past the view start are inside the mapping.
        unsafe { core::slice::from_raw_parts(self.as_ptr(), self.len) }
    }

    /// The mapped bytes, mutably. `None` unless mapped writable.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        if !self.prot.is_writable() {
            return None;
        }
        let len = self.len;
        // SAFETY: writable mapping, exclusive borrow of self.
        Some(unsafe { core::slice::from_raw_parts_mut(self.as_mut_ptr(), len) })
    }

    /// Unmaps the file, reporting failure instead of logging it.
    pub fn unmap(self) -> Result<(), VmError> {
        let this = core::mem::ManuallyDrop::new(self);
        // SAFETY: the mapping is not used after this.
        unsafe { this.unmap_raw() }
    }

    unsafe fn unmap_raw(&self) -> Result<(), VmError> {
        #[cfg(unix)]
        {
            sys::unmap_file(self.map_base, self.map_len)
        }
        #[cfg(windows)]
        {
            sys::unmap_file(self.map_base, self.mapping)
        }
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        // SAFETY: the mapping is not used after drop.
        if let Err(_err) = unsafe { self.unmap_raw() } {
            vm_warn!(err = %_err, "failed to unmap file");
        }
    }
}

impl core::fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MappedFile")
            .field("ptr", &self.as_ptr())
            .field("len", &self.len)
            .field("prot", &self.prot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch_file(name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("vmpool-{}-{name}", std::process::id()));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn test_map_unaligned_offset() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let path = scratch_file("unaligned", &data);
        let file = File::open(&path).unwrap();

        let mapped = MappedFile::map(&file, Protection::Read, 4097, 100).unwrap();
        assert_eq!(mapped.len(), 100);
        assert_eq!(mapped.as_slice(), &data[4097..4197]);
        assert_eq!(mapped.map_base.as_ptr() as usize % SystemVm.page_size().unwrap().page_size, 0);
        mapped.unmap().unwrap();

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_map_past_end_of_file_is_rejected() {
        let path = scratch_file("short", b"hello");
        let file = File::open(&path).unwrap();

        let err = MappedFile::map(&file, Protection::Read, 0, 3 * 4096 * 4).unwrap_err();
        match err {
            VmError::OutOfRange { offset, len, reserved } => {
                assert_eq!(offset, 0);
                assert_eq!(len, 3 * 4096 * 4);
                assert_eq!(reserved, 5);
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(matches!(
            MappedFile::map(&file, Protection::Read, 3, 3),
            Err(VmError::OutOfRange { .. })
        ));
        assert!(matches!(
            MappedFile::map(&file, Protection::Read, u64::MAX, 1),
            Err(VmError::OutOfRange { .. })
        ));

        // a view ending exactly at the end of the file is fine
        let tail = MappedFile::map(&file, Protection::Read, 2, 3).unwrap();
        assert_eq!(tail.as_slice(), b"llo");
        drop(tail);

        drop(file);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_map_rejects_no_access() {
        let path = scratch_file("noaccess", b"hello");
        let file = File::open(&path).unwrap();
        assert!(matches!(
            MappedFile::map(&file, Protection::None, 0, 5),
            Err(VmError::NoAccess)
        ));
        std::fs::remove_file(path).unwrap();
    }
}
