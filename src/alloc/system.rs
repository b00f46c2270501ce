//! The process heap behind the [`RawAlloc`] interface.

use super::allocator::{AllocError, RawAlloc};
use core::alloc::Layout;
use core::ptr::{self, NonNull};
use std::alloc::{alloc, alloc_zeroed, dealloc, realloc};

/// Forwards to `std::alloc`. Reset is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAlloc;

/// Zero-sized requests never touch the heap.
fn dangling(layout: Layout) -> NonNull<u8> {
    // SAFETY: alignments are non-zero.
    unsafe { NonNull::new_unchecked(layout.align() as *mut u8) }
}

unsafe impl RawAlloc for SystemAlloc {
    fn allocate(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }
        // SAFETY: non-zero size.
        NonNull::new(unsafe { alloc(layout) }).ok_or(AllocError::Exhausted {
            requested: layout.size(),
            available: 0,
        })
    }

    fn allocate_zeroed(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }
        // SAFETY: non-zero size.
        NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or(AllocError::Exhausted {
            requested: layout.size(),
            available: 0,
        })
    }

    unsafe fn grow(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        self.resize(ptr, old_layout, new_layout)
    }

    unsafe fn shrink(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        self.resize(ptr, old_layout, new_layout)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            dealloc(ptr.as_ptr(), layout);
        }
    }
}

impl SystemAlloc {
    /// `realloc` keeps the old alignment, so an alignment change goes through
    /// a fresh block and a copy.
    unsafe fn resize(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        if old_layout.size() == 0 || new_layout.size() == 0 || old_layout.align() != new_layout.align() {
            let new_ptr = self.allocate(new_layout)?;
            ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_ptr.as_ptr(),
                old_layout.size().min(new_layout.size()),
            );
            self.deallocate(ptr, old_layout);
            return Ok(new_ptr);
        }
        NonNull::new(realloc(ptr.as_ptr(), old_layout, new_layout.size())).ok_or(AllocError::Exhausted {
            requested: new_layout.size(),
            available: 0,
        })
    }
}
