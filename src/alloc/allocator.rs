//! The [`RawAlloc`] plugin interface and the [`AllocError`] it reports.

use crate::config::ConfigError;
use crate::vm::VmError;
use core::alloc::Layout;
use core::fmt;
use core::ptr::{self, NonNull};

/// A pluggable allocator backend.
///
/// Containers take an allocator by `&mut` handle instead of reaching for a
/// global, so the same code can run on the system heap, an arena or a pool.
/// The methods mirror the four requests a backend has to answer: allocate,
/// resize (grow or shrink), free and reset.
///
/// # Safety
///
/// A pointer returned by `allocate`, `grow` or `shrink` must be valid for
/// reads and writes of `layout.size()` bytes, aligned to `layout.align()`,
/// and stay valid until it is passed to `deallocate`, resized, or the
/// allocator is reset or dropped.
pub unsafe trait RawAlloc {
    /// Allocates memory for `layout`. Contents are unspecified.
    ///
    /// # Errors
    /// Returns `AllocError` if the backend cannot satisfy the request.
    fn allocate(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Allocates zeroed memory for `layout`.
    fn allocate_zeroed(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.allocate(layout)?;
        // SAFETY: freshly allocated for layout.size() bytes.
        unsafe { ptr.as_ptr().write_bytes(0, layout.size()) };
        Ok(ptr)
    }

    /// Grows a block, preserving its first `old_layout.size()` bytes.
    ///
    /// # Safety
    /// `ptr` must be a live block of this allocator allocated with `old_layout`,
    /// and `new_layout.size() >= old_layout.size()`.
    unsafe fn grow(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        let new_ptr = self.allocate(new_layout)?;
        ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), old_layout.size());
        self.deallocate(ptr, old_layout);
        Ok(new_ptr)
    }

    /// Shrinks a block, preserving its first `new_layout.size()` bytes.
    ///
    /// # Safety
    /// `ptr` must be a live block of this allocator allocated with `old_layout`,
    /// and `new_layout.size() <= old_layout.size()`.
    unsafe fn shrink(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        let new_ptr = self.allocate(new_layout)?;
        ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), new_layout.size());
        self.deallocate(ptr, old_layout);
        Ok(new_ptr)
    }

    /// Frees a block.
    ///
    /// # Safety
    /// `ptr` must be a live block of this allocator allocated with `layout`.
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout);

    /// Frees every block at once. Backends that cannot do this leave their
    /// blocks alone and return `Ok`.
    fn reset(&mut self) -> Result<(), AllocError> {
        Ok(())
    }
}

unsafe impl<A: RawAlloc + ?Sized> RawAlloc for &mut A {
    fn allocate(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    fn allocate_zeroed(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate_zeroed(layout)
    }

    unsafe fn grow(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        (**self).grow(ptr, old_layout, new_layout)
    }

    unsafe fn shrink(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        (**self).shrink(ptr, old_layout, new_layout)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout)
    }

    fn reset(&mut self) -> Result<(), AllocError> {
        (**self).reset()
    }
}

/// The error type for allocation failures.
///
/// Every variant is recoverable: nothing is retried automatically and the
/// allocator is left as it was before the failing call.
#[derive(Debug)]
pub enum AllocError {
    /// The reserved capacity cannot hold the request.
    Exhausted {
        /// Bytes (arena) or slots (pool) the request needed.
        requested: usize,
        /// Bytes or slots available in the reservation.
        available: usize,
    },
    /// The layout cannot be served by this allocator.
    InvalidLayout,
    /// Construction parameters were rejected.
    Config(ConfigError),
    /// The virtual memory provider failed.
    Vm(VmError),
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { requested, available } => {
                write!(f, "reservation exhausted: {requested} requested, {available} reserved")
            }
            Self::InvalidLayout => f.write_str("layout not supported by this allocator"),
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
            Self::Vm(e) => write!(f, "memory allocation failed: {e}"),
        }
    }
}

impl std::error::Error for AllocError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Vm(e) => Some(e),
            Self::Exhausted { .. } | Self::InvalidLayout => None,
        }
    }
}

impl From<VmError> for AllocError {
    fn from(err: VmError) -> Self {
        Self::Vm(err)
    }
}

impl From<ConfigError> for AllocError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}
