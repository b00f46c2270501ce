use core::fmt;
use std::io;

/// Failure reported by a [`VirtualMemory`](super::VirtualMemory) provider.
///
/// Every OS-level variant carries the error captured right after the failing
/// call (`errno` on Unix, `GetLastError` on Windows).
#[derive(Debug)]
pub enum VmError {
    /// The page size could not be queried.
    PageSize(io::Error),
    /// Address space could not be reserved.
    Reserve {
        /// Requested size in bytes.
        size: usize,
        /// OS error.
        source: io::Error,
    },
    /// Pages could not be committed.
    Commit {
        /// Requested size in bytes.
        size: usize,
        /// OS error.
        source: io::Error,
    },
    /// Pages could not be decommitted.
    Decommit(io::Error),
    /// Page protection could not be changed.
    Protect(io::Error),
    /// The reservation could not be released.
    Release(io::Error),
    /// A file could not be mapped.
    Map(io::Error),
    /// A file mapping could not be removed.
    Unmap(io::Error),
    /// An address or size was not aligned as the provider requires.
    Misaligned {
        /// The offending address or size.
        value: usize,
        /// The alignment it had to satisfy.
        align: usize,
    },
    /// A range fell outside the reservation or file it was applied to.
    OutOfRange {
        /// Start of the range, relative to the reservation base or file start.
        offset: usize,
        /// Length of the range.
        len: usize,
        /// Size of the reservation or file.
        reserved: usize,
    },
    /// `Protection::None` was requested where access is mandatory.
    NoAccess,
}

impl VmError {
    pub(crate) fn last_os(kind: fn(io::Error) -> Self) -> Self {
        kind(io::Error::last_os_error())
    }

    /// Returns the underlying OS error, if there is one.
    pub fn os_error(&self) -> Option<&io::Error> {
        match self {
            Self::PageSize(e)
            | Self::Decommit(e)
            | Self::Protect(e)
            | Self::Release(e)
            | Self::Map(e)
            | Self::Unmap(e) => Some(e),
            Self::Reserve { source, .. } | Self::Commit { source, .. } => Some(source),
            Self::Misaligned { .. } | Self::OutOfRange { .. } | Self::NoAccess => None,
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageSize(e) => write!(f, "failed to query page size: {e}"),
            Self::Reserve { size, source } => {
                write!(f, "failed to reserve {size} bytes of address space: {source}")
            }
            Self::Commit { size, source } => write!(f, "failed to commit {size} bytes: {source}"),
            Self::Decommit(e) => write!(f, "failed to decommit pages: {e}"),
            Self::Protect(e) => write!(f, "failed to change page protection: {e}"),
            Self::Release(e) => write!(f, "failed to release address space: {e}"),
            Self::Map(e) => write!(f, "failed to map file: {e}"),
            Self::Unmap(e) => write!(f, "failed to unmap file: {e}"),
            Self::Misaligned { value, align } => {
                write!(f, "{value:#x} is not aligned to {align:#x}")
            }
            Self::OutOfRange { offset, len, reserved } => write!(
                f,
                "range {offset:#x}..{:#x} is outside the {reserved:#x} bytes available",
                offset.saturating_add(*len)
            ),
            Self::NoAccess => f.write_str("a mapping with no access was requested"),
        }
    }
}

impl std::error::Error for VmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.os_error().map(|e| e as &(dyn std::error::Error + 'static))
    }
}
