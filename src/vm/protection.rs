use serde::{Deserialize, Serialize};

/// What committed pages may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protection {
    /// Any access faults.
    None,
    /// Read only.
    Read,
    /// Read and write.
    #[default]
    ReadWrite,
    /// Execute and read.
    ExecRead,
    /// Execute, read and write.
    ExecReadWrite,
}

impl Protection {
    /// Whether the pages can be read.
    pub const fn is_readable(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether the pages can be written.
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::ReadWrite | Self::ExecReadWrite)
    }

    /// Whether code on the pages can be executed.
    pub const fn is_executable(self) -> bool {
        matches!(self, Self::ExecRead | Self::ExecReadWrite)
    }

    #[cfg(unix)]
    pub(crate) const fn to_unix(self) -> libc::c_int {
        match self {
            Self::None => libc::PROT_NONE,
            Self::Read => libc::PROT_READ,
            Self::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
            Self::ExecRead => libc::PROT_EXEC | libc::PROT_READ,
            Self::ExecReadWrite => libc::PROT_EXEC | libc::PROT_READ | libc::PROT_WRITE,
        }
    }

    #[cfg(windows)]
    pub(crate) const fn to_windows(self) -> windows_sys::Win32::System::Memory::PAGE_PROTECTION_FLAGS {
        use windows_sys::Win32::System::Memory::{
            PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_NOACCESS, PAGE_READONLY, PAGE_READWRITE,
        };
        match self {
            Self::None => PAGE_NOACCESS,
            Self::Read => PAGE_READONLY,
            Self::ReadWrite => PAGE_READWRITE,
            Self::ExecRead => PAGE_EXECUTE_READ,
            Self::ExecReadWrite => PAGE_EXECUTE_READWRITE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_flags() {
        assert!(!Protection::None.is_readable());
        assert!(Protection::Read.is_readable());
        assert!(!Protection::Read.is_writable());
        assert!(Protection::ReadWrite.is_writable());
        assert!(Protection::ExecRead.is_executable());
        assert!(!Protection::ExecRead.is_writable());
        assert!(Protection::ExecReadWrite.is_writable());
        assert_eq!(Protection::default(), Protection::ReadWrite);
    }
}
