//! Error types for paging operations

use x86_64::VirtAddr;

use crate::kernel::boot_info::BootInfoError;

/// Paging operation errors with context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingError {
    /// Address is not canonical and cannot be translated
    NonCanonical {
        /// The raw address
        addr: u64,
    },

    /// No resident kernel section was found to adopt
    NoKernelSections,

    /// Boot information could not be read
    BootInfo(BootInfoError),

    /// A resident kernel section has no page mapping
    ///
    /// The loader did not map part of the kernel image; executing or
    /// touching it would page fault with no handler installed.
    SectionNotMapped {
        /// First unmapped address inside the section
        addr: VirtAddr,
    },
}

impl PagingError {
    /// Returns a human-readable description of the error
    pub fn description(&self) -> &'static str {
        match self {
            Self::NonCanonical { .. } => "address is not canonical",
            Self::NoKernelSections => "no kernel sections in boot information",
            Self::BootInfo(err) => err.description(),
            Self::SectionNotMapped { .. } => "kernel section not mapped",
        }
    }
}

/// Convenience type alias for Results with PagingError
pub type PagingResult<T> = Result<T, PagingError>;

impl core::fmt::Display for PagingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NonCanonical { addr } => write!(f, "{}: 0x{:x}", self.description(), addr),
            Self::SectionNotMapped { addr } => {
                write!(f, "{}: 0x{:x}", self.description(), addr.as_u64())
            }
            Self::BootInfo(err) => write!(f, "{}", err),
            _ => write!(f, "{}", self.description()),
        }
    }
}

impl From<BootInfoError> for PagingError {
    fn from(err: BootInfoError) -> Self {
        PagingError::BootInfo(err)
    }
}
