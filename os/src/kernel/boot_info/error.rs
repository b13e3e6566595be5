//! Errors raised while reading the boot information.

use super::TagType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootInfoError {
    /// A tag the kernel cannot boot without is absent.
    MissingTag(TagType),

    /// The structure does not start on an 8-byte boundary.
    Misaligned { addr: u64 },

    /// Header or a tag runs past the declared or available size.
    Truncated { offset: usize },

    /// Tag walk reached the declared size without an end tag.
    MissingEndTag,

    /// A memory map or ELF sections tag has an impossible shape.
    MalformedTag { tag: TagType, offset: usize },

    /// No section of the kernel image is resident in memory.
    NoKernelSections,
}

impl BootInfoError {
    pub fn description(&self) -> &'static str {
        match self {
            Self::MissingTag(_) => "could not find elf or mmap sections",
            Self::Misaligned { .. } => "boot information misaligned",
            Self::Truncated { .. } => "boot information truncated",
            Self::MissingEndTag => "boot information has no end tag",
            Self::MalformedTag { .. } => "malformed boot information tag",
            Self::NoKernelSections => "no resident kernel sections",
        }
    }

    /// Single-character code printed next to the description on a fatal stop.
    pub fn code(&self) -> char {
        match self {
            Self::MissingTag(_) => 'S',
            Self::Misaligned { .. } => 'A',
            Self::Truncated { .. } => 'T',
            Self::MissingEndTag => 'E',
            Self::MalformedTag { .. } => 'M',
            Self::NoKernelSections => 'K',
        }
    }
}

impl core::fmt::Display for BootInfoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MissingTag(tag) => write!(f, "{}: {} tag missing", self.description(), tag),
            Self::Misaligned { addr } => write!(f, "{}: {:#x}", self.description(), addr),
            Self::Truncated { offset } => write!(f, "{} at offset {}", self.description(), offset),
            Self::MalformedTag { tag, offset } => {
                write!(f, "{}: {} at offset {}", self.description(), tag, offset)
            }
            _ => write!(f, "{}", self.description()),
        }
    }
}
