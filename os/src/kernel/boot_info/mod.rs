//! Boot information scanner.
//!
//! Reads the bootloader's tag list (multiboot2 layout): an 8-byte header
//! holding the total size, then 8-byte aligned `{type, size, payload}` tags
//! closed by an end tag. Only the memory map and the kernel's ELF section
//! headers matter here; every other tag is skipped whatever its position.

mod error;
mod tags;
mod writer;

pub use error::BootInfoError;
pub use tags::{
    KernelSection, KernelSectionIter, MemoryKind, MemoryRegion, MemoryRegionIter, Tag, TagIter,
    TagType, ELF_SECTION_HEADER_SIZE, SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_NOBITS,
    SHT_NULL, SHT_PROGBITS,
};
pub use writer::{BufferFull, TagListWriter};

use tags::{align_up, read_u32, HEADER_SIZE, TAG_ALIGN, TAG_HEADER_SIZE};

/// Half-open address range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub start: u64,
    pub end: u64,
}

impl AddressRange {
    pub const fn new(start: u64, end: u64) -> Self {
        AddressRange { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.end
    }
}

/// Running min/max over kernel sections.
///
/// The start is seeded with `u64::MAX` so the first real section lowers it.
#[derive(Debug, Clone, Copy)]
struct SpanAccumulator {
    start: u64,
    end: u64,
    sections: usize,
}

impl SpanAccumulator {
    const SEED: Self = SpanAccumulator { start: u64::MAX, end: 0, sections: 0 };

    fn add(self, section: &KernelSection) -> Self {
        SpanAccumulator {
            start: self.start.min(section.addr),
            end: self.end.max(section.end()),
            sections: self.sections + 1,
        }
    }

    fn finish(self) -> Result<AddressRange, BootInfoError> {
        if self.sections == 0 {
            return Err(BootInfoError::NoKernelSections);
        }
        Ok(AddressRange::new(self.start, self.end))
    }
}

/// A checked view of the bootloader's tag list. Read-only.
#[derive(Clone, Copy)]
pub struct BootInformation<'a> {
    bytes: &'a [u8],
}

impl<'a> BootInformation<'a> {
    /// Checks the header and walks every tag once.
    ///
    /// `bytes` may be longer than the declared size; the excess is ignored.
    pub fn new(bytes: &'a [u8]) -> Result<Self, BootInfoError> {
        let addr = bytes.as_ptr() as u64;
        if addr % TAG_ALIGN as u64 != 0 {
            return Err(BootInfoError::Misaligned { addr });
        }
        let total = read_u32(bytes, 0).ok_or(BootInfoError::Truncated { offset: 0 })? as usize;
        if total < HEADER_SIZE + TAG_HEADER_SIZE {
            return Err(BootInfoError::Truncated { offset: 0 });
        }
        let bytes = bytes
            .get(..total)
            .ok_or(BootInfoError::Truncated { offset: bytes.len() })?;

        let mut offset = HEADER_SIZE;
        loop {
            if offset + TAG_HEADER_SIZE > total {
                return Err(BootInfoError::MissingEndTag);
            }
            let typ = TagType::from_raw(read_u32(bytes, offset).unwrap_or(0));
            let size = read_u32(bytes, offset + 4).unwrap_or(0) as usize;
            if size < TAG_HEADER_SIZE || offset + size > total {
                return Err(BootInfoError::Truncated { offset });
            }
            if typ == TagType::End {
                break;
            }
            let tag = Tag {
                typ,
                offset,
                payload: &bytes[offset + TAG_HEADER_SIZE..offset + size],
            };
            tag.check()?;
            offset = align_up(offset + size, TAG_ALIGN);
        }

        Ok(BootInformation { bytes })
    }

    /// Reads the structure the loader left at `ptr`.
    ///
    /// # Safety
    /// `ptr` must point to a boot information structure that stays mapped and
    /// unmodified for `'a`.
    pub unsafe fn load(ptr: *const u8) -> Result<Self, BootInfoError> {
        if ptr as usize % TAG_ALIGN != 0 {
            return Err(BootInfoError::Misaligned { addr: ptr as u64 });
        }
        let total = core::ptr::read(ptr as *const u32) as usize;
        Self::new(core::slice::from_raw_parts(ptr, total.max(HEADER_SIZE)))
    }

    /// Declared size of the whole structure, header included.
    pub fn total_size(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn tags(&self) -> TagIter<'a> {
        TagIter::new(self.bytes)
    }

    fn find(&self, typ: TagType) -> Option<Tag<'a>> {
        self.tags().find(|tag| tag.typ == typ)
    }

    /// Fails with `MissingTag` unless both the ELF sections and the memory
    /// map are present.
    pub fn validate(&self) -> Result<(), BootInfoError> {
        for typ in [TagType::ElfSections, TagType::MemoryMap] {
            if self.find(typ).is_none() {
                return Err(BootInfoError::MissingTag(typ));
            }
        }
        Ok(())
    }

    pub fn memory_regions(&self) -> Result<MemoryRegionIter<'a>, BootInfoError> {
        self.find(TagType::MemoryMap)
            .map(|tag| MemoryRegionIter::new(&tag))
            .ok_or(BootInfoError::MissingTag(TagType::MemoryMap))
    }

    pub fn kernel_sections(&self) -> Result<KernelSectionIter<'a>, BootInfoError> {
        self.find(TagType::ElfSections)
            .map(|tag| KernelSectionIter::new(&tag))
            .ok_or(BootInfoError::MissingTag(TagType::ElfSections))
    }

    /// Calls `visit` for every memory region; returns how many were visited.
    pub fn for_each_region<F>(&self, mut visit: F) -> Result<usize, BootInfoError>
    where
        F: FnMut(&MemoryRegion),
    {
        Ok(self.memory_regions()?.inspect(|region| visit(region)).count())
    }

    /// Calls `visit` for every kernel section; returns how many were visited.
    pub fn for_each_section<F>(&self, mut visit: F) -> Result<usize, BootInfoError>
    where
        F: FnMut(&KernelSection),
    {
        Ok(self.kernel_sections()?.inspect(|section| visit(section)).count())
    }

    /// `(min section start, max section end)` over resident sections.
    pub fn kernel_span(&self) -> Result<AddressRange, BootInfoError> {
        self.kernel_sections()?
            .filter(KernelSection::is_resident)
            .fold(SpanAccumulator::SEED, |acc, section| acc.add(&section))
            .finish()
    }

    /// Where this structure itself lives.
    pub fn span(&self) -> AddressRange {
        let start = self.bytes.as_ptr() as u64;
        AddressRange::new(start, start + self.bytes.len() as u64)
    }
}

impl core::fmt::Debug for BootInformation<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootInformation")
            .field("addr", &(self.bytes.as_ptr() as u64))
            .field("total_size", &self.total_size())
            .finish()
    }
}
