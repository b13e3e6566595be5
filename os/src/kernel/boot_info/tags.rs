//! Tag records of the multiboot2 boot information layout.

use super::BootInfoError;

pub const HEADER_SIZE: usize = 8;
pub const TAG_HEADER_SIZE: usize = 8;
pub const TAG_ALIGN: usize = 8;

pub const MEMORY_MAP_HEADER_SIZE: usize = 8;
pub const MEMORY_MAP_ENTRY_SIZE: usize = 24;

pub const ELF_SECTIONS_HEADER_SIZE: usize = 12;
pub const ELF_SECTION_HEADER_SIZE: usize = 64;

/// ELF section type of the mandatory index-0 placeholder.
pub const SHT_NULL: u32 = 0;
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_NOBITS: u32 = 8;

pub const SHF_WRITE: u64 = 0x1;
pub const SHF_ALLOC: u64 = 0x2;
pub const SHF_EXECINSTR: u64 = 0x4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagType {
    End,
    MemoryMap,
    ElfSections,
    Other(u32),
}

impl TagType {
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => TagType::End,
            6 => TagType::MemoryMap,
            9 => TagType::ElfSections,
            other => TagType::Other(other),
        }
    }

    pub const fn raw(self) -> u32 {
        match self {
            TagType::End => 0,
            TagType::MemoryMap => 6,
            TagType::ElfSections => 9,
            TagType::Other(raw) => raw,
        }
    }
}

impl core::fmt::Display for TagType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TagType::End => f.write_str("end"),
            TagType::MemoryMap => f.write_str("memory map"),
            TagType::ElfSections => f.write_str("ELF sections"),
            TagType::Other(raw) => write!(f, "tag {}", raw),
        }
    }
}

#[inline]
pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes(raw.try_into().ok()?))
}

#[inline]
pub(crate) fn read_u64(bytes: &[u8], offset: usize) -> Option<u64> {
    let raw = bytes.get(offset..offset.checked_add(8)?)?;
    Some(u64::from_le_bytes(raw.try_into().ok()?))
}

#[inline]
pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// One tag: its type and the bytes after the 8-byte tag header.
#[derive(Debug, Clone, Copy)]
pub struct Tag<'a> {
    pub typ: TagType,
    pub offset: usize,
    pub payload: &'a [u8],
}

impl<'a> Tag<'a> {
    /// Checks the payload shape of the tag kinds this kernel reads.
    pub(crate) fn check(&self) -> Result<(), BootInfoError> {
        let malformed = BootInfoError::MalformedTag { tag: self.typ, offset: self.offset };
        match self.typ {
            TagType::MemoryMap => {
                let entry_size = read_u32(self.payload, 0).ok_or(malformed)? as usize;
                if entry_size < MEMORY_MAP_ENTRY_SIZE || self.payload.len() < MEMORY_MAP_HEADER_SIZE {
                    return Err(malformed);
                }
            }
            TagType::ElfSections => {
                let num = read_u32(self.payload, 0).ok_or(malformed)? as usize;
                let entsize = read_u32(self.payload, 4).ok_or(malformed)? as usize;
                if entsize < ELF_SECTION_HEADER_SIZE {
                    return Err(malformed);
                }
                let needed = num
                    .checked_mul(entsize)
                    .and_then(|n| n.checked_add(ELF_SECTIONS_HEADER_SIZE))
                    .ok_or(malformed)?;
                if needed > self.payload.len() {
                    return Err(malformed);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Walks tags from the first one after the header to the end tag.
///
/// One pass; restarting means asking the `BootInformation` again.
#[derive(Clone)]
pub struct TagIter<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> TagIter<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        TagIter { bytes, offset: HEADER_SIZE }
    }
}

impl<'a> Iterator for TagIter<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        let offset = self.offset;
        let typ = TagType::from_raw(read_u32(self.bytes, offset)?);
        let size = read_u32(self.bytes, offset + 4)? as usize;
        if typ == TagType::End || size < TAG_HEADER_SIZE {
            self.offset = self.bytes.len();
            return None;
        }
        let payload = self.bytes.get(offset + TAG_HEADER_SIZE..offset + size)?;
        self.offset = align_up(offset + size, TAG_ALIGN);
        Some(Tag { typ, offset, payload })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    Available,
    Reserved,
    AcpiReclaimable,
    AcpiNvs,
    Defective,
    Unknown(u32),
}

impl MemoryKind {
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => MemoryKind::Available,
            2 => MemoryKind::Reserved,
            3 => MemoryKind::AcpiReclaimable,
            4 => MemoryKind::AcpiNvs,
            5 => MemoryKind::Defective,
            other => MemoryKind::Unknown(other),
        }
    }

    pub const fn raw(self) -> u32 {
        match self {
            MemoryKind::Available => 1,
            MemoryKind::Reserved => 2,
            MemoryKind::AcpiReclaimable => 3,
            MemoryKind::AcpiNvs => 4,
            MemoryKind::Defective => 5,
            MemoryKind::Unknown(raw) => raw,
        }
    }
}

/// A physical memory range from the memory map tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: u64,
    pub length: u64,
    pub kind: MemoryKind,
}

impl MemoryRegion {
    pub const fn new(base: u64, length: u64, kind: MemoryKind) -> Self {
        MemoryRegion { base, length, kind }
    }

    pub const fn available(base: u64, length: u64) -> Self {
        Self::new(base, length, MemoryKind::Available)
    }

    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.length)
    }

    pub fn is_available(&self) -> bool {
        self.kind == MemoryKind::Available
    }

    pub(crate) fn parse(entry: &[u8]) -> Option<Self> {
        Some(MemoryRegion {
            base: read_u64(entry, 0)?,
            length: read_u64(entry, 8)?,
            kind: MemoryKind::from_raw(read_u32(entry, 16)?),
        })
    }

    pub(crate) fn encode(&self) -> [u8; MEMORY_MAP_ENTRY_SIZE] {
        let mut out = [0u8; MEMORY_MAP_ENTRY_SIZE];
        out[0..8].copy_from_slice(&self.base.to_le_bytes());
        out[8..16].copy_from_slice(&self.length.to_le_bytes());
        out[16..20].copy_from_slice(&self.kind.raw().to_le_bytes());
        out
    }
}

pub struct MemoryRegionIter<'a> {
    entries: &'a [u8],
    entry_size: usize,
}

impl<'a> MemoryRegionIter<'a> {
    pub(crate) fn new(tag: &Tag<'a>) -> Self {
        let entry_size = read_u32(tag.payload, 0).unwrap_or(0) as usize;
        let entries = tag.payload.get(MEMORY_MAP_HEADER_SIZE..).unwrap_or(&[]);
        MemoryRegionIter { entries, entry_size }
    }
}

impl<'a> Iterator for MemoryRegionIter<'a> {
    type Item = MemoryRegion;

    fn next(&mut self) -> Option<MemoryRegion> {
        if self.entry_size < MEMORY_MAP_ENTRY_SIZE || self.entries.len() < self.entry_size {
            return None;
        }
        let (entry, rest) = self.entries.split_at(self.entry_size);
        self.entries = rest;
        MemoryRegion::parse(entry)
    }
}

/// One section of the loaded kernel image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSection {
    pub name_index: u32,
    pub kind: u32,
    pub flags: u64,
    pub addr: u64,
    pub size: u64,
}

impl KernelSection {
    pub const fn new(kind: u32, flags: u64, addr: u64, size: u64) -> Self {
        KernelSection { name_index: 0, kind, flags, addr, size }
    }

    pub fn end(&self) -> u64 {
        self.addr.saturating_add(self.size)
    }

    pub fn is_allocated(&self) -> bool {
        self.flags & SHF_ALLOC != 0
    }

    /// Placed in memory by the loader. Sections kept only in the file
    /// (symbols, strings, debug info) report address 0.
    pub fn is_resident(&self) -> bool {
        self.addr != 0
    }

    pub(crate) fn parse(header: &[u8]) -> Option<Self> {
        Some(KernelSection {
            name_index: read_u32(header, 0)?,
            kind: read_u32(header, 4)?,
            flags: read_u64(header, 8)?,
            addr: read_u64(header, 16)?,
            size: read_u64(header, 32)?,
        })
    }

    /// ELF64 section header carrying this section's fields.
    pub fn to_header(&self) -> [u8; ELF_SECTION_HEADER_SIZE] {
        let mut out = [0u8; ELF_SECTION_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.name_index.to_le_bytes());
        out[4..8].copy_from_slice(&self.kind.to_le_bytes());
        out[8..16].copy_from_slice(&self.flags.to_le_bytes());
        out[16..24].copy_from_slice(&self.addr.to_le_bytes());
        out[32..40].copy_from_slice(&self.size.to_le_bytes());
        out
    }
}

/// Section headers of the ELF sections tag, `SHT_NULL` entries skipped.
pub struct KernelSectionIter<'a> {
    headers: &'a [u8],
    entsize: usize,
    remaining: usize,
}

impl<'a> KernelSectionIter<'a> {
    pub(crate) fn new(tag: &Tag<'a>) -> Self {
        let num = read_u32(tag.payload, 0).unwrap_or(0) as usize;
        let entsize = read_u32(tag.payload, 4).unwrap_or(0) as usize;
        let headers = tag.payload.get(ELF_SECTIONS_HEADER_SIZE..).unwrap_or(&[]);
        KernelSectionIter { headers, entsize, remaining: num }
    }
}

impl<'a> Iterator for KernelSectionIter<'a> {
    type Item = KernelSection;

    fn next(&mut self) -> Option<KernelSection> {
        while self.remaining > 0 {
            if self.entsize < ELF_SECTION_HEADER_SIZE || self.headers.len() < self.entsize {
                return None;
            }
            let (header, rest) = self.headers.split_at(self.entsize);
            self.headers = rest;
            self.remaining -= 1;
            match KernelSection::parse(header) {
                Some(section) if section.kind != SHT_NULL => return Some(section),
                Some(_) => continue,
                None => return None,
            }
        }
        None
    }
}
