//! Loader handoff: re-expresses the `bootloader_api` boot info as a tag list.
//!
//! The memory map comes straight from the loader. Kernel sections are the
//! section headers of the kernel ELF file, which the loader leaves in
//! physical memory, with allocated sections moved by the load offset.

use core::sync::atomic::{AtomicBool, Ordering};

use bootloader_api::info::MemoryRegionKind;

use super::boot_info::{
    BootInfoError, BootInformation, BufferFull, KernelSection, MemoryKind, MemoryRegion,
    TagListWriter, ELF_SECTION_HEADER_SIZE,
};

const HANDOFF_SIZE: usize = 8192;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const ELF_CLASS_64: u8 = 2;
const ELF_DATA_LSB: u8 = 1;
const E_SHOFF: usize = 0x28;
const E_SHENTSIZE: usize = 0x3A;
const E_SHNUM: usize = 0x3C;
const E_SHSTRNDX: usize = 0x3E;
const SH_ADDR: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffError {
    /// Physical memory is not mapped, so the kernel file is unreachable.
    NoPhysicalMapping,
    /// The in-memory kernel file is not a little-endian ELF64 image.
    BadKernelImage,
    /// The tag list does not fit the handoff buffer.
    BufferFull,
    /// The handoff was already built once.
    AlreadyBuilt,
    /// The produced tag list failed to parse.
    Invalid(BootInfoError),
}

impl HandoffError {
    pub fn description(&self) -> &'static str {
        match self {
            Self::NoPhysicalMapping => "loader did not map physical memory",
            Self::BadKernelImage => "kernel image is not ELF64",
            Self::BufferFull => "boot information exceeds handoff buffer",
            Self::AlreadyBuilt => "boot information already handed off",
            Self::Invalid(err) => err.description(),
        }
    }

    pub fn code(&self) -> char {
        match self {
            Self::NoPhysicalMapping => 'P',
            Self::BadKernelImage => 'I',
            Self::BufferFull => 'F',
            Self::AlreadyBuilt => 'B',
            Self::Invalid(err) => err.code(),
        }
    }
}

impl core::fmt::Display for HandoffError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Invalid(err) => write!(f, "{}", err),
            _ => write!(f, "{}", self.description()),
        }
    }
}

impl From<BufferFull> for HandoffError {
    fn from(_: BufferFull) -> Self {
        HandoffError::BufferFull
    }
}

fn region_kind(kind: MemoryRegionKind) -> MemoryKind {
    match kind {
        MemoryRegionKind::Usable => MemoryKind::Available,
        _ => MemoryKind::Reserved,
    }
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes(bytes.get(offset..offset + 2)?.try_into().ok()?))
}

fn read_u64(bytes: &[u8], offset: usize) -> Option<u64> {
    Some(u64::from_le_bytes(bytes.get(offset..offset + 8)?.try_into().ok()?))
}

/// Section header table of an ELF64 file and its string table index.
fn section_table(image: &[u8]) -> Result<(&[u8], usize, u32), HandoffError> {
    let bad = HandoffError::BadKernelImage;
    if image.get(..4) != Some(&ELF_MAGIC[..])
        || image.get(4) != Some(&ELF_CLASS_64)
        || image.get(5) != Some(&ELF_DATA_LSB)
    {
        return Err(bad);
    }
    let shoff = read_u64(image, E_SHOFF).ok_or(bad)? as usize;
    let entsize = read_u16(image, E_SHENTSIZE).ok_or(bad)? as usize;
    let num = read_u16(image, E_SHNUM).ok_or(bad)? as usize;
    let shstrndx = read_u16(image, E_SHSTRNDX).ok_or(bad)? as u32;
    if entsize < ELF_SECTION_HEADER_SIZE {
        return Err(bad);
    }
    let end = entsize
        .checked_mul(num)
        .and_then(|len| len.checked_add(shoff))
        .ok_or(bad)?;
    let table = image.get(shoff..end).ok_or(bad)?;
    Ok((table, entsize, shstrndx))
}

/// Serializes `regions` and the section headers of `image` into `buf`.
///
/// Returns the tag list's total size.
pub fn write_tag_list<I>(
    buf: &mut [u8],
    regions: I,
    image: &[u8],
    load_offset: u64,
) -> Result<usize, HandoffError>
where
    I: IntoIterator<Item = MemoryRegion>,
{
    let (table, entsize, shstrndx) = section_table(image)?;
    let headers = table.chunks_exact(entsize).map(|raw| {
        let mut header = [0u8; ELF_SECTION_HEADER_SIZE];
        header.copy_from_slice(&raw[..ELF_SECTION_HEADER_SIZE]);
        if let Some(section) = KernelSection::parse(&header) {
            if section.is_allocated() && section.is_resident() {
                let moved = section.addr.wrapping_add(load_offset);
                header[SH_ADDR..SH_ADDR + 8].copy_from_slice(&moved.to_le_bytes());
            }
        }
        header
    });

    let mut writer = TagListWriter::new(buf)?;
    writer.memory_map(regions)?.elf_sections(shstrndx, headers)?;
    Ok(writer.finish()?)
}

#[repr(C, align(8))]
struct HandoffBuffer([u8; HANDOFF_SIZE]);

static mut HANDOFF: HandoffBuffer = HandoffBuffer([0; HANDOFF_SIZE]);
static BUILT: AtomicBool = AtomicBool::new(false);

/// Builds the tag list for this boot in a static buffer. Callable once.
pub fn build(info: &bootloader_api::BootInfo) -> Result<BootInformation<'static>, HandoffError> {
    let offset = info
        .physical_memory_offset
        .into_option()
        .ok_or(HandoffError::NoPhysicalMapping)?;
    if BUILT.swap(true, Ordering::AcqRel) {
        return Err(HandoffError::AlreadyBuilt);
    }

    // The loader keeps the kernel file in memory for the life of the system.
    let image = unsafe {
        core::slice::from_raw_parts(
            (offset + info.kernel_addr) as *const u8,
            info.kernel_len as usize,
        )
    };
    let regions = info.memory_regions.iter().map(|region| {
        MemoryRegion::new(region.start, region.end - region.start, region_kind(region.kind))
    });

    // BUILT guarantees this is the only reference to the buffer.
    let buf: &'static mut [u8; HANDOFF_SIZE] =
        unsafe { &mut (*core::ptr::addr_of_mut!(HANDOFF)).0 };
    let size = write_tag_list(buf, regions, image, info.kernel_image_offset)?;
    log::debug!(
        "handoff: {} bytes of boot information, kernel image offset {:#x}",
        size,
        info.kernel_image_offset
    );

    let buf: &'static [u8] = buf;
    BootInformation::new(&buf[..size]).map_err(HandoffError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::boot_info::{AddressRange, SHF_ALLOC, SHT_NULL, SHT_PROGBITS};

    #[repr(C, align(8))]
    struct Aligned([u8; 2048]);

    /// Minimal ELF64 file: header followed by a section header table.
    fn elf_image(sections: &[KernelSection]) -> Vec<u8> {
        let shoff = 64usize;
        let mut image = vec![0u8; shoff + sections.len() * ELF_SECTION_HEADER_SIZE];
        image[..4].copy_from_slice(ELF_MAGIC);
        image[4] = ELF_CLASS_64;
        image[5] = ELF_DATA_LSB;
        image[E_SHOFF..E_SHOFF + 8].copy_from_slice(&(shoff as u64).to_le_bytes());
        image[E_SHENTSIZE..E_SHENTSIZE + 2].copy_from_slice(&64u16.to_le_bytes());
        image[E_SHNUM..E_SHNUM + 2].copy_from_slice(&(sections.len() as u16).to_le_bytes());
        image[E_SHSTRNDX..E_SHSTRNDX + 2].copy_from_slice(&2u16.to_le_bytes());
        for (i, section) in sections.iter().enumerate() {
            let at = shoff + i * ELF_SECTION_HEADER_SIZE;
            image[at..at + ELF_SECTION_HEADER_SIZE].copy_from_slice(&section.to_header());
        }
        image
    }

    #[test]
    fn relocates_allocated_sections_only() {
        let image = elf_image(&[
            KernelSection::new(SHT_NULL, 0, 0, 0),
            KernelSection::new(SHT_PROGBITS, SHF_ALLOC, 0x1000, 0x2000),
            KernelSection::new(SHT_PROGBITS, 0, 0, 0x400),
        ]);
        let regions = [MemoryRegion::available(0x10_0000, 0x40_0000)];
        let mut buf = Aligned([0; 2048]);
        let size = write_tag_list(&mut buf.0, regions, &image, 0xFFFF_8000_0000_0000).unwrap();

        let info = BootInformation::new(&buf.0[..size]).unwrap();
        info.validate().unwrap();
        let sections: Vec<_> = info.kernel_sections().unwrap().collect();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].addr, 0xFFFF_8000_0000_1000);
        assert_eq!(sections[1].addr, 0);
        assert_eq!(
            info.kernel_span().unwrap(),
            AddressRange::new(0xFFFF_8000_0000_1000, 0xFFFF_8000_0000_3000)
        );
        assert_eq!(info.memory_regions().unwrap().collect::<Vec<_>>(), regions);
    }

    #[test]
    fn placed_but_unallocated_sections_keep_their_address() {
        let image = elf_image(&[
            KernelSection::new(SHT_PROGBITS, SHF_ALLOC, 0x1000, 0x1000),
            KernelSection::new(SHT_PROGBITS, 0, 0x8000, 0x100),
        ]);
        let mut buf = Aligned([0; 2048]);
        let size = write_tag_list(&mut buf.0, core::iter::empty(), &image, 0x10_0000).unwrap();

        let info = BootInformation::new(&buf.0[..size]).unwrap();
        let addrs: Vec<_> = info.kernel_sections().unwrap().map(|s| s.addr).collect();
        assert_eq!(addrs, vec![0x10_1000, 0x8000]);
    }

    #[test]
    fn rejects_non_elf_images() {
        let mut buf = Aligned([0; 2048]);
        let err = write_tag_list(&mut buf.0, core::iter::empty(), b"MZ\x90\x00 not an elf file", 0);
        assert_eq!(err, Err(HandoffError::BadKernelImage));

        let mut image = elf_image(&[KernelSection::new(SHT_PROGBITS, 0, 0x1000, 1)]);
        image.truncate(100);
        assert_eq!(
            write_tag_list(&mut buf.0, core::iter::empty(), &image, 0),
            Err(HandoffError::BadKernelImage)
        );
    }

    #[test]
    fn small_buffer_is_reported() {
        let image = elf_image(&[KernelSection::new(SHT_PROGBITS, SHF_ALLOC, 0x1000, 1); 8]);
        let mut buf = Aligned([0; 2048]);
        assert_eq!(
            write_tag_list(&mut buf.0[..256], core::iter::empty(), &image, 0),
            Err(HandoffError::BufferFull)
        );
    }

    #[test]
    fn loader_kinds_map_to_available_or_reserved() {
        assert_eq!(region_kind(MemoryRegionKind::Usable), MemoryKind::Available);
        assert_eq!(region_kind(MemoryRegionKind::Bootloader), MemoryKind::Reserved);
        assert_eq!(region_kind(MemoryRegionKind::UnknownBios(3)), MemoryKind::Reserved);
    }
}
