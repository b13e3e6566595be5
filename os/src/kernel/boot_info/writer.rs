//! Serializer for the boot information layout.

use super::tags::{
    align_up, MemoryRegion, TagType, ELF_SECTIONS_HEADER_SIZE, ELF_SECTION_HEADER_SIZE,
    HEADER_SIZE, MEMORY_MAP_ENTRY_SIZE, TAG_ALIGN, TAG_HEADER_SIZE,
};

/// The destination buffer cannot hold the next record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFull;

/// Appends tags to a caller-provided buffer. `finish` writes the end tag and
/// the header.
pub struct TagListWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> TagListWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Result<Self, BufferFull> {
        if buf.len() < HEADER_SIZE {
            return Err(BufferFull);
        }
        buf[..HEADER_SIZE].fill(0);
        Ok(TagListWriter { buf, len: HEADER_SIZE })
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), BufferFull> {
        let end = self.len.checked_add(bytes.len()).ok_or(BufferFull)?;
        self.buf.get_mut(self.len..end).ok_or(BufferFull)?.copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    fn put_u32(&mut self, value: u32) -> Result<(), BufferFull> {
        self.put(&value.to_le_bytes())
    }

    fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn pad(&mut self) -> Result<(), BufferFull> {
        while self.len % TAG_ALIGN != 0 {
            self.put(&[0])?;
        }
        Ok(())
    }

    /// Opens a tag; returns its offset for `close_tag`.
    fn open_tag(&mut self, typ: TagType) -> Result<usize, BufferFull> {
        self.pad()?;
        let start = self.len;
        self.put_u32(typ.raw())?;
        self.put_u32(0)?;
        Ok(start)
    }

    fn close_tag(&mut self, start: usize) {
        let size = (self.len - start) as u32;
        self.patch_u32(start + 4, size);
    }

    pub fn memory_map<I>(&mut self, regions: I) -> Result<&mut Self, BufferFull>
    where
        I: IntoIterator<Item = MemoryRegion>,
    {
        let start = self.open_tag(TagType::MemoryMap)?;
        self.put_u32(MEMORY_MAP_ENTRY_SIZE as u32)?;
        self.put_u32(0)?;
        for region in regions {
            self.put(&region.encode())?;
        }
        self.close_tag(start);
        Ok(self)
    }

    /// ELF sections tag from raw 64-byte section headers.
    pub fn elf_sections<I>(&mut self, shndx: u32, headers: I) -> Result<&mut Self, BufferFull>
    where
        I: IntoIterator<Item = [u8; ELF_SECTION_HEADER_SIZE]>,
    {
        let start = self.open_tag(TagType::ElfSections)?;
        self.put_u32(0)?;
        self.put_u32(ELF_SECTION_HEADER_SIZE as u32)?;
        self.put_u32(shndx)?;
        debug_assert_eq!(self.len - start, TAG_HEADER_SIZE + ELF_SECTIONS_HEADER_SIZE);
        let mut num = 0u32;
        for header in headers {
            self.put(&header)?;
            num += 1;
        }
        self.patch_u32(start + TAG_HEADER_SIZE, num);
        self.close_tag(start);
        Ok(self)
    }

    /// A tag this kernel does not interpret, for exercising readers.
    pub fn raw_tag(&mut self, typ: u32, payload: &[u8]) -> Result<&mut Self, BufferFull> {
        let start = self.open_tag(TagType::from_raw(typ))?;
        self.put(payload)?;
        self.close_tag(start);
        Ok(self)
    }

    /// Terminates the list; returns the total size in bytes.
    pub fn finish(mut self) -> Result<usize, BufferFull> {
        let start = self.open_tag(TagType::End)?;
        self.close_tag(start);
        let total = align_up(self.len, TAG_ALIGN);
        self.patch_u32(0, total as u32);
        Ok(total)
    }
}
