//! Physical frame allocator
//!
//! Hands out 4 KiB frames from the available regions of the memory map,
//! never from the first 1 MiB, the kernel image or the boot information.

use x86_64::{
    addr::{align_down, align_up},
    structures::paging::{FrameAllocator, PageSize, PhysFrame, Size4KiB},
    PhysAddr,
};

use crate::kernel::boot_info::{AddressRange, MemoryRegion};

const MAX_USABLE_RANGES: usize = 32;

/// BIOS data, VGA memory and NULL detection live below this.
const LOW_MEMORY_END: u64 = 0x10_0000;

pub struct EarlyFrameAllocator {
    /// Free physical ranges (start, end), page-aligned, end exclusive.
    ranges: [(u64, u64); MAX_USABLE_RANGES],
    len: usize,
    /// Index to try first on next allocation
    next: usize,
    /// Frames handed out so far
    allocated: u64,
}

impl EarlyFrameAllocator {
    /// Builds the allocator from the memory map, carving out `kernel` and
    /// `boot_info` (both widened to page boundaries).
    ///
    /// Regions beyond `MAX_USABLE_RANGES` pieces are dropped.
    ///
    /// # Safety
    /// `regions` must describe physical RAM accurately and the two spans must
    /// cover everything still in use.
    pub unsafe fn new<I>(kernel: AddressRange, boot_info: AddressRange, regions: I) -> Self
    where
        I: IntoIterator<Item = MemoryRegion>,
    {
        let page = Size4KiB::SIZE;
        let widen = |r: AddressRange| {
            AddressRange::new(align_down(r.start, page), align_up(r.end, page))
        };
        let reserved = [
            AddressRange::new(0, LOW_MEMORY_END),
            widen(kernel),
            widen(boot_info),
        ];

        let mut allocator = Self {
            ranges: [(0, 0); MAX_USABLE_RANGES],
            len: 0,
            next: 0,
            allocated: 0,
        };
        for region in regions.into_iter().filter(MemoryRegion::is_available) {
            let start = align_up(region.base, page);
            let end = align_down(region.end(), page);
            allocator.insert(start, end, &reserved);
        }
        allocator
    }

    /// Adds `[start, end)` minus every range in `reserved`.
    fn insert(&mut self, start: u64, end: u64, reserved: &[AddressRange]) {
        if start >= end {
            return;
        }
        match reserved.split_first() {
            None => {
                if self.len < MAX_USABLE_RANGES {
                    self.ranges[self.len] = (start, end);
                    self.len += 1;
                } else {
                    log::warn!("frame allocator full, dropping {:#x}..{:#x}", start, end);
                }
            }
            Some((hole, rest)) => {
                self.insert(start, end.min(hole.start), rest);
                self.insert(start.max(hole.end), end, rest);
            }
        }
    }

    /// Returns the number of free ranges.
    #[inline]
    pub fn range_count(&self) -> usize {
        self.len
    }

    /// Bytes still available.
    pub fn free_memory(&self) -> u64 {
        self.ranges[..self.len]
            .iter()
            .map(|(start, end)| end - start)
            .sum()
    }

    /// Bytes handed out so far.
    pub fn allocated_memory(&self) -> u64 {
        self.allocated * Size4KiB::SIZE
    }
}

unsafe impl FrameAllocator<Size4KiB> for EarlyFrameAllocator {
    fn allocate_frame(&mut self) -> Option<PhysFrame<Size4KiB>> {
        let n = self.len;
        for j in 0..n {
            let i = (self.next + j) % n;
            let (start, end) = &mut self.ranges[i];
            if *start < *end {
                self.next = i;
                let addr = PhysAddr::new(*start);
                *start += Size4KiB::SIZE;
                self.allocated += 1;
                return Some(PhysFrame::containing_address(addr));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::boot_info::MemoryKind;

    fn build(kernel: AddressRange, boot_info: AddressRange, regions: &[MemoryRegion]) -> EarlyFrameAllocator {
        unsafe { EarlyFrameAllocator::new(kernel, boot_info, regions.iter().copied()) }
    }

    fn drain(allocator: &mut EarlyFrameAllocator) -> Vec<u64> {
        core::iter::from_fn(|| allocator.allocate_frame())
            .map(|frame| frame.start_address().as_u64())
            .collect()
    }

    #[test]
    fn never_hands_out_reserved_frames() {
        let kernel = AddressRange::new(0x10_0000, 0x10_5000);
        let boot_info = AddressRange::new(0x10_8010, 0x10_8200);
        let regions = [
            MemoryRegion::available(0, 0x9_F000),
            MemoryRegion::new(0x9_F000, 0x1000, MemoryKind::Reserved),
            MemoryRegion::available(0x10_0000, 0x1_0000),
        ];
        let mut allocator = build(kernel, boot_info, &regions);

        let frames = drain(&mut allocator);
        assert_eq!(frames.len(), 16 - 5 - 1);
        for addr in &frames {
            assert!(*addr >= LOW_MEMORY_END);
            assert!(!kernel.contains(*addr));
            assert_ne!(*addr, 0x10_8000);
        }
        assert_eq!(allocator.allocated_memory(), 10 * 0x1000);
        assert_eq!(allocator.free_memory(), 0);
    }

    #[test]
    fn unaligned_regions_shrink_to_whole_frames() {
        let regions = [MemoryRegion::available(0x20_0800, 0x2800)];
        let mut allocator = build(AddressRange::new(0, 0), AddressRange::new(0, 0), &regions);
        assert_eq!(drain(&mut allocator), vec![0x20_1000, 0x20_2000]);
    }

    #[test]
    fn skips_unavailable_regions() {
        let regions = [
            MemoryRegion::new(0x20_0000, 0x1000, MemoryKind::AcpiReclaimable),
            MemoryRegion::new(0x30_0000, 0x1000, MemoryKind::Unknown(20)),
        ];
        let mut allocator = build(AddressRange::new(0, 0), AddressRange::new(0, 0), &regions);
        assert_eq!(allocator.range_count(), 0);
        assert!(allocator.allocate_frame().is_none());
    }
}
