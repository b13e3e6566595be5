//! Hand-off from boot information to memory management.

use x86_64::{
    structures::paging::{PageSize, Size4KiB},
    VirtAddr,
};

use super::{AddressSpace, EarlyFrameAllocator, PagingError, PagingResult};
use crate::kernel::boot_info::{AddressRange, BootInformation, KernelSection};

/// Paging subsystem state
pub struct PagingState {
    /// Tables the loader built for the kernel
    pub kernel_space: AddressSpace,
    /// Physical frame allocator
    pub frame_allocator: EarlyFrameAllocator,
}

/// Lowest and highest physical byte seen so far.
struct PhysicalHull {
    start: u64,
    end: u64,
}

impl PhysicalHull {
    const fn new() -> Self {
        PhysicalHull { start: u64::MAX, end: 0 }
    }

    fn add(&mut self, frame_start: u64) {
        self.start = self.start.min(frame_start);
        self.end = self.end.max(frame_start + Size4KiB::SIZE);
    }

    fn finish(self) -> AddressRange {
        if self.start >= self.end {
            AddressRange::new(0, 0)
        } else {
            AddressRange::new(self.start, self.end)
        }
    }
}

/// Adopts the active page tables as the kernel address space and builds the
/// frame allocator around the kernel's physical footprint.
///
/// The loader already mapped each kernel segment with its permissions; this
/// checks that every page of every resident section translates. The frames
/// backing the kernel image and the boot information are kept out of the
/// allocator.
///
/// # Safety
/// All physical memory must be mapped at `physical_offset`, and the boot
/// information must describe the running kernel.
pub unsafe fn remap_kernel(
    boot_info: &BootInformation<'_>,
    physical_offset: VirtAddr,
) -> PagingResult<PagingState> {
    let mut kernel_space = unsafe { AddressSpace::adopt_active(physical_offset) };
    log::debug!(
        "kernel PML4 at {:#x}",
        kernel_space.pml4().start_address().as_u64()
    );

    let mut kernel = PhysicalHull::new();
    let mut pages = 0u64;
    for section in boot_info.kernel_sections()?.filter(KernelSection::is_resident) {
        pages += walk_pages(&mut kernel_space, section.addr, section.end(), &mut kernel)?;
    }
    let kernel = kernel.finish();
    if kernel.is_empty() {
        return Err(PagingError::NoKernelSections);
    }

    let info = boot_info.span();
    let mut info_hull = PhysicalHull::new();
    walk_pages(&mut kernel_space, info.start, info.end, &mut info_hull)?;
    let info = info_hull.finish();

    log::debug!(
        "kernel frames {:#x}..{:#x}, boot information frames {:#x}..{:#x}",
        kernel.start,
        kernel.end,
        info.start,
        info.end
    );

    let frame_allocator =
        unsafe { EarlyFrameAllocator::new(kernel, info, boot_info.memory_regions()?) };

    log::info!(
        "kernel mapping adopted: {} pages checked, {} KiB free in {} ranges",
        pages,
        frame_allocator.free_memory() / 1024,
        frame_allocator.range_count()
    );

    Ok(PagingState {
        kernel_space,
        frame_allocator,
    })
}

/// Translates every page of `[start, end)`, folding the backing frames into
/// `hull`. Returns the page count.
fn walk_pages(
    space: &mut AddressSpace,
    start: u64,
    end: u64,
    hull: &mut PhysicalHull,
) -> PagingResult<u64> {
    let page = Size4KiB::SIZE;
    let mut addr = start & !(page - 1);
    let mut pages = 0;
    while addr < end {
        let virt = VirtAddr::try_new(addr).map_err(|_| PagingError::NonCanonical { addr })?;
        let phys = space
            .translate(virt)
            .ok_or(PagingError::SectionNotMapped { addr: virt })?;
        hull.add(phys.as_u64() & !(page - 1));
        addr += page;
        pages += 1;
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hull_covers_scattered_frames() {
        let mut hull = PhysicalHull::new();
        hull.add(0x40_3000);
        hull.add(0x20_0000);
        hull.add(0x30_1000);
        assert_eq!(hull.finish(), AddressRange::new(0x20_0000, 0x40_4000));
    }

    #[test]
    fn empty_hull_is_an_empty_range() {
        assert!(PhysicalHull::new().finish().is_empty());
    }
}
