//! The kernel's page tables as left by the loader.
//!
//! Tables are reached through the loader's mapping of all physical memory.

use x86_64::{
    registers::control::Cr3,
    structures::paging::{OffsetPageTable, PageTable, PhysFrame, Size4KiB, Translate},
    PhysAddr, VirtAddr,
};

/// One PML4 hierarchy and the window used to reach its tables.
pub struct AddressSpace {
    pml4: PhysFrame<Size4KiB>,
    physical_offset: VirtAddr,
}

impl AddressSpace {
    /// Adopts the hierarchy loaded in CR3.
    ///
    /// # Safety
    /// All physical memory must be mapped at `physical_offset`.
    pub unsafe fn adopt_active(physical_offset: VirtAddr) -> Self {
        let (pml4, _) = Cr3::read();
        AddressSpace { pml4, physical_offset }
    }

    /// # Safety
    /// No other mapper over the same tables may be alive.
    unsafe fn mapper(&mut self) -> OffsetPageTable<'_> {
        let virt = self.physical_offset + self.pml4.start_address().as_u64();
        let level_4 = unsafe { &mut *virt.as_mut_ptr::<PageTable>() };
        unsafe { OffsetPageTable::new(level_4, self.physical_offset) }
    }

    /// Physical address `addr` maps to, if mapped.
    pub fn translate(&mut self, addr: VirtAddr) -> Option<PhysAddr> {
        // `&mut self` keeps this the only mapper; `adopt_active` covers the rest.
        unsafe { self.mapper() }.translate_addr(addr)
    }

    pub fn pml4(&self) -> PhysFrame<Size4KiB> {
        self.pml4
    }

    pub fn physical_offset(&self) -> VirtAddr {
        self.physical_offset
    }
}
