//! The 256-entry interrupt descriptor table.

use core::mem::size_of;

use x86_64::instructions::segmentation::{Segment, CS};
use x86_64::structures::gdt::SegmentSelector;
use x86_64::structures::DescriptorTablePointer;
use x86_64::VirtAddr;

use super::gate::{GateDescriptor, GateOptions};

pub const VECTOR_COUNT: usize = 256;

/// First vector not reserved for CPU exceptions.
pub const FIRST_IRQ_VECTOR: u8 = 32;

#[repr(C, align(16))]
pub struct InterruptTable {
    entries: [GateDescriptor; VECTOR_COUNT],
}

impl InterruptTable {
    /// A table whose every gate is not present.
    pub const fn new() -> Self {
        InterruptTable {
            entries: [GateDescriptor::empty(); VECTOR_COUNT],
        }
    }

    /// Clears every gate. Runs before the first registration of a boot.
    pub fn reset(&mut self) {
        self.entries.fill(GateDescriptor::empty());
    }

    /// Points `vector` at `handler` through the code segment currently in CS.
    ///
    /// Re-registering a vector replaces the previous gate. The returned
    /// options belong to the stored gate and may be adjusted in place.
    pub fn register(&mut self, vector: u8, handler: u64) -> &mut GateOptions {
        self.register_with_selector(vector, CS::get_reg(), handler)
    }

    pub fn register_with_selector(
        &mut self,
        vector: u8,
        selector: SegmentSelector,
        handler: u64,
    ) -> &mut GateOptions {
        let slot = &mut self.entries[vector as usize];
        *slot = GateDescriptor::build(selector, handler);
        log::trace!(
            "vector {:#04x} -> {:#018x} (cs {:#06x})",
            vector,
            handler,
            selector.0
        );
        slot.options_mut()
    }

    pub fn entry(&self, vector: u8) -> &GateDescriptor {
        &self.entries[vector as usize]
    }

    pub fn entries(&self) -> &[GateDescriptor; VECTOR_COUNT] {
        &self.entries
    }

    /// Number of present gates.
    pub fn registered(&self) -> usize {
        self.entries
            .iter()
            .filter(|gate| gate.options().is_present())
            .count()
    }

    /// IDTR image for this table; the limit is the byte size minus one.
    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (size_of::<Self>() - 1) as u16,
            base: VirtAddr::from_ptr(self as *const Self),
        }
    }
}

impl Default for InterruptTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x86_64::PrivilegeLevel;

    const KERNEL_CS: SegmentSelector = SegmentSelector(0x08);

    #[test]
    fn unregistered_vectors_stay_empty() {
        let mut table = InterruptTable::new();
        table.register_with_selector(0, KERNEL_CS, 0x1000);
        table.register_with_selector(0x20, KERNEL_CS, 0x2000);
        table.register_with_selector(0xFF, KERNEL_CS, 0x3000);

        for vector in 0..=255u8 {
            let gate = table.entry(vector);
            match vector {
                0 | 0x20 | 0xFF => assert!(gate.options().is_present()),
                _ => {
                    assert!(gate.is_empty(), "vector {vector} not empty");
                    assert_eq!(gate.to_bytes(), [0u8; 16]);
                }
            }
        }
        assert_eq!(table.registered(), 3);
    }

    #[test]
    fn reset_clears_previous_registrations() {
        let mut table = InterruptTable::new();
        for vector in 0..=255u8 {
            table.register_with_selector(vector, KERNEL_CS, 0xDEAD_0000 + vector as u64);
        }
        assert_eq!(table.registered(), VECTOR_COUNT);

        table.reset();
        assert!(table.entries().iter().all(GateDescriptor::is_empty));
    }

    #[test]
    fn last_registration_wins() {
        let mut table = InterruptTable::new();
        table.register_with_selector(0x21, KERNEL_CS, 0x1111);
        table.register_with_selector(0x21, SegmentSelector(0x28), 0x2222);

        let gate = table.entry(0x21);
        assert_eq!(gate.handler_address(), 0x2222);
        assert_eq!(gate.selector(), SegmentSelector(0x28));
    }

    #[test]
    fn returned_options_tune_stored_gate() {
        let mut table = InterruptTable::new();
        table
            .register_with_selector(8, KERNEL_CS, 0x4000)
            .set_privilege_level(PrivilegeLevel::Ring0);
        assert_eq!(
            table.entry(8).options().privilege_level(),
            PrivilegeLevel::Ring0
        );
    }

    #[test]
    fn register_uses_live_code_segment() {
        let mut table = InterruptTable::new();
        table.register(3, 0x5000);
        assert_eq!(table.entry(3).selector(), CS::get_reg());
        assert_eq!(table.entry(3).handler_address(), 0x5000);
    }

    #[test]
    fn pointer_limit_is_size_minus_one() {
        let table = InterruptTable::new();
        let pointer = table.pointer();
        assert_eq!(pointer.limit, 256 * 16 - 1);
        assert_eq!(pointer.base.as_u64(), &table as *const _ as u64);
        assert_eq!(pointer.base.as_u64() % 16, 0);
    }
}
