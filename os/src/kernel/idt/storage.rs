//! Process-wide IDT storage.
//!
//! The CPU holds the table's address after `lidt`, so it lives in a static
//! that never moves. Exactly one owner gets mutable access.

use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use x86_64::instructions::tables::lidt;
use x86_64::structures::DescriptorTablePointer;

use super::table::InterruptTable;

static mut IDT_STORAGE: InterruptTable = InterruptTable::new();
static CLAIMED: AtomicBool = AtomicBool::new(false);

/// Sole owner of a table that never moves.
///
/// The table can be loaded into IDTR and still be registered into
/// afterwards; a gate written after the load takes effect on the next
/// delivery of its vector.
pub struct StaticTable(&'static mut InterruptTable);

impl StaticTable {
    pub fn new(table: &'static mut InterruptTable) -> Self {
        StaticTable(table)
    }

    /// Loads the table into IDTR.
    pub fn commit(&self) {
        // The table is 'static and owned here, so IDTR never dangles.
        self.commit_with(|pointer| unsafe { lidt(pointer) });
    }

    /// Hands the IDTR image to `load`. `commit` passes `lidt`.
    pub fn commit_with<F>(&self, load: F)
    where
        F: FnOnce(&DescriptorTablePointer),
    {
        let pointer = self.0.pointer();
        load(&pointer);
        log::debug!(
            "IDT loaded at {:#x}, limit {:#x}, {} gates present",
            pointer.base.as_u64(),
            pointer.limit,
            self.0.registered()
        );
    }
}

impl Deref for StaticTable {
    type Target = InterruptTable;

    fn deref(&self) -> &InterruptTable {
        self.0
    }
}

impl DerefMut for StaticTable {
    fn deref_mut(&mut self) -> &mut InterruptTable {
        self.0
    }
}

/// Hands out the global table once; later calls get `None`.
pub fn claim() -> Option<StaticTable> {
    if CLAIMED.swap(true, Ordering::AcqRel) {
        return None;
    }
    // The flag above makes this the only reference ever created.
    Some(StaticTable::new(unsafe { &mut *core::ptr::addr_of_mut!(IDT_STORAGE) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use x86_64::structures::gdt::SegmentSelector;

    #[test]
    fn claim_is_one_shot() {
        let table = claim().expect("first claim");
        assert_eq!(table.registered(), 0);
        assert!(claim().is_none());
        assert!(claim().is_none());
    }

    #[test]
    fn gates_registered_after_commit_reach_loaded_table() {
        let mut table = StaticTable::new(Box::leak(Box::new(InterruptTable::new())));
        table.register_with_selector(0, SegmentSelector(0x08), 0x1000);

        let mut loaded = None;
        table.commit_with(|pointer| loaded = Some(pointer.base.as_u64()));
        let base = loaded.expect("load callback runs");
        assert_eq!(base, table.pointer().base.as_u64());

        table.register_with_selector(0x20, SegmentSelector(0x08), 0x2000);
        // Read the gate back the way the CPU would, through the IDTR base.
        let gate = unsafe { &*(base as *const InterruptTable) }.entry(0x20);
        assert!(gate.options().is_present());
        assert_eq!(gate.handler_address(), 0x2000);
    }
}
