//! Interrupt descriptor table: codec, table, storage and the vector bindings
//! the boot sequence installs.

pub mod gate;
pub mod handlers;
pub mod storage;
pub mod table;
mod trampolines;

pub use gate::{GateDescriptor, GateOptions};
pub use storage::StaticTable;
pub use table::{InterruptTable, FIRST_IRQ_VECTOR, VECTOR_COUNT};

use x86_64::PrivilegeLevel;

use crate::kernel::arch::x86::pic::{ChainedPics, KEYBOARD_IRQ};
use crate::port::PortIo;

use trampolines::*;

pub const DIVIDE_ERROR_VECTOR: u8 = 0;
pub const DOUBLE_FAULT_VECTOR: u8 = 8;
pub const GENERAL_PROTECTION_VECTOR: u8 = 13;

/// Address-taking entry stub for one vector.
pub type Trampoline = unsafe extern "C" fn();

/// Associates a vector with its entry stub and gate DPL.
#[derive(Clone, Copy)]
pub struct VectorBinding {
    pub vector: u8,
    pub entry: Trampoline,
    pub privilege: PrivilegeLevel,
}

impl VectorBinding {
    pub const fn kernel(vector: u8, entry: Trampoline) -> Self {
        VectorBinding { vector, entry, privilege: PrivilegeLevel::Ring0 }
    }

    /// Keeps the codec's default ring 3 DPL.
    pub const fn open(vector: u8, entry: Trampoline) -> Self {
        VectorBinding { vector, entry, privilege: PrivilegeLevel::Ring3 }
    }

    pub fn address(&self) -> u64 {
        self.entry as usize as u64
    }
}

/// CPU exceptions handled by this kernel. Only the kernel may raise them.
pub static EXCEPTION_BINDINGS: [VectorBinding; 3] = [
    VectorBinding::kernel(DIVIDE_ERROR_VECTOR, hwinit_isr_divide_error),
    VectorBinding::kernel(DOUBLE_FAULT_VECTOR, hwinit_isr_double_fault),
    VectorBinding::kernel(GENERAL_PROTECTION_VECTOR, hwinit_isr_general_protection),
];

/// Hardware IRQ bindings at the vectors `pics` was remapped to.
/// The timer line is installed by the PIT driver.
pub fn irq_bindings<P: PortIo>(pics: &ChainedPics<P>) -> [VectorBinding; 1] {
    [VectorBinding::open(pics.vector_for(KEYBOARD_IRQ), hwinit_isr_keyboard)]
}

pub fn timer_entry() -> u64 {
    hwinit_isr_timer as usize as u64
}

/// Registers every binding in order.
pub fn install(table: &mut InterruptTable, bindings: &[VectorBinding]) {
    for binding in bindings {
        table
            .register(binding.vector, binding.address())
            .set_privilege_level(binding.privilege);
    }
}
