//! 64-bit IDT gate descriptor codec.
//!
//! Layout (16 bytes, little endian):
//!
//! | bytes  | field                                  |
//! |--------|----------------------------------------|
//! | 0..2   | handler address bits 0..16             |
//! | 2..4   | code segment selector                  |
//! | 4..6   | options: IST, gate type, DPL, present  |
//! | 6..8   | handler address bits 16..32            |
//! | 8..12  | handler address bits 32..64            |
//! | 12..16 | reserved, zero                         |

use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

/// Gate type nibble of a 64-bit interrupt gate (IF is cleared on entry).
pub const INTERRUPT_GATE: u8 = 0xE;

const IST_MASK: u16 = 0b111;
const TYPE_SHIFT: u16 = 8;
const TYPE_MASK: u16 = 0xF << TYPE_SHIFT;
const DPL_SHIFT: u16 = 13;
const DPL_MASK: u16 = 0b11 << DPL_SHIFT;
const PRESENT: u16 = 1 << 15;

/// The option word of a gate.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct GateOptions(u16);

impl GateOptions {
    /// All bits clear: not present, DPL 0, no gate type.
    pub const fn empty() -> Self {
        GateOptions(0)
    }

    /// Present 64-bit interrupt gate callable from ring 3.
    pub const fn interrupt_gate() -> Self {
        GateOptions(PRESENT | (3 << DPL_SHIFT) | ((INTERRUPT_GATE as u16) << TYPE_SHIFT))
    }

    pub const fn bits(&self) -> u16 {
        self.0
    }

    pub const fn is_present(&self) -> bool {
        self.0 & PRESENT != 0
    }

    pub fn set_present(&mut self, present: bool) -> &mut Self {
        if present {
            self.0 |= PRESENT;
        } else {
            self.0 &= !PRESENT;
        }
        self
    }

    pub fn privilege_level(&self) -> PrivilegeLevel {
        PrivilegeLevel::from_u16((self.0 & DPL_MASK) >> DPL_SHIFT)
    }

    /// Minimum privilege needed to raise this vector with `int n`.
    pub fn set_privilege_level(&mut self, dpl: PrivilegeLevel) -> &mut Self {
        self.0 = (self.0 & !DPL_MASK) | ((dpl as u16) << DPL_SHIFT);
        self
    }

    pub const fn gate_type(&self) -> u8 {
        ((self.0 & TYPE_MASK) >> TYPE_SHIFT) as u8
    }

    /// Interrupt stack table slot, 0 meaning "stay on the current stack".
    pub const fn stack_index(&self) -> u8 {
        (self.0 & IST_MASK) as u8
    }

    /// Switches to IST slot `index` (1..=7) on entry, 0 to disable.
    pub fn set_stack_index(&mut self, index: u8) -> &mut Self {
        assert!(index < 8, "IST index out of range");
        self.0 = (self.0 & !IST_MASK) | index as u16;
        self
    }
}

impl core::fmt::Debug for GateOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GateOptions")
            .field("present", &self.is_present())
            .field("dpl", &((self.0 & DPL_MASK) >> DPL_SHIFT))
            .field("gate_type", &self.gate_type())
            .field("ist", &self.stack_index())
            .finish()
    }
}

/// One IDT entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct GateDescriptor {
    address_low: u16,
    selector: u16,
    options: GateOptions,
    address_mid: u16,
    address_high: u32,
    reserved: u32,
}

const _: () = assert!(core::mem::size_of::<GateDescriptor>() == 16);

impl GateDescriptor {
    /// A not-present gate with every field zero. A vector hitting it raises
    /// #NP/#GP instead of jumping through stale memory.
    pub const fn empty() -> Self {
        GateDescriptor {
            address_low: 0,
            selector: 0,
            options: GateOptions::empty(),
            address_mid: 0,
            address_high: 0,
            reserved: 0,
        }
    }

    /// A present interrupt gate jumping to `handler` through `selector`.
    pub const fn build(selector: SegmentSelector, handler: u64) -> Self {
        GateDescriptor {
            address_low: handler as u16,
            selector: selector.0,
            options: GateOptions::interrupt_gate(),
            address_mid: (handler >> 16) as u16,
            address_high: (handler >> 32) as u32,
            reserved: 0,
        }
    }

    pub fn handler_address(&self) -> u64 {
        self.address_low as u64
            | (self.address_mid as u64) << 16
            | (self.address_high as u64) << 32
    }

    pub fn selector(&self) -> SegmentSelector {
        SegmentSelector(self.selector)
    }

    pub fn options(&self) -> &GateOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut GateOptions {
        &mut self.options
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }

    /// Raw little-endian image as the CPU reads it.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..2].copy_from_slice(&self.address_low.to_le_bytes());
        out[2..4].copy_from_slice(&self.selector.to_le_bytes());
        out[4..6].copy_from_slice(&self.options.0.to_le_bytes());
        out[6..8].copy_from_slice(&self.address_mid.to_le_bytes());
        out[8..12].copy_from_slice(&self.address_high.to_le_bytes());
        out[12..16].copy_from_slice(&self.reserved.to_le_bytes());
        out
    }
}

impl Default for GateDescriptor {
    fn default() -> Self {
        Self::empty()
    }
}
