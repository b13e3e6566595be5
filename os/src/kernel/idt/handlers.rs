//! Rust side of the interrupt and exception handlers.
//!
//! These run with IF clear (interrupt gates) on the interrupted stack. They
//! must stay short, never allocate and never re-enable interrupts.

use x86_64::instructions::{hlt, interrupts};
use x86_64::structures::idt::InterruptStackFrameValue;

use crate::kernel::arch::x86::pic::{Controller, PICS};
use crate::kernel::arch::x86::pit::TICKS;
use crate::port::{HardwarePorts, PortIo};

/// PS/2 controller output buffer.
const KEYBOARD_DATA: u16 = 0x60;

fn halt_forever() -> ! {
    loop {
        hlt();
    }
}

fn log_frame(frame: &InterruptStackFrameValue) {
    log::error!(
        "rip={:#018x} cs={:#06x} rflags={:#x}",
        frame.instruction_pointer.as_u64(),
        frame.code_segment.0,
        frame.cpu_flags.bits()
    );
    log::error!(
        "rsp={:#018x} ss={:#06x}",
        frame.stack_pointer.as_u64(),
        frame.stack_segment.0
    );
}

// === Exceptions ===

pub extern "C" fn divide_error(frame: &InterruptStackFrameValue) {
    log::error!(
        "divide by zero at {:#x}",
        frame.instruction_pointer.as_u64()
    );
    PICS.lock().acknowledge(Controller::Master);
}

pub extern "C" fn double_fault(frame: &InterruptStackFrameValue, error_code: u64) -> ! {
    interrupts::disable();
    log::error!("double fault (error {:#x}), system halted", error_code);
    log_frame(frame);
    halt_forever()
}

/// No EOI: after a #GP the controller state is not trusted.
pub extern "C" fn general_protection(frame: &InterruptStackFrameValue, error_code: u64) -> ! {
    interrupts::disable();
    log::error!("general protection fault (error {:#x}), system halted", error_code);
    log_frame(frame);
    halt_forever()
}

// === Hardware IRQs ===

pub extern "C" fn timer(_frame: &InterruptStackFrameValue) {
    if let Some(ticks) = TICKS.tick() {
        log::info!("tick {}", ticks);
    }
    PICS.lock().acknowledge_all();
}

pub extern "C" fn keyboard(_frame: &InterruptStackFrameValue) {
    // The controller holds IRQ 1 until the byte is consumed.
    let scancode = HardwarePorts::new().read_u8(KEYBOARD_DATA);
    log::debug!("keyboard scancode {:#04x}", scancode);
    PICS.lock().acknowledge(Controller::Master);
}
