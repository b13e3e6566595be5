#![no_std]
#![no_main]

use core::panic::PanicInfo;

use hwinit::config::{KernelConfig, BOOTLOADER_CONFIG};
use hwinit::kernel;

bootloader_api::entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

fn kernel_main(boot_info: &'static mut bootloader_api::BootInfo) -> ! {
    // Nothing to report through if this fails; boot continues silently.
    let _ = hwinit::logger::init();
    log::info!("hwinit: kernel running");

    match kernel::early_init(boot_info, &KernelConfig::DEFAULT) {
        Ok(state) => kernel::kernel_loop(state),
        Err(err) => kernel::fatal(&err),
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    x86_64::instructions::interrupts::disable();
    // The panicking code may have been mid-line.
    if hwinit::serial::SERIAL.is_locked() {
        unsafe { hwinit::serial::SERIAL.force_unlock() };
    }
    log::error!("panic: {}", info);
    loop {
        x86_64::instructions::hlt();
    }
}
