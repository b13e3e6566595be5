//! Boot-time configuration.

use bootloader_api::{config::Mapping, BootloaderConfig};

/// Interrupt routing and timer rate used by the boot sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// First vector of the master controller's IRQs 0-7.
    pub master_base: u8,
    /// First vector of the slave controller's IRQs 8-15.
    pub slave_base: u8,
    /// Requested timer interrupt rate.
    pub timer_hz: u32,
}

impl KernelConfig {
    pub const DEFAULT: KernelConfig = KernelConfig {
        master_base: 0x20,
        slave_base: 0x28,
        timer_hz: 100,
    };
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The handoff reads the kernel file through the physical memory mapping.
pub static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    config.mappings.physical_memory = Some(Mapping::Dynamic);
    config
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::arch::x86::pic::ChainedPics;
    use crate::kernel::arch::x86::pit::TimerConfig;
    use crate::port::fake::FakePorts;

    #[test]
    fn default_routing_is_accepted_by_drivers() {
        let config = KernelConfig::default();
        let mut pics = ChainedPics::new(FakePorts::new());
        assert!(pics.remap(config.master_base, config.slave_base).is_ok());
        assert_eq!(TimerConfig::for_frequency(config.timer_hz).unwrap().divisor, 11931);
    }

    #[test]
    fn physical_memory_is_mapped() {
        assert!(matches!(
            BOOTLOADER_CONFIG.mappings.physical_memory,
            Some(Mapping::Dynamic)
        ));
    }
}
