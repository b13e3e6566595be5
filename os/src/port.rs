//! Byte-wide port I/O capability.
//!
//! Drivers never issue `in`/`out` themselves; they own a `PortIo` backend so
//! their command sequences can be replayed against a fake in tests.

use x86_64::instructions::port::Port;

/// Single-byte access to the 16-bit I/O port space.
pub trait PortIo {
    fn read_u8(&mut self, port: u16) -> u8;
    fn write_u8(&mut self, port: u16, value: u8);
}

/// The real I/O port space of the executing CPU.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardwarePorts;

impl HardwarePorts {
    pub const fn new() -> Self {
        HardwarePorts
    }
}

impl PortIo for HardwarePorts {
    #[inline]
    fn read_u8(&mut self, port: u16) -> u8 {
        // Only kernel drivers hold a HardwarePorts, and they only name
        // ports of devices they own.
        unsafe { Port::<u8>::new(port).read() }
    }

    #[inline]
    fn write_u8(&mut self, port: u16, value: u8) {
        unsafe { Port::<u8>::new(port).write(value) }
    }
}

/// Unused diagnostic port; a write to it takes roughly one microsecond.
const IO_WAIT_PORT: u16 = 0x80;

/// Gives slow legacy chips time to settle between command bytes.
#[inline]
pub fn io_wait<P: PortIo>(ports: &mut P) {
    ports.write_u8(IO_WAIT_PORT, 0);
}

#[cfg(test)]
pub mod fake {
    //! In-memory port space that records every access.

    use super::{PortIo, IO_WAIT_PORT};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Default)]
    struct State {
        latches: HashMap<u16, u8>,
        writes: Vec<(u16, u8)>,
    }

    /// Clones share the same port space, so several drivers can be wired to
    /// one fake and their interleaving observed.
    #[derive(Clone, Default)]
    pub struct FakePorts(Rc<RefCell<State>>);

    impl FakePorts {
        pub fn new() -> Self {
            Self::default()
        }

        /// Presets what the next read of `port` returns.
        pub fn preset(&self, port: u16, value: u8) {
            self.0.borrow_mut().latches.insert(port, value);
        }

        /// Every write in issue order, `io_wait` pulses excluded.
        pub fn writes(&self) -> Vec<(u16, u8)> {
            self.0
                .borrow()
                .writes
                .iter()
                .copied()
                .filter(|&(port, _)| port != IO_WAIT_PORT)
                .collect()
        }

        pub fn writes_to(&self, port: u16) -> Vec<u8> {
            self.writes()
                .into_iter()
                .filter(|&(p, _)| p == port)
                .map(|(_, v)| v)
                .collect()
        }

        pub fn clear_log(&self) {
            self.0.borrow_mut().writes.clear();
        }
    }

    impl PortIo for FakePorts {
        fn read_u8(&mut self, port: u16) -> u8 {
            self.0.borrow().latches.get(&port).copied().unwrap_or(0)
        }

        fn write_u8(&mut self, port: u16, value: u8) {
            let mut state = self.0.borrow_mut();
            state.latches.insert(port, value);
            state.writes.push((port, value));
        }
    }
}
