//! Serial port (COM1 @ 0x3F8) for debug output.

use spin::Mutex;

use crate::port::{HardwarePorts, PortIo};

pub const COM1: u16 = 0x3F8;

const IER_OFF: u16 = 1;
const LCR_OFF: u16 = 3;
const LCR_8N1: u8 = 0x03;
const MCR_OFF: u16 = 4;
const MCR_DTR_RTS: u8 = 0x03;
const LSR_OFF: u16 = 5;
const LSR_THRE: u8 = 0x20;

/// 16550-compatible UART, polled, no interrupts.
pub struct SerialPort<P: PortIo> {
    ports: P,
    base: u16,
}

impl<P: PortIo> SerialPort<P> {
    pub const fn new(ports: P, base: u16) -> Self {
        SerialPort { ports, base }
    }

    /// 8n1, DTR/RTS asserted, UART interrupts off. The loader's baud rate
    /// is kept.
    pub fn init(&mut self) {
        self.ports.write_u8(self.base + IER_OFF, 0x00);
        self.ports.write_u8(self.base + LCR_OFF, LCR_8N1);
        self.ports.write_u8(self.base + MCR_OFF, MCR_DTR_RTS);
    }

    fn is_transmit_empty(&mut self) -> bool {
        self.ports.read_u8(self.base + LSR_OFF) & LSR_THRE != 0
    }

    /// Blocks until the holding register is empty.
    pub fn write_byte(&mut self, b: u8) {
        while !self.is_transmit_empty() {
            core::hint::spin_loop();
        }
        self.ports.write_u8(self.base, b);
    }
}

impl<P: PortIo> core::fmt::Write for SerialPort<P> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for b in s.bytes() {
            if b == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(b);
        }
        Ok(())
    }
}

pub static SERIAL: Mutex<SerialPort<HardwarePorts>> =
    Mutex::new(SerialPort::new(HardwarePorts::new(), COM1));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::fake::FakePorts;
    use core::fmt::Write;

    fn ready_port() -> (FakePorts, SerialPort<FakePorts>) {
        let ports = FakePorts::new();
        ports.preset(COM1 + LSR_OFF, LSR_THRE);
        (ports.clone(), SerialPort::new(ports, COM1))
    }

    #[test]
    fn init_programs_line_and_modem_control() {
        let (ports, mut serial) = ready_port();
        serial.init();
        assert_eq!(
            ports.writes(),
            vec![(COM1 + 1, 0x00), (COM1 + 3, 0x03), (COM1 + 4, 0x03)]
        );
    }

    #[test]
    fn newlines_become_crlf() {
        let (ports, mut serial) = ready_port();
        write!(serial, "ok\n").unwrap();
        assert_eq!(ports.writes_to(COM1), b"ok\r\n".to_vec());
    }
}
